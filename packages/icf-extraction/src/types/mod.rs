//! Data types for the ICF extraction library.

pub mod config;
pub mod document;
pub mod report;
pub mod result;
pub mod variable;
