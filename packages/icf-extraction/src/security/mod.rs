//! Credential handling.

pub mod credentials;

pub use credentials::{AICredentials, Provider, SecretString};
