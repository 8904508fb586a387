//! Template variables - the ICF sections to fill.

use serde::{Deserialize, Serialize};

/// How hard a variable is to extract. Drives the iteration budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Complexity {
    Easy,
    Moderate,
    Complex,
    NotInProtocol,
}

impl Complexity {
    /// Label used in logs and prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Complexity::Easy => "Easy",
            Complexity::Moderate => "Moderate",
            Complexity::Complex => "Complex",
            Complexity::NotInProtocol => "Not in protocol",
        }
    }
}

/// Whether the information is conventionally present in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    Yes,
    No,
    Partially,
}

/// A single ICF template section to extract.
///
/// Loaded once per run and never mutated; the engine only borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Section id, unique within the registry (e.g. "9.1")
    pub section_id: String,

    pub heading: String,

    pub sub_section: Option<String>,

    /// What to extract, in the template author's words
    pub instructions: String,

    /// Required ICF text, with `{{ ... }}` placeholders
    pub required_template: String,

    pub suggested_text: String,

    /// Where the information usually lives in an institutional protocol
    pub protocol_section: String,

    /// Where the information usually lives in a sponsor protocol
    pub sponsor_section: String,

    pub complexity: Complexity,

    pub availability: Availability,

    /// The required template text is used verbatim, nothing to extract.
    pub standard_text: bool,

    /// Non-applicable slot, never searched.
    pub always_skip: bool,
}

impl Variable {
    /// Create a variable with empty text fields.
    pub fn new(
        section_id: impl Into<String>,
        heading: impl Into<String>,
        complexity: Complexity,
        availability: Availability,
    ) -> Self {
        Self {
            section_id: section_id.into(),
            heading: heading.into(),
            sub_section: None,
            instructions: String::new(),
            required_template: String::new(),
            suggested_text: String::new(),
            protocol_section: String::new(),
            sponsor_section: String::new(),
            complexity,
            availability,
            standard_text: false,
            always_skip: false,
        }
    }

    pub fn with_sub_section(mut self, sub_section: impl Into<String>) -> Self {
        self.sub_section = Some(sub_section.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.required_template = template.into();
        self
    }

    pub fn with_suggested_text(mut self, text: impl Into<String>) -> Self {
        self.suggested_text = text.into();
        self
    }

    /// Set location hints for institutional and sponsor protocols.
    pub fn with_location_hints(
        mut self,
        protocol_section: impl Into<String>,
        sponsor_section: impl Into<String>,
    ) -> Self {
        self.protocol_section = protocol_section.into();
        self.sponsor_section = sponsor_section.into();
        self
    }

    /// Mark as standard text.
    pub fn standard_text(mut self) -> Self {
        self.standard_text = true;
        self
    }

    /// Mark as always skipped.
    pub fn always_skip(mut self) -> Self {
        self.always_skip = true;
        self
    }

    /// "[9.1] Heading > Sub-section"
    pub fn display_name(&self) -> String {
        match &self.sub_section {
            Some(sub) => format!("[{}] {} > {}", self.section_id, self.heading, sub),
            None => format!("[{}] {}", self.section_id, self.heading),
        }
    }

    /// True if either location hint is present.
    pub fn has_location_hints(&self) -> bool {
        !self.protocol_section.is_empty() || !self.sponsor_section.is_empty()
    }
}
