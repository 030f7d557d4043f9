use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::conversation::Field;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Booking,
    Cancel,
    Other,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Booking => "booking",
            Intent::Cancel => "cancel",
            Intent::Other => "other",
            Intent::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "greeting" => Intent::Greeting,
            "booking" | "book" => Intent::Booking,
            "cancel" | "cancellation" => Intent::Cancel,
            "other" => Intent::Other,
            _ => Intent::Unknown,
        }
    }
}

/// Entity guesses from the extraction service. Only non-null values are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedEntities {
    pub fields: BTreeMap<Field, String>,
    pub features: Vec<String>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.features.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedIntent {
    pub intent: Intent,
    pub entities: ExtractedEntities,
}

impl ExtractedIntent {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            entities: ExtractedEntities::default(),
        }
    }
}
