use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    City,
    State,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub value: String,
}

impl Suggestion {
    pub fn city(value: impl Into<String>) -> Self {
        Self {
            kind: SuggestionKind::City,
            value: value.into(),
        }
    }

    pub fn state(value: impl Into<String>) -> Self {
        Self {
            kind: SuggestionKind::State,
            value: value.into(),
        }
    }
}
