use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreErrorKind {
    InvalidInput,
    NotFound,
    Transport,
    HttpStatus,
    ParseFailure,
    StorageFailure,
    Internal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    SearchListings,
    Suggestions,
    Favorites,
    SaveSearch,
    ApplySavedSearch,
    ToggleEmailAlerts,
    DeleteSavedSearch,
    ListSavedSearches,
    RecordHistory,
    ListHistory,
    DeleteHistoryEntry,
    ClearHistory,
    StoreQueryState,
    RestoreQueryState,
    Transition,
    Configure,
}

impl Operation {
    /// Reads may be retried once on transport failure; mutations never are.
    pub fn is_idempotent_read(self) -> bool {
        matches!(
            self,
            Self::SearchListings
                | Self::Suggestions
                | Self::Favorites
                | Self::ListSavedSearches
                | Self::ListHistory
                | Self::RestoreQueryState
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error, Serialize)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub operation: Option<Operation>,
    pub kind: CoreErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation: None,
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn invalid_input(operation: Operation, message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::InvalidInput, message).during(operation)
    }

    pub fn not_found(operation: Operation, message: impl Into<String>) -> Self {
        Self::new(CoreErrorKind::NotFound, message).during(operation)
    }

    /// Attributes the error to `operation` unless it already carries one.
    pub fn during(mut self, operation: Operation) -> Self {
        self.operation = self.operation.or(Some(operation));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        match self.kind {
            CoreErrorKind::Transport => true,
            CoreErrorKind::HttpStatus => self.status.is_some_and(|status| status >= 500),
            _ => false,
        }
    }
}
