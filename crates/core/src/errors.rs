use thiserror::Error;

/// Error taxonomy shared by every handler. The orchestrator maps each
/// variant to a user-facing string; internal detail strings are for logs
/// only and never reach chat replies.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("transient upstream failure: {0}")]
    TransientUpstream(String),
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("permanent upstream failure: {0}")]
    PermanentUpstream(String),
    #[error("session store unavailable")]
    SessionUnavailable,
}

impl AssistantError {
    pub fn transient(detail: impl std::fmt::Display) -> Self {
        Self::TransientUpstream(detail.to_string())
    }

    pub fn schema(detail: impl std::fmt::Display) -> Self {
        Self::SchemaViolation(detail.to_string())
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn conflict(detail: impl std::fmt::Display) -> Self {
        Self::Conflict(detail.to_string())
    }

    pub fn invariant(detail: impl std::fmt::Display) -> Self {
        Self::InvariantViolation(detail.to_string())
    }

    pub fn permanent(detail: impl std::fmt::Display) -> Self {
        Self::PermanentUpstream(detail.to_string())
    }

    /// True when retrying the same request may succeed and no state was
    /// mutated on the way out.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientUpstream(_) | Self::SessionUnavailable)
    }

    /// The string shown to the user in chat. Deliberately generic for the
    /// internal variants.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TransientUpstream(_) | Self::SessionUnavailable => {
                "⏱️ Estamos teniendo un problema temporal. Por favor, inténtalo de nuevo en unos segundos."
            }
            Self::SchemaViolation(_) => {
                "🤔 No he entendido bien tu mensaje. ¿Puedes decirlo de otra forma?"
            }
            Self::NotFound(_) => "🔍 No he encontrado lo que buscas.",
            Self::Conflict(_) => {
                "⚠️ Tu solicitud se cruzó con otra operación. Por favor, inténtalo de nuevo."
            }
            Self::InvariantViolation(_) | Self::PermanentUpstream(_) => {
                "❌ Algo salió mal. Por favor, inténtalo de nuevo."
            }
        }
    }
}
