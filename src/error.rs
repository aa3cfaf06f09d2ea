use thiserror::Error;

pub type Result<T> = std::result::Result<T, PomoError>;

/// Every failure the core can report. Callers match on the variant (or use
/// [`PomoError::requires_login`]) to decide between "log in again" and
/// "try again".
#[derive(Debug, Error)]
pub enum PomoError {
    #[error("authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("token refresh rejected: {0}")]
    Refresh(String),

    #[error("{operation} failed: {message}")]
    ApiRequest {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("no candidate tracks available")]
    NoCandidates,

    #[error("no stored PKCE code verifier for this login")]
    MissingVerifier,

    #[error("not logged in")]
    NotLoggedIn,

    #[error("track source not found: {0}")]
    SourceNotFound(String),

    #[error("no draft to save; generate a playlist first")]
    NoDraft,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PomoError {
    pub fn api(operation: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        PomoError::ApiRequest {
            operation: operation.to_string(),
            status,
            message: message.into(),
        }
    }

    /// True when the only way forward is a fresh login.
    pub fn requires_login(&self) -> bool {
        match self {
            PomoError::AuthExchange(_)
            | PomoError::Refresh(_)
            | PomoError::MissingVerifier
            | PomoError::NotLoggedIn
            | PomoError::UnknownSession(_) => true,
            PomoError::ApiRequest { status, .. } => *status == Some(401),
            _ => false,
        }
    }

    /// Short machine-readable name, used in server responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PomoError::AuthExchange(_) => "auth_exchange",
            PomoError::Refresh(_) => "refresh",
            PomoError::ApiRequest { .. } => "api_request",
            PomoError::NoCandidates => "no_candidates",
            PomoError::MissingVerifier => "missing_verifier",
            PomoError::NotLoggedIn => "not_logged_in",
            PomoError::SourceNotFound(_) => "source_not_found",
            PomoError::NoDraft => "no_draft",
            PomoError::UnknownSession(_) => "unknown_session",
            PomoError::Transport(_) => "transport",
            PomoError::Storage(_) => "storage",
            PomoError::Config(_) => "config",
        }
    }
}
