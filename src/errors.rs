/// Failures of the pricing kernel and grid evaluator.
/// Both kinds are always surfaced to the caller; nothing is recovered silently.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PricingError {
    #[error("invalid input: {field}={value} ({reason})")]
    InvalidInput {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("degenerate inputs: {0}")]
    DegenerateInputs(String),
}

impl PricingError {
    pub fn invalid(field: &'static str, value: f64, reason: &'static str) -> Self {
        PricingError::InvalidInput { field, value, reason }
    }

    /// Stable machine-readable tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PricingError::InvalidInput { .. } => "invalid_input",
            PricingError::DegenerateInputs(_) => "degenerate_inputs",
        }
    }
}

/// Service-level error types.
/// Collaborator failures (history store, channels) are reported, never
/// allowed to corrupt a pricing result that was already computed.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Task(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
