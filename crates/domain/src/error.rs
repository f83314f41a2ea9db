/// Shared error type used across all NextAI crates.
///
/// Every variant maps to a stable wire code (the `code` field of the HTTP
/// error envelope) and an HTTP status, so handlers never invent codes ad hoc.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid or missing API token")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("chat {0:?} not found")]
    ChatNotFound(String),

    #[error("provider {0:?} not found")]
    ProviderNotFound(String),

    #[error("the default chat cannot be deleted")]
    DefaultChatProtected,

    #[error("channel {0:?} is not supported")]
    ChannelNotSupported(String),

    #[error("{0}")]
    InvalidQqEvent(String),

    #[error("{0}")]
    InvalidToolInput(String),

    #[error("tool {0:?} is not supported")]
    ToolNotSupported(String),

    #[error("tool {0:?} is disabled by the operator")]
    ToolDisabled(String),

    #[error("{0}")]
    ProviderNotConfigured(String),

    #[error("{0}")]
    ProviderNotSupported(String),

    #[error("{0}")]
    ProviderRequestFailed(String),

    #[error("{0}")]
    ProviderInvalidReply(String),

    #[error("provider {0:?} is disabled")]
    ProviderDisabled(String),

    #[error("cron job {0:?} is already running at max concurrency")]
    CronMaxConcurrencyReached(String),

    #[error("{0}")]
    StorageWriteFailed(String),

    #[error("{0}")]
    ChannelDispatchFailed(String),

    #[error("{0}")]
    InvalidRequest(String),
}

impl Error {
    /// Stable wire code carried in the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::Json(_) => "internal_error",
            Error::Unauthorized => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::ChatNotFound(_) => "chat_not_found",
            Error::ProviderNotFound(_) => "provider_not_found",
            Error::DefaultChatProtected => "default_chat_protected",
            Error::ChannelNotSupported(_) => "channel_not_supported",
            Error::InvalidQqEvent(_) => "invalid_qq_event",
            Error::InvalidToolInput(_) => "invalid_tool_input",
            Error::ToolNotSupported(_) => "tool_not_supported",
            Error::ToolDisabled(_) => "tool_disabled",
            Error::ProviderNotConfigured(_) => "provider_not_configured",
            Error::ProviderNotSupported(_) => "provider_not_supported",
            Error::ProviderRequestFailed(_) => "provider_request_failed",
            Error::ProviderInvalidReply(_) => "provider_invalid_reply",
            Error::ProviderDisabled(_) => "provider_disabled",
            Error::CronMaxConcurrencyReached(_) => "cron_max_concurrency_reached",
            Error::StorageWriteFailed(_) => "storage_write_failed",
            Error::ChannelDispatchFailed(_) => "channel_dispatch_failed",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    /// HTTP status the error surfaces with when it reaches a handler.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Unauthorized => 401,
            Error::ToolDisabled(_) => 403,
            Error::NotFound(_) | Error::ChatNotFound(_) | Error::ProviderNotFound(_) => 404,
            Error::DefaultChatProtected
            | Error::ChannelNotSupported(_)
            | Error::InvalidQqEvent(_)
            | Error::InvalidToolInput(_)
            | Error::ToolNotSupported(_)
            | Error::ProviderNotConfigured(_)
            | Error::ProviderNotSupported(_)
            | Error::ProviderDisabled(_)
            | Error::InvalidRequest(_) => 400,
            Error::ProviderRequestFailed(_)
            | Error::ProviderInvalidReply(_)
            | Error::ChannelDispatchFailed(_) => 502,
            Error::Io(_)
            | Error::Json(_)
            | Error::CronMaxConcurrencyReached(_)
            | Error::StorageWriteFailed(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
