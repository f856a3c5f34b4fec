//! Structured error records handed back to the model as tool results.
//!
//! A tool failure never aborts the agent loop; the model sees one of these
//! objects and decides whether to retry, pick another tool, or answer.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    UnknownTool,
    InvalidParams,
    SearchFailed,
    FetchFailed,
    Timeout,
    UnexpectedError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidParams => "invalid_params",
            Self::SearchFailed => "search_failed",
            Self::FetchFailed => "fetch_failed",
            Self::Timeout => "timeout",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub fn retryable(self) -> bool {
        match self {
            Self::SearchFailed | Self::FetchFailed | Self::Timeout => true,
            // Fixing these needs a different call, not the same call again.
            Self::UnknownTool | Self::InvalidParams | Self::UnexpectedError => false,
        }
    }
}

pub fn error_obj(code: ErrorCode, message: impl ToString) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        error: &'static str,
        message: String,
        retryable: bool,
    }

    let e = ErrorObject {
        error: code.as_str(),
        message: message.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "error": code.as_str(),
            "message": message.to_string(),
            "retryable": code.retryable()
        }),
    }
}

/// Map an adapter error onto the record code the model sees.
pub fn code_for(e: &weblens_core::Error) -> ErrorCode {
    use weblens_core::Error;
    match e {
        Error::Search(_) => ErrorCode::SearchFailed,
        Error::Fetch(_) => ErrorCode::FetchFailed,
        Error::InvalidUrl(_) | Error::InvalidInput(_) => ErrorCode::InvalidParams,
        Error::Llm(_) | Error::NotConfigured(_) => ErrorCode::UnexpectedError,
    }
}
