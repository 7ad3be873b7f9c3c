//! Internal API failure classification

use thiserror::Error;

/// Operator-facing text for an unreachable internal API
pub const API_UNREACHABLE: &str = "Internal API unreachable";

/// Failure of a single internal API round trip
///
/// `Display` is what the remote operator sees. The underlying transport
/// cause is only reachable through [`ApiError::log_detail`].
#[derive(Error, Debug)]
pub enum ApiError {
    /// Socket refused, DNS failure, timeout, broken connection
    #[error("{API_UNREACHABLE}")]
    Transport(String),

    /// Non-2xx status without a decodable message
    #[error("Internal API error ({0})")]
    HttpStatus(u16),

    /// Non-2xx status whose JSON body carried a `message`
    #[error("{0}")]
    DecodedMessage(String),

    /// 2xx status whose body does not match the expected shape
    #[error("Internal API error ({status})")]
    ProtocolViolation { status: u16, detail: String },
}

impl ApiError {
    /// Full diagnostic text for logs
    pub fn log_detail(&self) -> String {
        match self {
            ApiError::Transport(cause) => format!("{}: {}", API_UNREACHABLE, cause),
            ApiError::HttpStatus(code) => format!("unexpected HTTP status {}", code),
            ApiError::DecodedMessage(msg) => format!("API message: {}", msg),
            ApiError::ProtocolViolation { status, detail } => {
                format!("undecodable response (status {}): {}", status, detail)
            }
        }
    }

    /// Short label used in structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport_failure",
            ApiError::HttpStatus(_) => "http_status",
            ApiError::DecodedMessage(_) => "decoded_message",
            ApiError::ProtocolViolation { .. } => "protocol_violation",
        }
    }
}
