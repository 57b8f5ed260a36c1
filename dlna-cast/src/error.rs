//! Error types for dlna-cast

use soap_client::SoapError;
use thiserror::Error;

/// Result type for dlna-cast operations
pub type Result<T> = std::result::Result<T, CastError>;

/// Errors that can occur while casting to a renderer
#[derive(Debug, Error)]
pub enum CastError {
    /// Network failure or unexpected HTTP status from the renderer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The renderer answered 2xx but the body could not be understood
    #[error("Invalid renderer response: {0}")]
    Response(String),

    /// The renderer returned a SOAP fault
    #[error("SOAP fault: error code {0}")]
    SoapFault(u16),

    /// The renderer no longer knows the subscription (HTTP 412)
    #[error("Precondition failed: subscription is gone on the renderer")]
    PreconditionFailed,

    /// An action could not be encoded
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// An event body could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The subscription identifier is not live
    #[error("Unknown renderer subscription: {0}")]
    UnknownRenderer(String),

    /// A fatal step of session startup failed
    #[error("Session startup failed during {stage}: {source}")]
    Startup {
        stage: &'static str,
        #[source]
        source: Box<CastError>,
    },

    /// The operation is not allowed in the session's current state
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CastError {
    pub(crate) fn startup(stage: &'static str, source: CastError) -> Self {
        CastError::Startup {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether this error is a rejected lease (HTTP 412)
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, CastError::PreconditionFailed)
    }
}

impl From<SoapError> for CastError {
    fn from(error: SoapError) -> Self {
        match error {
            SoapError::Status(412) => CastError::PreconditionFailed,
            SoapError::Status(code) => CastError::Transport(format!("HTTP status {code}")),
            SoapError::Network(msg) => CastError::Transport(msg),
            SoapError::Parse(msg) => CastError::Response(msg),
            SoapError::Fault(code) => CastError::SoapFault(code),
        }
    }
}

/// Errors raised while encoding a control action
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Parameter '{parameter}' is required")]
    MissingParameter { parameter: &'static str },

    #[error("Parameter '{parameter}' value '{value}' is invalid: {reason}")]
    InvalidValue {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    #[error("Parameter '{parameter}' value {value} is out of range ({min}..={max})")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Errors raised while parsing an event notification body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Failed to unescape event body: {0}")]
    Unescape(String),

    #[error("Malformed event XML: {0}")]
    Xml(String),

    #[error("Event carries no transport state")]
    MissingTransportState,
}
