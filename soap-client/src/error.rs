//! Error types for the SOAP client

use thiserror::Error;

/// Errors that can occur during SOAP and GENA communication
#[derive(Debug, Error)]
pub enum SoapError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The renderer answered with a non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Parse(String),

    /// SOAP fault returned by the renderer
    #[error("SOAP fault: error code {0}")]
    Fault(u16),
}

impl SoapError {
    /// Whether the renderer rejected the request because the lease is gone
    /// (HTTP 412 Precondition Failed).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, SoapError::Status(412))
    }
}
