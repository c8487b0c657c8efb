//! Where attempt records go.

use thiserror::Error;
use tracing::{info, warn};

use crate::types::SendAttempt;

#[derive(Debug, Error)]
#[error("Unable to record attempt: {0}")]
pub struct SinkError(pub String);

/// Receives every send attempt as it happens.
pub trait OutcomeSink: Send + Sync {
    /// # Errors
    ///
    /// When the attempt could not be stored. The dispatcher logs this and
    /// carries on.
    fn record(&self, attempt: &SendAttempt) -> Result<(), SinkError>;
}

/// Emits one structured event per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn record(&self, attempt: &SendAttempt) -> Result<(), SinkError> {
        let response_ms = attempt.response_time.as_millis();

        match &attempt.report {
            None => info!(
                endpoint = %attempt.endpoint,
                recipient = %attempt.recipient,
                response_ms,
                "Message sent"
            ),
            Some(report) => warn!(
                endpoint = %attempt.endpoint,
                recipient = %attempt.recipient,
                response_ms,
                category = %report.category,
                severity = %report.severity,
                retryable = report.retryable,
                status_code = report.status_code,
                details = %report.technical_details,
                "Message failed"
            ),
        }

        Ok(())
    }
}
