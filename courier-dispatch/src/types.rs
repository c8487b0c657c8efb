use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{classify::ErrorReport, endpoint::EndpointId, error::DispatchError};

/// One message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipient: String,
    /// Which template the content producer should render.
    pub template_id: String,
    pub subject: String,
}

impl Message {
    pub fn new(
        recipient: impl Into<String>,
        template_id: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            template_id: template_id.into(),
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Sent,
    Failed,
}

/// Record of a single send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendAttempt {
    pub endpoint: EndpointId,
    pub recipient: String,
    pub outcome: Outcome,
    pub response_time: Duration,
    /// Present exactly when the attempt failed.
    pub report: Option<ErrorReport>,
    pub attempted_at: DateTime<Utc>,
}

impl SendAttempt {
    pub const fn is_sent(&self) -> bool {
        matches!(self.outcome, Outcome::Sent)
    }
}

/// How a campaign ended.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Every message was attempted.
    #[default]
    Completed,
    /// A run-fatal condition stopped the campaign early.
    Halted(DispatchError),
    /// A shutdown signal stopped the campaign early.
    Cancelled,
}

/// Everything a campaign did.
#[derive(Debug, Clone, Default)]
pub struct CampaignResult {
    pub sent_count: usize,
    pub failed_count: usize,
    /// One report per failed attempt, in attempt order.
    pub reports: Vec<ErrorReport>,
    pub attempts: Vec<SendAttempt>,
    pub status: RunStatus,
}

impl CampaignResult {
    pub(crate) fn push(&mut self, attempt: SendAttempt) {
        if let Some(report) = &attempt.report {
            self.failed_count += 1;
            self.reports.push(report.clone());
        } else {
            self.sent_count += 1;
        }
        self.attempts.push(attempt);
    }

    pub const fn attempted(&self) -> usize {
        self.sent_count + self.failed_count
    }

    /// Recipients whose failure is worth retrying later.
    pub fn retry_candidates(&self) -> impl Iterator<Item = &SendAttempt> {
        self.attempts.iter().filter(|attempt| {
            attempt
                .report
                .as_ref()
                .is_some_and(|report| report.retryable)
        })
    }
}
