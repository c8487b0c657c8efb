use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
};

use ahash::AHashMap;
use courier_common::{Signal, internal, logging, tracing};
use courier_dispatch::{
    CampaignResult, ConfigError, DispatchOptions, Dispatcher, EndpointPool, HealthChecker, HealthProbe,
    Message, OutcomeSink, RunStatus, SmtpProbe, SmtpTransport, StaticContent, TracingSink,
    Verification, load_endpoints,
};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::recipients::load_recipients;

/// One campaign: where endpoints and recipients come from, what to send, and
/// how to pace it.
#[derive(Debug, Deserialize)]
pub struct Courier {
    #[serde(alias = "endpoints")]
    endpoints_file: PathBuf,
    #[serde(alias = "recipients")]
    recipients_file: PathBuf,
    /// Template rendered for every recipient
    template: String,
    subject: String,
    /// Template bodies by id; `{recipient}` is replaced by the address
    #[serde(default)]
    templates: AHashMap<String, String>,
    #[serde(default)]
    options: DispatchOptions,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Waits for CTRL+C or SIGTERM and broadcasts [`Signal::Shutdown`]. Returns
/// once CTRL+C is entered a second time.
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, finishing the current message");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Human summary of a finished campaign.
pub fn summary(result: &CampaignResult) -> String {
    let status = match &result.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::Halted(reason) => format!("halted: {reason}"),
        RunStatus::Cancelled => "cancelled".to_string(),
    };

    let mut out = format!(
        "Campaign {status}: {} sent, {} failed\n",
        result.sent_count, result.failed_count
    );

    for (attempt, report) in result
        .attempts
        .iter()
        .filter_map(|attempt| attempt.report.as_ref().map(|report| (attempt, report)))
    {
        out.push_str(&format!(
            "\n{} via {}\n{report}",
            attempt.recipient, attempt.endpoint
        ));
    }

    let retry = result.retry_candidates().count();
    if retry > 0 {
        out.push_str(&format!("\n{retry} recipient(s) are worth retrying later\n"));
    }

    out
}

fn report_verifications(verifications: &[Verification]) -> usize {
    let mut healthy = 0;

    for verification in verifications {
        if let Some(report) = verification.report() {
            tracing::warn!(
                endpoint = %verification.endpoint,
                category = %report.category,
                "Endpoint failed verification"
            );
            println!("{}\n{report}", verification.endpoint);
        } else {
            internal!(level = INFO, "Endpoint {} verified", verification.endpoint);
            healthy += 1;
        }
    }

    healthy
}

impl Courier {
    fn messages(&self, recipients: Vec<String>) -> Vec<Message> {
        recipients
            .into_iter()
            .map(|recipient| Message::new(recipient, &self.template, &self.subject))
            .collect()
    }

    /// Settings that would stop the campaign before it sends anything.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.options.window.enabled {
            self.options.window.validate()?;
        }

        Ok(())
    }

    /// Load endpoints and recipients, verify every endpoint, then send the
    /// campaign unless `dry_run` is set.
    ///
    /// # Errors
    ///
    /// When a file cannot be read, no endpoint is usable or verifies, or the
    /// campaign halts.
    pub async fn run(self, dry_run: bool) -> anyhow::Result<()> {
        logging::init();
        self.validate()?;

        internal!(
            level = INFO,
            "Loading endpoints from {}",
            self.endpoints_file.display()
        );
        let file = load_endpoints(&self.endpoints_file).await?;
        for error in &file.errors {
            tracing::warn!(path = %self.endpoints_file.display(), "Skipping endpoint {error}");
        }

        if file.endpoints.is_empty() {
            return Err(ConfigError::Empty {
                path: self.endpoints_file,
            }
            .into());
        }

        let recipients = load_recipients(&self.recipients_file).await?;
        let messages = self.messages(recipients);

        let pool = EndpointPool::new(file.endpoints);
        let probe: Arc<dyn HealthProbe> = Arc::new(SmtpProbe::new(self.options.smtp.clone()));
        let checker = HealthChecker::new(self.options.health.clone(), Arc::clone(&probe));

        let healthy = report_verifications(&checker.verify_all(&pool).await);
        if healthy == 0 {
            anyhow::bail!("None of the {} endpoint(s) passed verification", pool.len());
        }

        internal!(
            level = INFO,
            "{healthy}/{} endpoint(s) verified, {} message(s) queued",
            pool.len(),
            messages.len()
        );

        if dry_run {
            internal!(level = INFO, "Dry run, nothing sent");
            return Ok(());
        }

        let content: StaticContent = self.templates.into_iter().collect();
        let sink: Arc<dyn OutcomeSink> = Arc::new(TracingSink);
        let mut dispatcher = Dispatcher::new(
            pool,
            Arc::new(SmtpTransport::new(self.options.smtp.clone())),
            probe,
            Arc::new(content),
        )
        .with_options(self.options)
        .with_sink(sink)
        .with_shutdown(SHUTDOWN_BROADCAST.subscribe());

        let result = tokio::select! {
            result = dispatcher.run(&messages) => result,
            r = shutdown() => {
                r?;
                anyhow::bail!("Forced shutdown before the campaign finished");
            }
        };

        for stats in dispatcher.throttle().stats() {
            tracing::debug!(
                endpoint = %stats.endpoint,
                delay_secs = stats.delay_secs,
                recent_failures = stats.recent_failures,
                "Final throttle state"
            );
        }

        print!("{}", summary(&result));

        if let RunStatus::Halted(reason) = result.status {
            anyhow::bail!("Campaign halted: {reason}");
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write as _;

    use courier_dispatch::{Endpoint, Outcome, SendAttempt, classify};

    use super::*;

    #[test]
    fn config_parses_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"Courier(
                endpoints: "endpoints.txt",
                recipients_file: "recipients.txt",
                template: "welcome",
                subject: "Hello",
                templates: {{ "welcome": "Hi {{recipient}}" }},
                options: (pacing: false, window: (start_hour: 8)),
            )"#
        )
        .unwrap();

        let text = std::fs::read_to_string(file.path()).unwrap();
        let courier: Courier = ron::from_str(&text).unwrap();

        assert_eq!(courier.endpoints_file, PathBuf::from("endpoints.txt"));
        assert_eq!(courier.templates["welcome"], "Hi {recipient}");
        assert!(!courier.options.pacing);
        assert!(courier.options.retry_wait);
        assert_eq!(courier.options.window.start_hour, 8);
        assert_eq!(courier.options.window.end_hour, 22);

        let messages = courier.messages(vec!["bob@example.org".to_string()]);
        assert_eq!(messages, vec![Message::new("bob@example.org", "welcome", "Hello")]);
    }

    #[test]
    fn overnight_window_is_a_config_error() {
        let courier: Courier = ron::from_str(
            r#"Courier(
                endpoints: "endpoints.txt",
                recipients: "recipients.txt",
                template: "welcome",
                subject: "Hello",
                options: (window: (start_hour: 22, end_hour: 6)),
            )"#,
        )
        .unwrap();

        let error = courier.validate().unwrap_err();
        assert!(matches!(error, ConfigError::Window(_)));
        assert_eq!(
            error.to_string(),
            "Sending window starts at 22:00 after it ends at 6:59"
        );
    }

    #[test]
    fn summary_lists_failures() {
        let endpoint = Endpoint::new("smtp.example.com", 587, "sender@example.com", "x");
        let report = classify("550 5.1.1 No such user", "bob@example.org", &endpoint);

        let result = CampaignResult {
            sent_count: 1,
            failed_count: 1,
            reports: vec![report.clone()],
            attempts: vec![SendAttempt {
                endpoint: endpoint.id(),
                recipient: "bob@example.org".to_string(),
                outcome: Outcome::Failed,
                response_time: std::time::Duration::from_millis(20),
                report: Some(report),
                attempted_at: chrono::Utc::now(),
            }],
            status: RunStatus::Completed,
        };

        let text = summary(&result);
        assert!(text.starts_with("Campaign completed: 1 sent, 1 failed\n"));
        assert!(text.contains("bob@example.org via sender@example.com@smtp.example.com:587"));
        assert!(text.contains("Recipient Address Invalid"));
        assert!(!text.contains("worth retrying"));
    }
}
