//! The dispatch loop.
//!
//! Messages go out one at a time. For each message the loop picks a healthy
//! endpoint, waits out any sending-window pause for that endpoint's sender,
//! renders and sends, classifies the outcome, and feeds it back into the
//! throttle, the window counters and the outcome sink. Between messages it
//! waits out retry recommendations and the throttle's pacing delay.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use courier_common::{Signal, internal};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    time::Instant,
};
use tracing::{debug, error, info, warn};

use crate::{
    classify::{classify, get_retry_delay},
    content::ContentProducer,
    endpoint::Endpoint,
    health::{HealthChecker, HealthConfig, HealthProbe},
    pool::EndpointPool,
    sink::{OutcomeSink, TracingSink},
    smtp::{SmtpProbe, SmtpSettings, SmtpTransport},
    throttle::{Throttle, ThrottleConfig},
    transport::{Envelope, Receipt, Transport},
    types::{CampaignResult, Message, Outcome, RunStatus, SendAttempt},
    window::{Clock, SendingWindow, WindowConfig},
};

/// Everything tunable about a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOptions {
    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub smtp: SmtpSettings,

    /// Sleep the throttle's delay between messages
    #[serde(default = "default_true")]
    pub pacing: bool,

    /// Sleep the recommended retry delay after a retryable failure
    #[serde(default = "default_true")]
    pub retry_wait: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            health: HealthConfig::default(),
            throttle: ThrottleConfig::default(),
            window: WindowConfig::default(),
            smtp: SmtpSettings::default(),
            pacing: default_true(),
            retry_wait: default_true(),
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Owns the session state of one campaign: the pool, the health checker,
/// the throttle and the sending window.
pub struct Dispatcher {
    pool: EndpointPool,
    probe: Arc<dyn HealthProbe>,
    health: HealthChecker,
    throttle: Throttle,
    window: SendingWindow,
    clock: Option<Arc<dyn Clock>>,
    transport: Arc<dyn Transport>,
    content: Arc<dyn ContentProducer>,
    sink: Arc<dyn OutcomeSink>,
    options: DispatchOptions,
    shutdown: Option<broadcast::Receiver<Signal>>,
}

impl Dispatcher {
    pub fn new(
        pool: EndpointPool,
        transport: Arc<dyn Transport>,
        probe: Arc<dyn HealthProbe>,
        content: Arc<dyn ContentProducer>,
    ) -> Self {
        let options = DispatchOptions::default();

        Self {
            pool,
            health: HealthChecker::new(options.health.clone(), Arc::clone(&probe)),
            probe,
            throttle: Throttle::new(options.throttle.clone()),
            window: SendingWindow::new(options.window.clone()),
            clock: None,
            transport,
            content,
            sink: Arc::new(TracingSink),
            options,
            shutdown: None,
        }
    }

    /// Replaces the options, resetting health, throttle and window state.
    #[must_use]
    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.health = HealthChecker::new(options.health.clone(), Arc::clone(&self.probe));
        self.throttle = Throttle::new(options.throttle.clone());
        self.window = match &self.clock {
            Some(clock) => SendingWindow::with_clock(options.window.clone(), Arc::clone(clock)),
            None => SendingWindow::new(options.window.clone()),
        };
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Evaluate sending windows against `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.window = SendingWindow::with_clock(self.options.window.clone(), Arc::clone(&clock));
        self.clock = Some(clock);
        self
    }

    /// Stop scheduling messages once a [`Signal`] arrives on `shutdown`.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<Signal>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub const fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub const fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub const fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub const fn window(&self) -> &SendingWindow {
        &self.window
    }

    pub const fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Send `messages` in order.
    ///
    /// Never fails as a whole: per-message failures end up in the result's
    /// reports, and run-fatal conditions or a shutdown end the run early with
    /// the matching [`RunStatus`].
    pub async fn run(&mut self, messages: &[Message]) -> CampaignResult {
        let mut result = CampaignResult::default();

        if self.options.window.enabled
            && let Err(error) = self.options.window.validate()
        {
            error!(%error, "Refusing to start campaign");
            result.status = RunStatus::Halted(error.into());
            return result;
        }

        internal!(
            level = INFO,
            "Starting campaign of {} message(s) across {} endpoint(s)",
            messages.len(),
            self.pool.len()
        );

        for (index, message) in messages.iter().enumerate() {
            if self.shutdown_requested() {
                result.status = RunStatus::Cancelled;
                break;
            }

            let endpoint = match self.health.get_healthy_endpoint(&self.pool).await {
                Ok(endpoint) => endpoint,
                Err(error) => {
                    error!(
                        %error,
                        remaining = messages.len() - index,
                        "Halting campaign"
                    );
                    result.status = RunStatus::Halted(error);
                    break;
                }
            };

            if !self.wait_for_window(&endpoint).await {
                result.status = RunStatus::Cancelled;
                break;
            }

            let attempt = self.attempt(&endpoint, message).await;
            let retry_delay = attempt
                .report
                .as_ref()
                .filter(|report| report.retryable)
                .map(get_retry_delay);
            result.push(attempt);

            if index + 1 == messages.len() {
                break;
            }

            if let Some(delay) = retry_delay.filter(|_| self.options.retry_wait) {
                info!(
                    recipient = %message.recipient,
                    wait_secs = delay.as_secs(),
                    "Waiting before continuing after a retryable failure"
                );

                if !self.pause(delay).await {
                    result.status = RunStatus::Cancelled;
                    break;
                }
            }

            if self.options.pacing {
                let id = endpoint.id();
                let delay = self
                    .throttle
                    .clamp(self.throttle.get_delay(&id, self.throttle.recent_failures(&id)));
                debug!(endpoint = %endpoint, delay = ?delay, "Pacing before next message");

                if !self.pause(delay).await {
                    result.status = RunStatus::Cancelled;
                    break;
                }
            }
        }

        if result.status == RunStatus::Cancelled {
            internal!(level = INFO, "Campaign cancelled by shutdown signal");
        }

        internal!(
            level = INFO,
            "Campaign finished: {} sent, {} failed, {} not attempted",
            result.sent_count,
            result.failed_count,
            messages.len() - result.attempted()
        );

        result
    }

    /// Sleep through sending-window pauses for the endpoint's sender.
    ///
    /// Returns `false` when interrupted by shutdown.
    async fn wait_for_window(&mut self, endpoint: &Endpoint) -> bool {
        while let Some(decision) = self.window.should_pause(&endpoint.sender) {
            let wait = self.window.pause_length(&decision);
            info!(
                sender = %endpoint.sender,
                reason = ?decision.reason,
                wait_secs = wait.as_secs(),
                "Sending paused: {}",
                decision.message
            );

            if !self.pause(wait).await {
                return false;
            }
        }

        true
    }

    async fn attempt(&self, endpoint: &Endpoint, message: &Message) -> SendAttempt {
        let id = endpoint.id();
        let attempted_at = Utc::now();
        let started = Instant::now();

        let delivered = self.deliver(endpoint, message).await;
        let response_time = started.elapsed();

        self.throttle.update(&id, delivered.is_ok(), response_time);
        self.window.record_send(&endpoint.sender);

        let report = match delivered {
            Ok(receipt) => {
                debug!(
                    endpoint = %endpoint,
                    recipient = %message.recipient,
                    code = receipt.code,
                    response = %receipt.message,
                    "Message accepted"
                );
                None
            }
            Err((text, code)) => {
                let mut report = classify(&text, &message.recipient, endpoint);
                report.status_code = report.status_code.or(code);
                Some(report)
            }
        };

        let attempt = SendAttempt {
            endpoint: id,
            recipient: message.recipient.clone(),
            outcome: if report.is_some() {
                Outcome::Failed
            } else {
                Outcome::Sent
            },
            response_time,
            report,
            attempted_at,
        };

        if let Err(error) = self.sink.record(&attempt) {
            warn!(%error, recipient = %attempt.recipient, "Outcome sink rejected attempt");
        }

        attempt
    }

    /// Render, build and send one message. Failures come back as the text to
    /// classify plus any status code the error carried.
    async fn deliver(
        &self,
        endpoint: &Endpoint,
        message: &Message,
    ) -> Result<Receipt, (String, Option<u16>)> {
        let envelope = self
            .envelope(endpoint, message)
            .map_err(|error| (error.to_string(), None))?;

        self.transport
            .send(endpoint, &envelope)
            .await
            .map_err(|error| (error.reason(), error.code()))
    }

    fn envelope(
        &self,
        endpoint: &Endpoint,
        message: &Message,
    ) -> Result<Envelope, crate::content::ContentError> {
        let body = self.content.render(&message.template_id, &message.recipient)?;
        let data = self.content.build_envelope(
            &endpoint.sender,
            &message.recipient,
            &message.subject,
            &body,
        )?;

        Ok(Envelope {
            from: endpoint.sender.clone(),
            recipient: message.recipient.clone(),
            data,
        })
    }

    fn shutdown_requested(&mut self) -> bool {
        let Some(receiver) = self.shutdown.as_mut() else {
            return false;
        };

        match receiver.try_recv() {
            Ok(Signal::Shutdown) | Err(TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Closed) => {
                self.shutdown = None;
                false
            }
        }
    }

    /// Sleep for `duration` unless shutdown is signalled first.
    ///
    /// Returns `false` when interrupted.
    async fn pause(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;

        loop {
            let Some(receiver) = self.shutdown.as_mut() else {
                tokio::time::sleep_until(deadline).await;
                return true;
            };

            let signal = tokio::select! {
                () = tokio::time::sleep_until(deadline) => return true,
                signal = receiver.recv() => signal,
            };

            match signal {
                Ok(Signal::Shutdown) | Err(RecvError::Lagged(_)) => {
                    internal!(level = INFO, "Shutdown requested, abandoning wait");
                    return false;
                }
                Err(RecvError::Closed) => self.shutdown = None,
            }
        }
    }
}

/// Run one campaign over SMTP with the given endpoints.
pub async fn run(
    endpoints: impl IntoIterator<Item = Endpoint>,
    messages: &[Message],
    options: DispatchOptions,
    producer: Arc<dyn ContentProducer>,
    sink: Arc<dyn OutcomeSink>,
) -> CampaignResult {
    let transport = Arc::new(SmtpTransport::new(options.smtp.clone()));
    let probe = Arc::new(SmtpProbe::new(options.smtp.clone()));

    Dispatcher::new(EndpointPool::new(endpoints), transport, probe, producer)
        .with_options(options)
        .with_sink(sink)
        .run(messages)
        .await
}
