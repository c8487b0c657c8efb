//! SMTP submission: the production [`Transport`] and [`HealthProbe`].
//!
//! A session is connect (plain or implicit TLS), greeting, EHLO, optional
//! STARTTLS and a second EHLO, then AUTH. Sending continues with MAIL FROM,
//! RCPT TO and DATA; probing stops there. Each step has its own timeout.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use courier_common::config::{ClientTimeouts, TlsCertificatePolicy, TransportSecurity};
use courier_smtp::client::{ClientError, Response, SmtpClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    endpoint::Endpoint,
    health::HealthProbe,
    transport::{Envelope, Receipt, Stage, Transport, TransportError},
};

/// Settings shared by every SMTP session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Name announced in EHLO/HELO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// Per-step timeouts, each further capped by the endpoint's own timeout
    #[serde(default)]
    pub timeouts: ClientTimeouts,

    #[serde(default)]
    pub certificate: TlsCertificatePolicy,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            helo_name: default_helo_name(),
            timeouts: ClientTimeouts::default(),
            certificate: TlsCertificatePolicy::default(),
        }
    }
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

/// Server rejections become [`TransportError::Rejected`] so the stage shows
/// up in the error text.
fn at_stage(stage: Stage, error: ClientError) -> TransportError {
    match error {
        ClientError::SmtpError { code, message }
        | ClientError::UnexpectedResponse { code, message } => TransportError::Rejected {
            stage,
            code,
            message,
        },
        other => other.into(),
    }
}

async fn step<T: Send>(
    stage: Stage,
    timeout: Duration,
    operation: impl Future<Output = Result<T, ClientError>> + Send,
) -> Result<T, TransportError> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| TransportError::Timeout { stage, timeout })?
        .map_err(|e| at_stage(stage, e))
}

fn expect(
    stage: Stage,
    response: Response,
    accept: fn(&Response) -> bool,
) -> Result<Response, TransportError> {
    if accept(&response) {
        Ok(response)
    } else {
        Err(TransportError::Rejected {
            stage,
            code: response.code,
            message: response.message(),
        })
    }
}

fn success(stage: Stage, response: Response) -> Result<Response, TransportError> {
    expect(stage, response, Response::is_success)
}

struct Session {
    client: SmtpClient,
    timeouts: ClientTimeouts,
}

impl Session {
    async fn connect(endpoint: &Endpoint, settings: &SmtpSettings) -> Result<Self, TransportError> {
        let timeouts = settings.timeouts.capped(endpoint.timeout_secs);
        let address = endpoint.address();
        let accept_invalid = settings.certificate.accept_invalid_certs;

        if accept_invalid && endpoint.security.is_tls() {
            warn!(
                endpoint = %endpoint,
                "SECURITY WARNING: TLS certificate validation is disabled for this connection"
            );
        }

        let connect = async {
            match endpoint.security {
                TransportSecurity::ImplicitTls => {
                    SmtpClient::connect_tls(&address, endpoint.host.clone(), accept_invalid).await
                }
                TransportSecurity::StartTls | TransportSecurity::None => {
                    SmtpClient::connect(&address, endpoint.host.clone())
                        .await
                        .map(|client| client.accept_invalid_certs(accept_invalid))
                }
            }
        };

        let client = tokio::time::timeout(timeouts.connect(), connect)
            .await
            .map_err(|_| TransportError::Timeout {
                stage: Stage::Connect,
                timeout: timeouts.connect(),
            })?
            .map_err(|e| match e {
                ClientError::Io(source) => TransportError::Connect {
                    address: address.clone(),
                    source,
                },
                other => at_stage(Stage::Connect, other),
            })?;

        let mut session = Self { client, timeouts };
        session.handshake(endpoint, settings).await?;

        Ok(session)
    }

    async fn handshake(
        &mut self,
        endpoint: &Endpoint,
        settings: &SmtpSettings,
    ) -> Result<(), TransportError> {
        let greeting = step(
            Stage::Greeting,
            self.timeouts.ehlo(),
            self.client.read_greeting(),
        )
        .await?;
        success(Stage::Greeting, greeting)?;

        let mut ehlo = self.hello(&settings.helo_name).await?;

        if endpoint.security == TransportSecurity::StartTls {
            if !ehlo.has_capability("STARTTLS") {
                return Err(TransportError::Other(
                    "STARTTLS not offered by server".to_string(),
                ));
            }

            let response = step(
                Stage::StartTls,
                self.timeouts.starttls(),
                self.client.starttls(),
            )
            .await?;
            success(Stage::StartTls, response)?;

            ehlo = self.hello(&settings.helo_name).await?;
        }

        step(
            Stage::Auth,
            self.timeouts.auth(),
            self.client.authenticate(
                &endpoint.username,
                endpoint.password.expose(),
                &ehlo,
            ),
        )
        .await?;

        debug!(endpoint = %endpoint, tls = self.client.is_tls(), "Session established");
        Ok(())
    }

    /// EHLO, falling back to HELO when EHLO is refused.
    async fn hello(&mut self, helo_name: &str) -> Result<Response, TransportError> {
        let ehlo = step(Stage::Ehlo, self.timeouts.ehlo(), self.client.ehlo(helo_name)).await?;
        if ehlo.is_success() || !ehlo.is_permanent_error() {
            return success(Stage::Ehlo, ehlo);
        }

        let helo = step(Stage::Ehlo, self.timeouts.ehlo(), self.client.helo(helo_name)).await?;
        success(Stage::Ehlo, helo)
    }

    /// QUIT, where failure is only worth a log line.
    async fn quit(mut self, endpoint: &Endpoint) {
        match tokio::time::timeout(self.timeouts.quit(), self.client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => debug!(endpoint = %endpoint, %error, "QUIT failed"),
            Err(_) => debug!(
                endpoint = %endpoint,
                timeout = ?self.timeouts.quit(),
                "QUIT timed out"
            ),
        }
    }
}

/// Sends each message in its own authenticated SMTP session
#[derive(Debug, Clone, Default)]
pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    pub const fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        endpoint: &Endpoint,
        envelope: &Envelope,
    ) -> Result<Receipt, TransportError> {
        let mut session = Session::connect(endpoint, &self.settings).await?;
        let timeouts = session.timeouts.clone();
        let client = &mut session.client;

        let response = step(
            Stage::MailFrom,
            timeouts.mail_from(),
            client.mail_from(&envelope.from, None),
        )
        .await?;
        success(Stage::MailFrom, response)?;

        let response = step(
            Stage::RcptTo,
            timeouts.rcpt_to(),
            client.rcpt_to(&envelope.recipient),
        )
        .await?;
        success(Stage::RcptTo, response)?;

        let response = step(Stage::Data, timeouts.data(), client.data()).await?;
        expect(Stage::Data, response, Response::is_intermediate)?;

        let response = step(
            Stage::Data,
            timeouts.data(),
            client.send_data(&envelope.data),
        )
        .await?;
        let accepted = success(Stage::Data, response)?;

        session.quit(endpoint).await;

        Ok(Receipt {
            code: accepted.code,
            message: accepted.message(),
        })
    }
}

/// Opens an authenticated session and quits
#[derive(Debug, Clone, Default)]
pub struct SmtpProbe {
    settings: SmtpSettings,
}

impl SmtpProbe {
    pub const fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl HealthProbe for SmtpProbe {
    async fn probe(&self, endpoint: &Endpoint) -> Result<(), TransportError> {
        Session::connect(endpoint, &self.settings)
            .await?
            .quit(endpoint)
            .await;

        Ok(())
    }
}
