//! SMTP client with support for STARTTLS, implicit TLS and SMTP AUTH.

use std::{fmt, sync::Arc};

use base64::{Engine, engine::general_purpose::STANDARD};
use courier_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

/// Initial size of the read buffer for SMTP responses.
const BUFFER_SIZE: usize = 8192;

/// Maximum size of the read buffer to prevent unbounded growth (1MB).
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// An SMTP client connection that can be either plain TCP or TLS-wrapped.
enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        match self {
            Self::Plain(stream) => Ok(Self::Tls(Box::new(
                wrap_tls(stream, domain, accept_invalid_certs).await?,
            ))),
            Self::Tls(_) => Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            )),
        }
    }
}

async fn wrap_tls(
    stream: TcpStream,
    domain: &str,
    accept_invalid_certs: bool,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|e| ClientError::TlsError(format!("Failed to add certificate: {e}")))?;
    }
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "Some certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(domain.to_string())
        .map_err(|e| ClientError::TlsError(format!("Invalid server name: {e}")))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ClientError::TlsError(e.to_string()))
}

/// A certificate verifier that accepts all certificates (for testing only).
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::RSA_PSS_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// SASL mechanisms the client can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

impl AuthMechanism {
    /// Pick a mechanism from the ones a server advertised.
    ///
    /// `PLAIN` is preferred, and is also used when the server advertises
    /// nothing we recognise.
    pub fn select(advertised: &[String]) -> Self {
        let offers = |name: &str| advertised.iter().any(|m| m.eq_ignore_ascii_case(name));

        if !offers("PLAIN") && offers("LOGIN") {
            Self::Login
        } else {
            Self::Plain
        }
    }
}

impl fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        })
    }
}

/// An SMTP client for sending commands and receiving responses.
///
/// Commands return the server's [`Response`] without judging it, except for
/// the `auth_*` methods which fail unless the server accepts the credentials.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    fn with_connection(connection: ClientConnection, server_domain: String) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain,
            accept_invalid_certs: false,
        }
    }

    /// Opens a plain TCP connection to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: String) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self::with_connection(
            ClientConnection::Plain(stream),
            server_domain,
        ))
    }

    /// Opens a connection to `addr` and negotiates TLS before any SMTP traffic
    /// (SMTPS, usually port 465).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the TLS handshake fails.
    pub async fn connect_tls(
        addr: &str,
        server_domain: String,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let tls = wrap_tls(stream, &server_domain, accept_invalid_certs).await?;

        Ok(Self::with_connection(
            ClientConnection::Tls(Box::new(tls)),
            server_domain,
        )
        .accept_invalid_certs(accept_invalid_certs))
    }

    /// Sets whether to accept invalid TLS certificates on STARTTLS.
    ///
    /// Default is `false`. Set to `true` for testing only.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting (220 response).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is invalid.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        self.write_line(command).await
    }

    /// Like [`Self::send_command`], but never logs the line.
    async fn send_secret(&mut self, line: &str) -> Result<()> {
        outgoing!("<redacted>");
        self.write_line(line).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{line}\r\n");
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(data.as_bytes())
            .await
    }

    /// Sends a raw command and reads the response.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str, size: Option<usize>) -> Result<Response> {
        let cmd = if let Some(sz) = size {
            format!("MAIL FROM:<{from}> SIZE={sz}")
        } else {
            format!("MAIL FROM:<{from}>")
        };
        self.command(&cmd).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content, dot-stuffed with CRLF line endings, followed
    /// by the end-of-data marker.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let payload = dot_stuff(data);
        outgoing!("<{} bytes of message data>", payload.len());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(payload.as_bytes())
            .await?;

        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and, when the server agrees, upgrades the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let old_connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;

            // Anything buffered before the handshake was sent in the clear.
            self.buffer_pos = 0;
            self.connection = Some(
                old_connection
                    .upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
        }

        Ok(response)
    }

    /// Authenticates with the mechanism chosen from an EHLO response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SmtpError`] when the server rejects the
    /// credentials, or an IO error.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        ehlo: &Response,
    ) -> Result<Response> {
        match AuthMechanism::select(&ehlo.auth_mechanisms()) {
            AuthMechanism::Plain => self.auth_plain(username, password).await,
            AuthMechanism::Login => self.auth_login(username, password).await,
        }
    }

    /// `AUTH PLAIN` with an initial response (RFC 4616).
    ///
    /// # Errors
    ///
    /// Fails unless the server answers 235.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let payload = STANDARD.encode(format!("\x00{username}\x00{password}"));

        self.send_secret(&format!("AUTH PLAIN {payload}")).await?;
        let response = self.read_response().await?;
        expect_code(response, 235)
    }

    /// `AUTH LOGIN`, answering the username and password challenges.
    ///
    /// # Errors
    ///
    /// Fails unless the server walks through both 334 challenges and then
    /// answers 235.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let response = self.command("AUTH LOGIN").await?;
        expect_code(response, 334)?;

        self.send_secret(&STANDARD.encode(username)).await?;
        let response = self.read_response().await?;
        expect_code(response, 334)?;

        self.send_secret(&STANDARD.encode(password)).await?;
        let response = self.read_response().await?;
        expect_code(response, 235)
    }

    /// Reads a complete SMTP response from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());

                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

fn expect_code(response: Response, code: u16) -> Result<Response> {
    if response.code == code {
        Ok(response)
    } else if response.is_error() {
        Err(ClientError::SmtpError {
            code: response.code,
            message: response.message(),
        })
    } else {
        Err(ClientError::UnexpectedResponse {
            code: response.code,
            message: response.message(),
        })
    }
}

/// Normalises line endings to CRLF, doubles a leading `.` on every line
/// (RFC 5321 4.5.2) and appends the terminating `.` line.
fn dot_stuff(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 32 + 5);

    let body = data.strip_suffix('\n').unwrap_or(data);
    let body = body.strip_suffix('\r').unwrap_or(body);

    if !body.is_empty() {
        for line in body.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
    }

    out.push_str(".\r\n");
    out
}
