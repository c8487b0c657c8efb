//! Mock SMTP submission server for transport and probe tests
//!
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! The server can:
//! - Answer each command with a configured response
//! - Walk through AUTH PLAIN and AUTH LOGIN exchanges
//! - Hang on a chosen command to exercise timeouts
//! - Record received commands for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth_response(535, "5.7.8 Authentication credentials invalid")
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//!
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::{Engine, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    /// Mechanism plus the decoded username
    Auth { mechanism: String, username: String },
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content (after DATA), still dot-stuffed
    MessageContent(String),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo_response: Option<EhloResponse>,
    helo_response: SmtpResponse,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,

    // Failure injection
    timeout_on_command: Option<usize>,
}

#[derive(Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let cap_count = self.capabilities.len();

        for (i, cap) in self.capabilities.iter().enumerate() {
            let separator = if i + 1 < cap_count { '-' } else { ' ' };
            let _ = write!(&mut response, "{}{separator}{cap}\r\n", self.code);
        }

        response.into_bytes()
    }
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock submission server ready"),
            ehlo_response: Some(EhloResponse {
                code: 250,
                capabilities: vec![
                    "localhost".to_string(),
                    "SIZE 10000000".to_string(),
                    "AUTH PLAIN LOGIN".to_string(),
                ],
            }),
            helo_response: SmtpResponse::new(250, "Hello"),
            auth_response: SmtpResponse::new(235, "2.7.0 Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "2.0.0 OK: queued as 4XyZ"),
            quit_response: SmtpResponse::new(221, "Bye"),
            starttls_response: None,
            timeout_on_command: None,
        }
    }
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn respond(
        writer: &mut (impl AsyncWriteExt + Unpin),
        bytes: &[u8],
    ) -> std::io::Result<()> {
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    fn decode(encoded: &str) -> String {
        STANDARD
            .decode(encoded.trim())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;

        Self::respond(&mut writer, &config.greeting.to_bytes()).await?;
        if !(200..300).contains(&config.greeting.code) {
            return Ok(());
        }

        loop {
            line.clear();

            if let Some(timeout_on) = config.timeout_on_command
                && local_command_count == timeout_on
            {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let Ok(read_result) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };

            if read_result? == 0 {
                return Ok(());
            }

            local_command_count += 1;

            let cmd_line = line.trim().to_string();
            tracing::debug!("Mock server received: {}", cmd_line);

            let mut parts = cmd_line.splitn(2, ' ');
            let command = parts.next().unwrap_or_default().to_uppercase();
            let argument = parts.next().unwrap_or_default().to_string();

            let (response, smtp_cmd) = match command.as_str() {
                "EHLO" => {
                    let resp = config
                        .ehlo_response
                        .as_ref()
                        .map_or_else(|| config.helo_response.to_bytes(), EhloResponse::to_bytes);
                    (resp, SmtpCommand::Ehlo(argument))
                }
                "HELO" => (config.helo_response.to_bytes(), SmtpCommand::Helo(argument)),
                "AUTH" => {
                    let mut auth = argument.splitn(2, ' ');
                    let mechanism = auth.next().unwrap_or_default().to_uppercase();
                    let initial = auth.next().unwrap_or_default().to_string();

                    let username = if mechanism == "LOGIN" {
                        Self::respond(&mut writer, b"334 VXNlcm5hbWU6\r\n").await?;
                        line.clear();
                        reader.read_line(&mut line).await?;
                        let username = Self::decode(&line);

                        Self::respond(&mut writer, b"334 UGFzc3dvcmQ6\r\n").await?;
                        line.clear();
                        reader.read_line(&mut line).await?;
                        username
                    } else {
                        Self::decode(&initial)
                            .split('\0')
                            .nth(1)
                            .unwrap_or_default()
                            .to_string()
                    };

                    (
                        config.auth_response.to_bytes(),
                        SmtpCommand::Auth {
                            mechanism,
                            username,
                        },
                    )
                }
                "MAIL" => (
                    config.mail_from_response.to_bytes(),
                    SmtpCommand::MailFrom(argument),
                ),
                "RCPT" => (
                    config.rcpt_to_response.to_bytes(),
                    SmtpCommand::RcptTo(argument),
                ),
                "DATA" => (config.data_response.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    Self::respond(&mut writer, &config.quit_response.to_bytes()).await?;
                    return Ok(());
                }
                "STARTTLS" => (
                    config.starttls_response.as_ref().map_or_else(
                        || SmtpResponse::new(502, "Command not implemented").to_bytes(),
                        SmtpResponse::to_bytes,
                    ),
                    SmtpCommand::StartTls,
                ),
                _ => (
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            commands.write().await.push(smtp_cmd.clone());
            Self::respond(&mut writer, &response).await?;

            if matches!(smtp_cmd, SmtpCommand::Data) && config.data_response.code == 354 {
                let mut message_content = String::new();
                let mut data_line = String::new();

                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }

                    if data_line == ".\r\n" || data_line == ".\n" {
                        break;
                    }

                    message_content.push_str(&data_line);
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(message_content));
                Self::respond(&mut writer, &config.data_end_response.to_bytes()).await?;
            }
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// The connection is closed straight after a greeting outside 2xx.
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo_response = Some(EhloResponse { code, capabilities });
        self
    }

    /// The final answer to AUTH, after any challenges
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Hang on the Nth command (0-indexed, greeting excluded)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Bind to a random local port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !shutdown_clone.load(Ordering::Relaxed) {
                // Accept with a timeout so the shutdown flag is seen
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
        })
    }
}
