//! Submission endpoints and the endpoint file format.
//!
//! One endpoint per line:
//!
//! ```text
//! host|port|username|password[|sender|security]
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. `security` is one of
//! `ssl`/`implicit`, `starttls`/`tls` or `none`/`plain`; when absent it is
//! derived from the port.

use std::{fmt, path::Path};

use courier_common::config::TransportSecurity;
use serde::Serialize;

use crate::error::{ConfigError, LineError};

const DEFAULT_MAX_CONNECTIONS: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A credential that never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Identity of an endpoint: the account on a given server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointId {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// An authenticated SMTP submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    /// Address used in `MAIL FROM` and `From:`; the username unless given.
    pub sender: String,
    /// Upper bound on concurrent connections to this endpoint.
    pub max_connections: usize,
    pub timeout_secs: u64,
    pub security: TransportSecurity,
}

impl Endpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let username = username.into();
        Self {
            host: host.into(),
            port,
            sender: username.clone(),
            username,
            password: Secret::new(password),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            security: TransportSecurity::for_port(port),
        }
    }

    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    #[must_use]
    pub const fn with_security(mut self, security: TransportSecurity) -> Self {
        self.security = security;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn id(&self) -> EndpointId {
        EndpointId {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }

    /// `host:port`, suitable for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// The result of loading an endpoint file.
#[derive(Debug, Default)]
pub struct EndpointFile {
    /// Usable endpoints in file order.
    pub endpoints: Vec<Endpoint>,
    /// Lines that could not be used.
    pub errors: Vec<LineError>,
}

/// Parse the endpoint file format, collecting per-line errors rather than
/// stopping at the first bad line.
pub fn parse_endpoints(text: &str) -> EndpointFile {
    let mut file = EndpointFile::default();

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Ok(endpoint) => file.endpoints.push(endpoint),
            Err(reason) => file.errors.push(LineError {
                line: index + 1,
                reason,
            }),
        }
    }

    file
}

fn parse_line(line: &str) -> Result<Endpoint, String> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();

    let [host, port, username, password, rest @ ..] = fields.as_slice() else {
        return Err(format!(
            "expected host|port|username|password, found {} field(s)",
            fields.len()
        ));
    };

    if rest.len() > 2 {
        return Err(format!("too many fields ({})", fields.len()));
    }

    if host.is_empty() {
        return Err("empty host".to_string());
    }

    let port = port
        .parse::<u16>()
        .map_err(|_| format!("invalid port '{port}'"))?;

    let mut endpoint = Endpoint::new(*host, port, *username, *password);

    if let Some(sender) = rest.first().filter(|sender| !sender.is_empty()) {
        endpoint = endpoint.with_sender(*sender);
    }

    if let Some(security) = rest.get(1).filter(|security| !security.is_empty()) {
        let security = security
            .parse::<TransportSecurity>()
            .map_err(|e| e.to_string())?;
        endpoint = endpoint.with_security(security);
    }

    Ok(endpoint)
}

/// Read and parse an endpoint file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] when the file cannot be read. Bad lines are
/// reported in [`EndpointFile::errors`] instead.
pub async fn load_endpoints(path: impl AsRef<Path>) -> Result<EndpointFile, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(parse_endpoints(&text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    const FILE: &str = "\
# primary accounts
smtp.example.com|587|alice@example.com|hunter2

smtp.example.net|465|bob|pa55|bob@example.net
relay.example.org|2525|carol|secret||none
";

    #[test]
    fn parses_valid_lines_in_order() {
        let file = parse_endpoints(FILE);

        assert!(file.errors.is_empty());
        assert_eq!(file.endpoints.len(), 3);

        let alice = &file.endpoints[0];
        assert_eq!(alice.host, "smtp.example.com");
        assert_eq!(alice.port, 587);
        assert_eq!(alice.sender, "alice@example.com");
        assert_eq!(alice.password.expose(), "hunter2");
        assert_eq!(alice.security, TransportSecurity::StartTls);
        assert_eq!(alice.max_connections, 5);
        assert_eq!(alice.timeout_secs, 30);

        let bob = &file.endpoints[1];
        assert_eq!(bob.sender, "bob@example.net");
        assert_eq!(bob.security, TransportSecurity::ImplicitTls);

        let carol = &file.endpoints[2];
        assert_eq!(carol.sender, "carol");
        assert_eq!(carol.security, TransportSecurity::None);
    }

    #[test]
    fn collects_line_errors() {
        let file = parse_endpoints(
            "only|three|fields\n\
             |25|user|pass\n\
             host|port|user|pass\n\
             host|70000|user|pass\n\
             host|25|user|pass|sender|quantum\n\
             host|25|user|pass|a|tls|extra\n\
             good.example.com|25|user|pass\n",
        );

        assert_eq!(file.endpoints.len(), 1);
        assert_eq!(file.endpoints[0].host, "good.example.com");

        let lines: Vec<usize> = file.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5, 6]);
        assert!(file.errors[0].reason.contains("found 3 field(s)"));
        assert_eq!(file.errors[1].reason, "empty host");
        assert_eq!(file.errors[2].reason, "invalid port 'port'");
        assert!(file.errors[4].reason.contains("quantum"));
    }

    #[test]
    fn secret_is_redacted() {
        let endpoint = Endpoint::new("smtp.example.com", 587, "alice", "hunter2");
        let debug = format!("{endpoint:?}");

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Secret(***)"));
        assert_eq!(endpoint.to_string(), "alice@smtp.example.com:587");
        assert_eq!(endpoint.id().to_string(), "alice@smtp.example.com:587");
        assert_eq!(endpoint.address(), "smtp.example.com:587");
    }

    #[tokio::test]
    async fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FILE.as_bytes()).unwrap();

        let loaded = load_endpoints(file.path()).await.unwrap();
        assert_eq!(loaded.endpoints.len(), 3);

        let missing = load_endpoints("/nonexistent/courier/endpoints.txt").await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
