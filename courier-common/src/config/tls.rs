//! Transport security for SMTP submission endpoints.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// How the connection to an endpoint is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSecurity {
    /// TLS from the first byte (SMTPS, usually port 465).
    ImplicitTls,

    /// Plaintext greeting, then upgrade with STARTTLS.
    ///
    /// Negotiation failure is an error; there is no fallback to plaintext.
    StartTls,

    /// Never use TLS.
    ///
    /// **WARNING**: credentials are sent in the clear. Only for local testing.
    None,
}

impl TransportSecurity {
    /// The mode used when an endpoint does not name one.
    pub const fn for_port(port: u16) -> Self {
        if port == 465 {
            Self::ImplicitTls
        } else {
            Self::StartTls
        }
    }

    pub const fn is_tls(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Error returned when a security mode string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown transport security mode: {0}")]
pub struct UnknownSecurity(pub String);

impl FromStr for TransportSecurity {
    type Err = UnknownSecurity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssl" | "implicit" | "implicit_tls" => Ok(Self::ImplicitTls),
            "starttls" | "tls" => Ok(Self::StartTls),
            "none" | "plain" => Ok(Self::None),
            _ => Err(UnknownSecurity(s.to_string())),
        }
    }
}

impl fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ImplicitTls => "implicit_tls",
            Self::StartTls => "starttls",
            Self::None => "none",
        })
    }
}

/// TLS certificate validation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TlsCertificatePolicy {
    /// Whether to accept invalid TLS certificates (self-signed, expired, etc.).
    ///
    /// **SECURITY WARNING**: Setting this to `true` disables certificate validation
    /// and makes the connection vulnerable to man-in-the-middle attacks.
    ///
    /// Default: `false` (validate certificates)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}
