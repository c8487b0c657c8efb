//! The seam between the dispatch loop and the wire.

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use courier_smtp::client::ClientError;
use thiserror::Error;

use crate::endpoint::Endpoint;

/// One message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address.
    pub from: String,
    /// `RCPT TO` address.
    pub recipient: String,
    /// Complete message, headers included.
    pub data: String,
}

/// The server's final answer to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub code: u16,
    pub message: String,
}

/// Step of an SMTP session, used to say where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
    Quit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth => "AUTH",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
            Self::Quit => "QUIT",
        })
    }
}

/// Why a send or probe failed.
///
/// The display text names the session step for logs. Neither it nor
/// [`TransportError::reason`] ever contains the endpoint address.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{stage} timeout after {}s", timeout.as_secs())]
    Timeout { stage: Stage, timeout: Duration },

    #[error("{stage} rejected: {code} {message}")]
    Rejected {
        stage: Stage,
        code: u16,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// The SMTP reply code behind this failure, if there was one.
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            Self::Client(client) => client.code(),
            _ => None,
        }
    }

    /// The failure as the server or the network described it, without the
    /// session step. This is the text that gets classified; step names such
    /// as `AUTH` or `STARTTLS` would otherwise match category keywords.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { code, message, .. } => format!("{code} {message}"),
            Self::Timeout { timeout, .. } => format!("timeout after {}s", timeout.as_secs()),
            other => other.to_string(),
        }
    }
}

/// Submits one message through one endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Any failure between connecting and the server's final reply to the
    /// message data.
    async fn send(
        &self,
        endpoint: &Endpoint,
        envelope: &Envelope,
    ) -> Result<Receipt, TransportError>;
}
