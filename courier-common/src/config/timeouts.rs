//! Client-side SMTP timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-stage timeouts applied while talking to a submission endpoint.
///
/// All values are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Covers the greeting and EHLO.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::ehlo_secs")]
    pub ehlo_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::starttls_secs")]
    pub starttls_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::auth_secs")]
    pub auth_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::mail_from_secs")]
    pub mail_from_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "defaults::rcpt_to_secs")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA command and message transfer.
    ///
    /// Default: 120 seconds
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Default: 10 seconds (a QUIT timeout never fails a send)
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            ehlo_secs: defaults::ehlo_secs(),
            starttls_secs: defaults::starttls_secs(),
            auth_secs: defaults::auth_secs(),
            mail_from_secs: defaults::mail_from_secs(),
            rcpt_to_secs: defaults::rcpt_to_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl ClientTimeouts {
    /// The same timeout for every stage.
    pub const fn uniform(secs: u64) -> Self {
        Self {
            connect_secs: secs,
            ehlo_secs: secs,
            starttls_secs: secs,
            auth_secs: secs,
            mail_from_secs: secs,
            rcpt_to_secs: secs,
            data_secs: secs,
            quit_secs: secs,
        }
    }

    /// Cap every stage at `secs`, used to honour an endpoint's own timeout.
    #[must_use]
    pub fn capped(&self, secs: u64) -> Self {
        Self {
            connect_secs: self.connect_secs.min(secs),
            ehlo_secs: self.ehlo_secs.min(secs),
            starttls_secs: self.starttls_secs.min(secs),
            auth_secs: self.auth_secs.min(secs),
            mail_from_secs: self.mail_from_secs.min(secs),
            rcpt_to_secs: self.rcpt_to_secs.min(secs),
            data_secs: self.data_secs.min(secs),
            quit_secs: self.quit_secs.min(secs),
        }
    }

    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    pub const fn starttls(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn ehlo_secs() -> u64 {
        30
    }
    pub const fn starttls_secs() -> u64 {
        30
    }
    pub const fn auth_secs() -> u64 {
        30
    }
    pub const fn mail_from_secs() -> u64 {
        30
    }
    pub const fn rcpt_to_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120 // 2 minutes
    }
    pub const fn quit_secs() -> u64 {
        10
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let timeouts = ClientTimeouts::default();
        assert_eq!(timeouts.connect_secs, 30);
        assert_eq!(timeouts.auth_secs, 30);
        assert_eq!(timeouts.data_secs, 120);
        assert_eq!(timeouts.quit(), Duration::from_secs(10));
    }

    #[test]
    fn partial_ron_uses_defaults() {
        let timeouts: ClientTimeouts = ron::from_str("(data_secs: 60)").unwrap();
        assert_eq!(timeouts.data_secs, 60);
        assert_eq!(timeouts.ehlo_secs, 30);
    }

    #[test]
    fn capped_by_endpoint_timeout() {
        let timeouts = ClientTimeouts::default().capped(20);
        assert_eq!(timeouts.data_secs, 20);
        assert_eq!(timeouts.quit_secs, 10);
        assert_eq!(ClientTimeouts::uniform(20).capped(100), ClientTimeouts::uniform(20));
    }
}
