//! Failure classification.
//!
//! Error text is matched, lower-cased, against an ordered keyword table; the
//! first category with any matching keyword wins. Some keywords are very
//! broad (`4`, `host`, `message`), so the order matters as much as the
//! keywords themselves.

use std::{fmt, sync::LazyLock, time::Duration};

use regex::Regex;
use serde::Serialize;

use crate::endpoint::Endpoint;

/// What kind of failure an error text describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Recipient,
    RateLimit,
    Connection,
    SecuritySsl,
    MalwareSpam,
    Content,
    Dns,
    Temporary,
    Blacklist,
    Unknown,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Recipient => "recipient",
            Self::RateLimit => "rate_limit",
            Self::Connection => "connection",
            Self::SecuritySsl => "security_ssl",
            Self::MalwareSpam => "malware_spam",
            Self::Content => "content",
            Self::Dns => "dns",
            Self::Temporary => "temporary",
            Self::Blacklist => "blacklist",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword table, in match order.
const CATEGORY_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Authentication,
        &[
            "authentication failed",
            "auth",
            "username",
            "password",
            "535",
            "invalid credentials",
            "login failed",
        ],
    ),
    (
        ErrorCategory::Recipient,
        &[
            "recipient",
            "mailbox",
            "user unknown",
            "550",
            "551",
            "address rejected",
            "no such user",
            "invalid recipient",
        ],
    ),
    (
        ErrorCategory::RateLimit,
        &[
            "rate limit",
            "quota",
            "too many",
            "421",
            "452",
            "throttled",
            "sending limit",
            "exceeded",
        ],
    ),
    (
        ErrorCategory::Connection,
        &[
            "connection",
            "timeout",
            "refused",
            "network",
            "unreachable",
            "host",
            "socket",
        ],
    ),
    (
        ErrorCategory::SecuritySsl,
        &[
            "ssl",
            "tls",
            "certificate",
            "handshake",
            "secure connection",
            "encryption",
        ],
    ),
    (
        ErrorCategory::MalwareSpam,
        &[
            "virus",
            "malware",
            "spam",
            "blocked",
            "security",
            "policy",
            "554",
            "content filtered",
            "suspicious",
        ],
    ),
    (
        ErrorCategory::Content,
        &[
            "content",
            "message",
            "body",
            "mime",
            "format",
            "encoding",
            "invalid message",
        ],
    ),
    (
        ErrorCategory::Dns,
        &[
            "dns",
            "domain",
            "mx record",
            "nxdomain",
            "name resolution",
            "lookup failed",
        ],
    ),
    (
        ErrorCategory::Temporary,
        &[
            "temporary",
            "try again",
            "4",
            "service unavailable",
            "server busy",
        ],
    ),
    (
        ErrorCategory::Blacklist,
        &[
            "blacklist",
            "reputation",
            "rbl",
            "dnsbl",
            "blocked ip",
            "sender reputation",
        ],
    ),
];

#[allow(clippy::expect_used, reason = "The pattern is a constant")]
static STATUS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[45][0-9]{2}\b").expect("valid status code pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

/// A diagnosed failure with an operator-facing recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub issue_type: &'static str,
    pub root_cause: String,
    pub recommended_action: &'static str,
    pub severity: Severity,
    /// Whether sending again later is expected to help.
    pub retryable: bool,
    pub status_code: Option<u16>,
    /// The original error text.
    pub technical_details: String,
}

/// Longest technical detail shown in full by the summary.
const DETAIL_WIDTH: usize = 60;

impl ErrorReport {
    /// The report as `(label, value)` rows, in display order.
    pub fn summary_rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Status", format!("Failed: {}", self.issue_type)),
            ("Severity", self.severity.to_string()),
            ("Root Cause", self.root_cause.clone()),
            ("Action", self.recommended_action.to_string()),
        ];

        if !self.technical_details.is_empty() {
            let details = if self.technical_details.chars().count() < DETAIL_WIDTH {
                self.technical_details.clone()
            } else {
                let head: String = self
                    .technical_details
                    .chars()
                    .take(DETAIL_WIDTH - 3)
                    .collect();
                format!("{head}...")
            };
            rows.push(("Technical", details));
        }

        if let Some(code) = self.status_code {
            rows.push(("Error Code", code.to_string()));
        }

        rows.push((
            "Auto Retry",
            if self.retryable {
                "Recommended"
            } else {
                "Not Recommended"
            }
            .to_string(),
        ));

        rows
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.summary_rows() {
            writeln!(f, "| {label:<12}| {value}")?;
        }
        Ok(())
    }
}

/// The category for an error text. Matching is case-insensitive and the
/// first category in table order wins.
pub fn categorize(error_text: &str) -> ErrorCategory {
    let text = error_text.to_lowercase();

    CATEGORY_PATTERNS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
        .map_or(ErrorCategory::Unknown, |(category, _)| *category)
}

/// The first standalone three digit token starting with 4 or 5.
pub fn extract_status_code(error_text: &str) -> Option<u16> {
    STATUS_CODE
        .find(error_text)
        .and_then(|found| found.as_str().parse().ok())
}

/// Classify a failure to send to `recipient` through `endpoint`.
pub fn classify(error_text: &str, recipient: &str, endpoint: &Endpoint) -> ErrorReport {
    let category = categorize(error_text);
    let host = &endpoint.host;

    let (issue_type, root_cause, recommended_action, severity, retryable) = match category {
        ErrorCategory::Authentication => (
            "SMTP Authentication Failed",
            format!("Invalid credentials for {} on {host}", endpoint.username),
            "Verify the username and password for this endpoint in the endpoint file",
            Severity::High,
            false,
        ),
        ErrorCategory::Recipient => (
            "Recipient Address Invalid",
            format!("Email address {recipient} does not exist or is rejected by server"),
            "Remove the address from the list or correct its format",
            Severity::Medium,
            false,
        ),
        ErrorCategory::RateLimit => (
            "Rate Limiting Detected",
            format!("SMTP server {host} is limiting send rate"),
            "Reduce sending speed, add delays, or spread load over more endpoints",
            Severity::Medium,
            true,
        ),
        ErrorCategory::Connection => (
            "Connection Failed",
            format!("Cannot establish connection to {host}:{}", endpoint.port),
            "Check network connectivity, firewall rules, and the SMTP server status",
            Severity::High,
            true,
        ),
        ErrorCategory::SecuritySsl => (
            "SSL/TLS Security Error",
            format!("Secure connection handshake failed with {host}"),
            "Verify the port and security mode (465 implicit TLS, 587 STARTTLS)",
            Severity::High,
            false,
        ),
        ErrorCategory::MalwareSpam => (
            "Security/Content Blocked",
            "Email flagged as spam/malware by security filters".to_string(),
            "Review the message content and links, and check sender reputation",
            Severity::High,
            false,
        ),
        ErrorCategory::Content => (
            "Email Content Error",
            "Invalid email format, encoding, or MIME structure".to_string(),
            "Check the template, its character encoding, and the MIME headers",
            Severity::Medium,
            false,
        ),
        ErrorCategory::Dns => (
            "DNS Resolution Failed",
            format!(
                "Cannot resolve domain for {}",
                recipient
                    .split_once('@')
                    .map_or("unknown domain", |(_, domain)| domain)
            ),
            "Verify the recipient domain exists and has valid MX records",
            Severity::Medium,
            true,
        ),
        ErrorCategory::Temporary => (
            "Temporary Server Error",
            "SMTP server experiencing temporary issues (4xx error)".to_string(),
            "Retry after a short delay, the server should recover",
            Severity::Low,
            true,
        ),
        ErrorCategory::Blacklist => (
            "Sender Blacklisted",
            "Sender IP or domain is on blacklist/reputation database".to_string(),
            "Check sender reputation, use a different provider, or request delisting",
            Severity::High,
            false,
        ),
        ErrorCategory::Unknown => (
            "Unknown Error",
            "Unable to categorize specific error cause".to_string(),
            "Review the technical details and the endpoint configuration",
            Severity::Medium,
            false,
        ),
    };

    ErrorReport {
        category,
        issue_type,
        root_cause,
        recommended_action,
        severity,
        retryable,
        status_code: extract_status_code(error_text),
        technical_details: error_text.to_string(),
    }
}

/// How long to wait before the failure is worth retrying. A fixed value per
/// category; it does not grow with repeated failures.
pub const fn get_retry_delay(report: &ErrorReport) -> Duration {
    Duration::from_secs(match report.category {
        ErrorCategory::RateLimit => 60,
        ErrorCategory::Temporary => 120,
        ErrorCategory::Dns => 45,
        _ => 30,
    })
}
