//! Builder for simple `text/plain` messages.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::error::{ClientError, Result};

/// Builder for an RFC 5322 message with a single UTF-8 text body.
///
/// `Date` and `Message-ID` are filled in at build time unless set explicitly.
///
/// ```
/// use courier_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello")
///     .body("This is the message body")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("Subject: Hello\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: Option<String>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, email: impl Into<String>) -> Self {
        self.from = Some(email.into());
        self
    }

    #[must_use]
    pub fn to(mut self, email: impl Into<String>) -> Self {
        self.to.push(email.into());
        self
    }

    #[must_use]
    pub fn cc(mut self, email: impl Into<String>) -> Self {
        self.cc.push(email.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the `Message-ID`, without angle brackets.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Adds a custom header. Headers are written in insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, content: impl Into<String>) -> Self {
        self.body = Some(content.into());
        self
    }

    /// Builds the final message text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BuilderError`] when there is no `From` address,
    /// no recipient, or a header value contains a line break.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| ClientError::BuilderError("missing From address".to_string()))?;

        if self.to.is_empty() {
            return Err(ClientError::BuilderError("missing To address".to_string()));
        }

        let date = self.date.unwrap_or_else(Utc::now);
        let message_id = self.message_id.clone().unwrap_or_else(|| {
            let domain = from
                .rsplit_once('@')
                .map_or("localhost", |(_, domain)| domain);
            format!("{}@{domain}", ulid::Ulid::new())
        });

        let mut headers = vec![
            ("From".to_string(), from.to_string()),
            ("To".to_string(), self.to.join(", ")),
        ];
        if !self.cc.is_empty() {
            headers.push(("Cc".to_string(), self.cc.join(", ")));
        }
        if let Some(subject) = &self.subject {
            headers.push(("Subject".to_string(), subject.clone()));
        }
        headers.push(("Date".to_string(), date.to_rfc2822()));
        headers.push(("Message-ID".to_string(), format!("<{message_id}>")));
        headers.extend(self.headers);
        headers.push(("MIME-Version".to_string(), "1.0".to_string()));
        headers.push((
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        ));

        let mut message = String::with_capacity(1024);
        for (name, value) in &headers {
            if name.contains(['\r', '\n', ':']) || value.contains(['\r', '\n']) {
                return Err(ClientError::BuilderError(format!(
                    "header {name} contains a line break"
                )));
            }
            let _ = write!(message, "{name}: {value}\r\n");
        }

        message.push_str("\r\n");
        if let Some(body) = &self.body {
            message.push_str(body);
        }

        Ok(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn simple_message() {
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Test")
            .body("Hello World")
            .build()
            .unwrap();

        assert!(message.starts_with("From: sender@example.com\r\nTo: recipient@example.com\r\n"));
        assert!(message.contains("Subject: Test\r\n"));
        assert!(message.contains("Content-Type: text/plain; charset=utf-8\r\n\r\nHello World"));
    }

    #[test]
    fn generated_date_and_message_id() {
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .build()
            .unwrap();

        let id = message
            .lines()
            .find_map(|line| line.strip_prefix("Message-ID: "))
            .unwrap();
        assert!(id.starts_with('<') && id.ends_with("@example.com>"), "{id}");
        assert!(message.contains("Date: "));
    }

    #[test]
    fn explicit_date_and_id() {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let message = MessageBuilder::new()
            .from("sender")
            .to("recipient@example.com")
            .date(date)
            .message_id("fixed@host")
            .build()
            .unwrap();

        assert!(message.contains("Date: Fri, "));
        assert!(message.contains("Mar 2024 09:30:00 +0000\r\n"));
        assert!(message.contains("Message-ID: <fixed@host>\r\n"));
    }

    #[test]
    fn multiple_recipients_and_custom_headers() {
        let message = MessageBuilder::new()
            .from("sender@example.com")
            .to("recipient1@example.com")
            .to("recipient2@example.com")
            .cc("copy@example.com")
            .header("X-Campaign", "spring")
            .build()
            .unwrap();

        assert!(message.contains("To: recipient1@example.com, recipient2@example.com\r\n"));
        assert!(message.contains("Cc: copy@example.com\r\n"));
        assert!(message.contains("X-Campaign: spring\r\n"));
    }

    #[test]
    fn rejects_incomplete_or_injected() {
        assert!(MessageBuilder::new().to("a@example.com").build().is_err());
        assert!(MessageBuilder::new().from("a@example.com").build().is_err());

        let injected = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("hi\r\nBcc: victim@example.com")
            .build();
        assert!(matches!(injected, Err(ClientError::BuilderError(_))));
    }
}
