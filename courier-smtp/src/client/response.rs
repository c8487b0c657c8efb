//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// Represents a complete SMTP response, which may be multi-line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by spaces.
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Returns `true` if this response indicates success (2xx code).
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for a 3xx intermediate reply (354, 334).
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    pub const fn is_error(&self) -> bool {
        self.is_temporary_error() || self.is_permanent_error()
    }

    /// The EHLO keywords advertised in this response, upper-cased.
    ///
    /// The first line of an EHLO reply is the server greeting and is skipped.
    pub fn capabilities(&self) -> impl Iterator<Item = String> + '_ {
        self.lines
            .iter()
            .skip(1)
            .map(|line| line.trim().to_ascii_uppercase())
    }

    /// Whether the EHLO response advertises `keyword` (e.g. `STARTTLS`).
    pub fn has_capability(&self, keyword: &str) -> bool {
        self.capabilities().any(|capability| {
            capability
                .split_whitespace()
                .next()
                .is_some_and(|name| name.eq_ignore_ascii_case(keyword))
        })
    }

    /// The SASL mechanisms from an `AUTH` (or legacy `AUTH=`) capability line.
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.capabilities()
            .filter_map(|capability| {
                capability
                    .strip_prefix("AUTH ")
                    .or_else(|| capability.strip_prefix("AUTH="))
                    .map(|mechanisms| {
                        mechanisms
                            .split_whitespace()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                    })
            })
            .flatten()
            .collect()
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line
            .get(..3)
            .ok_or_else(|| ClientError::ParseError(format!("Response line too short: '{line}'")))?;

        let code = code_str
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code_str}'")))?;

        let is_last = match line[3..].chars().next() {
            Some(' ') | None => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete multi-line SMTP response from a buffer.
    ///
    /// Returns the parsed `Response` and the number of bytes consumed, or
    /// `None` when more data is needed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut first_code = None;

        while let Some(end) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(std::str::from_utf8(raw)?)?;

            match first_code {
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(first_code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_single_line() {
        let line = ResponseLine {
            code: 220,
            is_last: true,
            message: "mail.example.com ESMTP".to_string(),
        };
        assert_eq!(
            Response::parse_line("220 mail.example.com ESMTP").unwrap(),
            line
        );
    }

    #[test]
    fn parse_multi_line_indicator() {
        let line = Response::parse_line("250-mail.example.com").unwrap();
        assert!(!line.is_last);
        assert_eq!(line.message, "mail.example.com");

        let bare = Response::parse_line("250").unwrap();
        assert!(bare.is_last);
        assert!(bare.message.is_empty());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Response::parse_line("25").is_err());
        assert!(Response::parse_line("abc hello").is_err());
        assert!(Response::parse_line("250+OK").is_err());
    }

    #[test]
    fn parse_complete_response() {
        let data = b"250 OK\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(response.lines, vec!["OK"]);
        assert_eq!(consumed, 8);
    }

    #[test]
    fn parse_multi_line_response() {
        let data = b"250-mail.example.com\r\n250-SIZE 10000000\r\n250 HELP\r\n";
        let (response, consumed) = Response::parse_response(data).unwrap().unwrap();
        assert_eq!(response.code, 250);
        assert_eq!(
            response.lines,
            vec!["mail.example.com", "SIZE 10000000", "HELP"]
        );
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn parse_incomplete_response() {
        let data = b"250-mail.example.com\r\n250-SIZE";
        assert!(Response::parse_response(data).unwrap().is_none());
    }

    #[test]
    fn parse_leaves_pipelined_bytes() {
        let data = b"250 OK\r\n354 go ahead\r\n";
        let (_, consumed) = Response::parse_response(data).unwrap().unwrap();
        let (next, _) = Response::parse_response(&data[consumed..]).unwrap().unwrap();
        assert_eq!(next.code, 354);
    }

    #[test]
    fn parse_code_mismatch() {
        let data = b"250-first\r\n251 second\r\n";
        assert!(Response::parse_response(data).is_err());
    }

    #[test]
    fn capabilities_and_auth() {
        let response = Response::new(
            250,
            vec![
                "smtp.example.com greets you".to_string(),
                "SIZE 35882577".to_string(),
                "starttls".to_string(),
                "AUTH LOGIN PLAIN XOAUTH2".to_string(),
            ],
        );

        assert!(response.has_capability("STARTTLS"));
        assert!(response.has_capability("size"));
        assert!(!response.has_capability("PIPELINING"));
        assert_eq!(response.auth_mechanisms(), vec!["LOGIN", "PLAIN", "XOAUTH2"]);
    }

    #[test]
    fn status_classes() {
        assert!(Response::new(250, vec![]).is_success());
        assert!(Response::new(354, vec![]).is_intermediate());
        assert!(Response::new(421, vec![]).is_temporary_error());
        assert!(Response::new(550, vec![]).is_permanent_error());
        assert!(Response::new(550, vec![]).is_error());
        assert!(!Response::new(250, vec![]).is_error());
    }
}
