//! Recipient lists: one address per line, `#` comments and blank lines
//! ignored.

use std::path::Path;

use anyhow::Context;

pub fn parse_recipients(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect()
}

/// # Errors
///
/// When the file cannot be read.
pub async fn load_recipients(path: impl AsRef<Path>) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Unable to read recipients from {}", path.display()))?;

    Ok(parse_recipients(&text))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let text = "# launch list\nalice@example.org\n\n  bob@example.org  \n#carol@example.org\n";

        assert_eq!(
            parse_recipients(text),
            vec!["alice@example.org".to_string(), "bob@example.org".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_file_names_the_path() {
        let error = load_recipients("/nonexistent/recipients.txt")
            .await
            .unwrap_err();

        assert!(error.to_string().contains("/nonexistent/recipients.txt"));
    }
}
