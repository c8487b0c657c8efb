//! Producing message bodies and envelopes.

use ahash::AHashMap;
use courier_smtp::client::MessageBuilder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Unknown template {0}")]
    UnknownTemplate(String),

    #[error("Unable to build message: {0}")]
    Build(String),
}

/// Renders message bodies and assembles complete messages.
pub trait ContentProducer: Send + Sync {
    /// # Errors
    ///
    /// When the template cannot be rendered for `recipient`.
    fn render(&self, template_id: &str, recipient: &str) -> Result<String, ContentError>;

    /// # Errors
    ///
    /// When the pieces do not make a valid message.
    fn build_envelope(
        &self,
        from: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ContentError>;
}

/// Fixed bodies by template id; the recipient address is the only thing
/// substituted, for `{recipient}`.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    templates: AHashMap<String, String>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_template(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(id.into(), body.into());
        self
    }
}

impl FromIterator<(String, String)> for StaticContent {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            templates: iter.into_iter().collect(),
        }
    }
}

impl ContentProducer for StaticContent {
    fn render(&self, template_id: &str, recipient: &str) -> Result<String, ContentError> {
        self.templates
            .get(template_id)
            .map(|body| body.replace("{recipient}", recipient))
            .ok_or_else(|| ContentError::UnknownTemplate(template_id.to_string()))
    }

    fn build_envelope(
        &self,
        from: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, ContentError> {
        MessageBuilder::new()
            .from(from)
            .to(recipient)
            .subject(subject)
            .body(body)
            .build()
            .map_err(|e| ContentError::Build(e.to_string()))
    }
}
