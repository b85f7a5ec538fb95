//! Gmail message normalization
//!
//! Converts raw Gmail API messages into [`MessageContent`] records. Parsing
//! never fails as a whole: broken parts are skipped and reported as issues
//! next to whatever content could be recovered.

use log::{debug, warn};

use super::RawMessage;
use super::html::strip_html;
use super::mime::{Part, decode_base64_body};
use crate::config::{DEFAULT_BODY_MAX_BYTES, DigestSettings};
use crate::error::DigestError;
use crate::images::ImageReferenceExtractor;
use crate::models::{MessageContent, MessageId, ThreadId};

/// Appended to bodies cut at the size limit
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated]";

/// Result of parsing one message
#[derive(Debug)]
pub struct ParsedMessage {
    pub content: MessageContent,
    /// Non-fatal problems, all [`DigestError::Parsing`]
    pub issues: Vec<DigestError>,
}

/// Turns raw provider messages into normalized content
#[derive(Debug, Clone)]
pub struct MessageParser {
    body_max_bytes: usize,
    images: Option<ImageReferenceExtractor>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_MAX_BYTES)
    }
}

impl MessageParser {
    /// Parser without image extraction
    pub fn new(body_max_bytes: usize) -> Self {
        Self {
            body_max_bytes,
            images: None,
        }
    }

    /// Enable image extraction from HTML parts
    pub fn with_images(mut self, extractor: ImageReferenceExtractor) -> Self {
        self.images = Some(extractor);
        self
    }

    pub fn from_settings(settings: &DigestSettings) -> Self {
        let parser = Self::new(settings.body_max_bytes);
        if settings.image_processing_enabled {
            parser.with_images(
                ImageReferenceExtractor::new()
                    .with_allowed_domains(settings.allowed_image_domains.clone())
                    .with_max_images(settings.max_images_per_message),
            )
        } else {
            parser
        }
    }

    /// Parse one raw message. The same input always gives the same output.
    pub fn parse(&self, raw: &RawMessage) -> ParsedMessage {
        let mut issues = Vec::new();
        let builder =
            MessageContent::builder(MessageId::new(&raw.id), ThreadId::new(&raw.thread_id));

        let Some(payload) = raw.payload.as_ref() else {
            warn!("Message {} has no payload", raw.id);
            issues.push(DigestError::Parsing(format!("message {} has no payload", raw.id)));
            return ParsedMessage {
                content: builder.build(),
                issues,
            };
        };

        let header = |name: &str| payload.header(name).unwrap_or_default().to_string();
        let builder = builder
            .subject(header("Subject"))
            .sender(header("From"))
            .timestamp(header("Date"));

        let tree = Part::from_api(payload, &mut issues);
        let leaves = tree.leaves();

        let plain = first_decoded(&leaves, Kind::PlainText, &mut issues);
        // HTML is needed as a body fallback and as the image source
        let html = if plain.is_none() || self.images.is_some() {
            first_decoded(&leaves, Kind::Html, &mut issues)
        } else {
            None
        };

        let body = match (&plain, &html) {
            (Some(text), _) => text.clone(),
            (None, Some(html)) => strip_html(html),
            (None, None) => String::new(),
        };

        let images = match (&self.images, &html) {
            (Some(extractor), Some(html)) => extractor.extract(html),
            _ => Vec::new(),
        };
        if !images.is_empty() {
            debug!("Found {} image(s) in message {}", images.len(), raw.id);
        }

        let attachments = tree.attachments();
        for issue in &issues {
            debug!("Message {}: {}", raw.id, issue);
        }

        ParsedMessage {
            content: builder
                .body(truncate_body(&body, self.body_max_bytes))
                .attachments(attachments)
                .images(images)
                .build(),
            issues,
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    PlainText,
    Html,
}

/// Decoded content of the first part of `kind` that decodes to non-blank text.
/// Undecodable parts are recorded and skipped.
fn first_decoded(leaves: &[&Part], kind: Kind, issues: &mut Vec<DigestError>) -> Option<String> {
    for part in leaves {
        let (part_id, data) = match (kind, part) {
            (Kind::PlainText, Part::PlainText { part_id, data })
            | (Kind::Html, Part::Html { part_id, data }) => (part_id, data),
            _ => continue,
        };
        let Some(data) = data else { continue };

        match decode_base64_body(data) {
            Some(text) if !text.trim().is_empty() => return Some(text),
            Some(_) => {}
            None => issues.push(DigestError::Parsing(format!(
                "part {} has undecodable body data",
                part_id.as_deref().unwrap_or("?")
            ))),
        }
    }
    None
}

/// Cap `body` at `max_bytes` on a char boundary, appending [`TRUNCATION_MARKER`]
pub fn truncate_body(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }

    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", body[..end].trim_end(), TRUNCATION_MARKER)
}
