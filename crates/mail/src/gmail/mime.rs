//! Typed view of the Gmail MIME tree
//!
//! The provider hands us a loosely typed tree of parts. We classify each
//! node once into a [`Part`] so the body rules can be written as plain
//! pattern matches. Nesting deeper than [`MAX_PART_DEPTH`] is cut off.

use base64::prelude::*;

use super::api::MessagePart;
use crate::error::DigestError;
use crate::models::AttachmentMeta;

/// Deepest multipart nesting we descend into
pub const MAX_PART_DEPTH: usize = 32;

/// A classified MIME part
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// `text/plain` with its still-encoded body data
    PlainText {
        part_id: Option<String>,
        data: Option<String>,
    },
    /// `text/html` with its still-encoded body data
    Html {
        part_id: Option<String>,
        data: Option<String>,
    },
    /// Container with children in document order
    Multipart(Vec<Part>),
    /// Anything with a filename
    Attachment(AttachmentMeta),
    /// Inline parts we don't render (calendar invites, images without names...)
    Other { mime_type: String },
}

impl Part {
    /// Classify a provider part tree.
    ///
    /// Subtrees past the depth limit are dropped and reported in `issues`.
    pub fn from_api(part: &MessagePart, issues: &mut Vec<DigestError>) -> Part {
        Self::classify(part, 0, issues)
    }

    fn classify(part: &MessagePart, depth: usize, issues: &mut Vec<DigestError>) -> Part {
        let mime_type = part
            .mime_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if let Some(filename) = part.filename.as_deref()
            && !filename.is_empty()
        {
            let body = part.body.as_ref();
            return Part::Attachment(AttachmentMeta {
                filename: filename.to_string(),
                mime_type: if mime_type.is_empty() {
                    "application/octet-stream".to_string()
                } else {
                    mime_type
                },
                size: body.and_then(|b| b.size).unwrap_or(0),
                attachment_id: body.and_then(|b| b.attachment_id.clone()),
            });
        }

        let children = part.parts.as_deref().unwrap_or_default();
        if mime_type.starts_with("multipart/") || !children.is_empty() {
            if depth >= MAX_PART_DEPTH {
                issues.push(DigestError::Parsing(format!(
                    "part {} nested deeper than {} levels, skipped",
                    part.part_id.as_deref().unwrap_or("?"),
                    MAX_PART_DEPTH
                )));
                return Part::Multipart(Vec::new());
            }
            return Part::Multipart(
                children
                    .iter()
                    .map(|child| Self::classify(child, depth + 1, issues))
                    .collect(),
            );
        }

        let data = part.body.as_ref().and_then(|b| b.data.clone());
        let part_id = part.part_id.clone();

        if mime_type.starts_with("text/plain") {
            Part::PlainText { part_id, data }
        } else if mime_type.starts_with("text/html") {
            Part::Html { part_id, data }
        } else if mime_type.is_empty() && data.is_some() {
            // Untyped single-part bodies are plain text by MIME default
            Part::PlainText { part_id, data }
        } else {
            Part::Other { mime_type }
        }
    }

    /// Non-container parts in document order
    pub fn leaves(&self) -> Vec<&Part> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(part) = stack.pop() {
            match part {
                // Reverse so the first child is popped first
                Part::Multipart(children) => stack.extend(children.iter().rev()),
                leaf => out.push(leaf),
            }
        }
        out
    }

    /// Attachment metadata found anywhere in the tree, in document order
    pub fn attachments(&self) -> Vec<AttachmentMeta> {
        self.leaves()
            .into_iter()
            .filter_map(|part| match part {
                Part::Attachment(meta) => Some(meta.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Decode base64-encoded body data into text
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders. Invalid UTF-8 becomes U+FFFD rather than an error. Returns
/// `None` only when no decoder accepts the data.
pub fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .find_map(|decoder| decoder.decode(&compact).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
