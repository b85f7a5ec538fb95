//! Normalized message content handed to downstream consumers

use serde::{Deserialize, Serialize};

use super::{MessageId, ThreadId};

/// Attachment metadata. Attachment bytes are never fetched or decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: String,
    pub mime_type: String,
    /// Size in bytes as reported by the provider
    pub size: u64,
    /// Provider handle for fetching the bytes later, if the caller wants them
    pub attachment_id: Option<String>,
}

/// An externally hosted image referenced from an HTML body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    /// Always an `https://` URL
    pub url: String,
    /// 1-based position among the retained images of one message
    pub index: usize,
    /// Passed the HTTPS, host and allow-list checks; true for every
    /// reference the extractor keeps
    pub validated: bool,
}

/// One parsed message.
///
/// Built once by the parser through [`MessageContent::builder`] and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    id: MessageId,
    thread_id: ThreadId,
    subject: String,
    sender: String,
    timestamp: String,
    body: String,
    attachments: Vec<AttachmentMeta>,
    images: Vec<ImageReference>,
}

impl MessageContent {
    pub fn builder(id: MessageId, thread_id: ThreadId) -> MessageContentBuilder {
        MessageContentBuilder::new(id, thread_id)
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Raw `From` header value
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Raw `Date` header value
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachments(&self) -> &[AttachmentMeta] {
        &self.attachments
    }

    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }
}

/// Builder for creating MessageContent instances
pub struct MessageContentBuilder {
    id: MessageId,
    thread_id: ThreadId,
    subject: String,
    sender: String,
    timestamp: String,
    body: String,
    attachments: Vec<AttachmentMeta>,
    images: Vec<ImageReference>,
}

impl MessageContentBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            subject: String::new(),
            sender: String::new(),
            timestamp: String::new(),
            body: String::new(),
            attachments: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn attachments(mut self, attachments: Vec<AttachmentMeta>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn images(mut self, images: Vec<ImageReference>) -> Self {
        self.images = images;
        self
    }

    pub fn build(self) -> MessageContent {
        MessageContent {
            id: self.id,
            thread_id: self.thread_id,
            subject: self.subject,
            sender: self.sender,
            timestamp: self.timestamp,
            body: self.body,
            attachments: self.attachments,
            images: self.images,
        }
    }
}
