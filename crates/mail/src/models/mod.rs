//! Domain models for the digest pipeline

mod content;
mod credential;
mod criteria;
mod ids;

pub use content::{AttachmentMeta, ImageReference, MessageContent, MessageContentBuilder};
pub use credential::{AccessToken, Credential, mask_token};
pub use criteria::{SearchCriteria, is_valid_address};
pub use ids::{MessageId, ThreadId};
