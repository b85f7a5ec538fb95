//! Plain-text rendering of a digest, the form handed to summarizers

use super::DigestResult;

impl DigestResult {
    /// Render messages as labelled text blocks.
    ///
    /// Each message gets `Subject:`, `From:`, `Date:` and `Body:` lines; when
    /// it carries image references they follow as `IMAGES_FOR_PROCESSING: n`
    /// and one `IMAGE_k: url` line each. `No unread messages found.` is only
    /// used when the search matched nothing.
    pub fn render_text(&self) -> String {
        if self.metadata.total_found == 0 && self.messages.is_empty() {
            return "No unread messages found.".to_string();
        }

        let total = self.messages.len();
        let mut out = if total == 0 {
            format!(
                "Found {} unread message(s), none could be retrieved.\n",
                self.metadata.total_found
            )
        } else {
            format!("Found {} unread message(s):\n", total)
        };

        for (n, message) in self.messages.iter().enumerate() {
            out.push_str(&format!("\n--- Message {} of {} ---\n", n + 1, total));
            out.push_str(&format!("Subject: {}\n", message.subject()));
            out.push_str(&format!("From: {}\n", message.sender()));
            out.push_str(&format!("Date: {}\n", message.timestamp()));
            out.push_str(&format!("Body:\n{}\n", message.body()));

            let images = message.images();
            if !images.is_empty() {
                out.push_str(&format!("\nIMAGES_FOR_PROCESSING: {}\n", images.len()));
                for image in images {
                    out.push_str(&format!("IMAGE_{}: {}\n", image.index, image.url));
                }
            }
        }

        if self.metadata.failed_count > 0 {
            out.push_str(&format!(
                "\n({} message(s) could not be retrieved or parsed)\n",
                self.metadata.failed_count
            ));
        }

        out.trim_end().to_string()
    }
}
