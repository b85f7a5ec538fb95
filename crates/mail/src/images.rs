//! External image references in HTML bodies
//!
//! Only `https://` images with a parseable host are kept. With an allow-list
//! configured, the host must also match it exactly. Every kept reference has
//! passed these checks and is marked validated.

use log::debug;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::config::DEFAULT_MAX_IMAGES;
use crate::gmail::decode_html_entities;
use crate::models::ImageReference;

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("image source pattern is valid")
});

/// Extracts image URLs from HTML, applying the HTTPS rule, allow-list and cap
#[derive(Debug, Clone)]
pub struct ImageReferenceExtractor {
    allowed_domains: Option<Vec<String>>,
    max_images: usize,
}

impl Default for ImageReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReferenceExtractor {
    pub fn new() -> Self {
        Self {
            allowed_domains: None,
            max_images: DEFAULT_MAX_IMAGES,
        }
    }

    /// Restrict accepted hosts. An empty list counts as no list.
    pub fn with_allowed_domains(mut self, domains: Option<Vec<String>>) -> Self {
        self.allowed_domains = domains
            .map(|list| {
                list.into_iter()
                    .map(|d| d.trim().to_ascii_lowercase())
                    .filter(|d| !d.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty());
        self
    }

    pub fn with_max_images(mut self, max_images: usize) -> Self {
        self.max_images = max_images;
        self
    }

    /// Image references in document order, at most `max_images` of them
    pub fn extract(&self, html: &str) -> Vec<ImageReference> {
        let mut images = Vec::new();

        for caps in IMG_SRC_RE.captures_iter(html) {
            if images.len() >= self.max_images {
                debug!("Image cap of {} reached, dropping the rest", self.max_images);
                break;
            }

            let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };
            let src = decode_html_entities(raw.as_str().trim());

            if self.accepts(&src) {
                images.push(ImageReference {
                    url: src,
                    index: images.len() + 1,
                    validated: true,
                });
            }
        }

        images
    }

    /// HTTPS, a parseable host, and the allow-list when one is set
    fn accepts(&self, src: &str) -> bool {
        let is_https = src
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"));
        if !is_https {
            debug!("Rejecting non-HTTPS image source");
            return false;
        }

        // Malformed URLs are skipped without noise
        let Some(host) = Url::parse(src)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .filter(|host| !host.is_empty())
        else {
            return false;
        };

        match &self.allowed_domains {
            Some(allowed) if !allowed.iter().any(|d| *d == host) => {
                debug!("Rejecting image from host {} not in allow-list", host);
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(images: &[ImageReference]) -> Vec<&str> {
        images.iter().map(|i| i.url.as_str()).collect()
    }

    #[test]
    fn test_insecure_images_rejected() {
        let html = r#"<p>Hi</p><img src="http://insecure.example/a.png">"#;
        assert!(ImageReferenceExtractor::new().extract(html).is_empty());
    }

    #[test]
    fn test_https_images_accepted_without_allow_list() {
        let html = r#"<IMG alt="logo" SRC="https://cdn.example.com/logo.png">
                      <img width=1 src='https://img.example.org/b.jpg?x=1&amp;y=2'>"#;
        let images = ImageReferenceExtractor::new().extract(html);

        assert_eq!(
            urls(&images),
            vec!["https://cdn.example.com/logo.png", "https://img.example.org/b.jpg?x=1&y=2"]
        );
        assert_eq!(images[0].index, 1);
        assert_eq!(images[1].index, 2);
        // Passing the HTTPS and host checks is validation enough without a list
        assert!(images.iter().all(|i| i.validated));
    }

    #[test]
    fn test_allow_list() {
        let extractor = ImageReferenceExtractor::new()
            .with_allowed_domains(Some(vec!["CDN.Example.com".to_string()]));
        let html = r#"<img src="https://evil.example.net/x.png">
                      <img src="https://cdn.example.com/ok.png">
                      <img src="https://sub.cdn.example.com/no.png">"#;
        let images = extractor.extract(html);

        assert_eq!(urls(&images), vec!["https://cdn.example.com/ok.png"]);
        // Index counts retained images only
        assert_eq!(images[0].index, 1);
        assert!(images[0].validated);
    }

    #[test]
    fn test_empty_allow_list_is_permissive() {
        let extractor = ImageReferenceExtractor::new().with_allowed_domains(Some(vec![]));
        let images = extractor.extract(r#"<img src="https://a.example.com/1.png">"#);
        assert_eq!(images.len(), 1);
        assert!(images[0].validated);
    }

    #[test]
    fn test_cap() {
        let html: String = (1..=8)
            .map(|n| format!(r#"<img src="https://cdn.example.com/{}.png">"#, n))
            .collect();

        let images = ImageReferenceExtractor::new().extract(&html);
        assert_eq!(images.len(), DEFAULT_MAX_IMAGES);
        assert_eq!(images.last().unwrap().url, "https://cdn.example.com/5.png");

        let images = ImageReferenceExtractor::new().with_max_images(2).extract(&html);
        assert_eq!(urls(&images), vec!["https://cdn.example.com/1.png", "https://cdn.example.com/2.png"]);
    }

    #[test]
    fn test_malformed_and_relative_sources_skipped() {
        let html = r#"<img src="https://"><img src="/local.png"><img src="">
                      <img data-src="https://lazy.example.com/x.png">
                      <img src=" https://cdn.example.com/ok.png ">"#;
        let images = ImageReferenceExtractor::new().extract(html);
        assert_eq!(urls(&images), vec!["https://cdn.example.com/ok.png"]);
        assert_eq!(images[0].index, 1);
    }
}
