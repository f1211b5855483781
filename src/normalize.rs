//! Text normalization collaborator
//!
//! Applied to every document before encoding. The default cleaner unifies
//! line endings, drops control characters, and applies Unicode NFKC.

use tokenizers::normalizers::unicode::NFKC;
use tokenizers::{NormalizedString, Normalizer as _};
use tracing::warn;

/// Cleans up raw document text before encoding
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Default document cleanup
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCleaner;

impl Normalizer for TextCleaner {
    fn normalize(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let stripped: String = text
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect();

        let mut normalized = NormalizedString::from(stripped.as_str());
        match NFKC.normalize(&mut normalized) {
            Ok(()) => normalized.get().to_string(),
            Err(e) => {
                // NFKC on valid UTF-8 does not fail in practice
                warn!(error = %e, "NFKC normalization failed, using stripped text");
                stripped
            }
        }
    }
}

/// Leaves text untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Normalizer for Passthrough {
    fn normalize(&self, text: &str) -> String {
        text.to_string()
    }
}
