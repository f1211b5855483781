//! Text encoder collaborator
//!
//! The pipeline only needs `encode(text) -> token ids`. The encoder is loaded
//! once by the driver and handed to every chunk processor explicitly.

use crate::error::EncoderError;
use std::path::{Path, PathBuf};
use tokenizers::models::bpe::BPE;
use tokenizers::pre_tokenizers::byte_level::ByteLevel;
use tokenizers::Tokenizer;
use tracing::info;

/// File name looked up when the encoder path is a directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// GPT-2 vocabulary, used when a directory has no `tokenizer.json`
pub const GPT2_VOCAB_FILE: &str = "encoder.json";

/// GPT-2 merge ranks paired with [`GPT2_VOCAB_FILE`]
pub const GPT2_MERGES_FILE: &str = "vocab.bpe";

/// Turns document text into a sequence of token ids
pub trait Encoder: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, EncoderError>;
}

/// Encoder backed by a HuggingFace `tokenizers` definition (e.g. GPT-2 BPE)
pub struct HfEncoder {
    tokenizer: Tokenizer,
    source: PathBuf,
}

impl HfEncoder {
    /// Load an encoder from `path`
    ///
    /// `path` is a `tokenizer.json` file or a directory. A directory is
    /// searched for `tokenizer.json` first, then for the GPT-2 pair
    /// `encoder.json` + `vocab.bpe`. Truncation and padding stored in the
    /// definition are cleared.
    pub fn from_path(path: &Path) -> Result<Self, EncoderError> {
        let (mut tokenizer, source) = if !path.is_dir() {
            (load_definition(path)?, path.to_path_buf())
        } else if !path.join(TOKENIZER_FILE).exists() && path.join(GPT2_VOCAB_FILE).exists() {
            (load_gpt2(path)?, path.join(GPT2_VOCAB_FILE))
        } else {
            let file = path.join(TOKENIZER_FILE);
            (load_definition(&file)?, file)
        };

        tokenizer
            .with_truncation(None)
            .map_err(|e| EncoderError::Load {
                path: source.clone(),
                reason: e.to_string(),
            })?;
        tokenizer.with_padding(None);

        info!(
            path = %source.display(),
            vocab_size = tokenizer.get_vocab_size(true),
            "Loaded encoder"
        );

        Ok(Self { tokenizer, source })
    }

    /// Path the tokenizer definition was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }
}

fn load_definition(file: &Path) -> Result<Tokenizer, EncoderError> {
    Tokenizer::from_file(file).map_err(|e| EncoderError::Load {
        path: file.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Byte-level BPE from GPT-2's `encoder.json` and `vocab.bpe`
fn load_gpt2(dir: &Path) -> Result<Tokenizer, EncoderError> {
    let vocab = dir.join(GPT2_VOCAB_FILE);
    let merges = dir.join(GPT2_MERGES_FILE);
    let load_error = |reason: String| EncoderError::Load {
        path: vocab.clone(),
        reason,
    };

    let (Some(vocab_str), Some(merges_str)) = (vocab.to_str(), merges.to_str()) else {
        return Err(load_error("path is not valid UTF-8".into()));
    };
    let bpe = BPE::from_file(vocab_str, merges_str)
        .build()
        .map_err(|e| load_error(e.to_string()))?;

    let mut tokenizer = Tokenizer::new(bpe);
    tokenizer
        .with_pre_tokenizer(Some(ByteLevel::default().add_prefix_space(false)))
        .with_decoder(Some(ByteLevel::default()));
    Ok(tokenizer)
}

impl Encoder for HfEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>, EncoderError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| EncoderError::Encode(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}
