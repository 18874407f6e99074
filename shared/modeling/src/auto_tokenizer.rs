use anyhow::{Error, Result};
use std::{ops::Deref, path::PathBuf};
use tokenizers::{PaddingStrategy, Tokenizer};

use crate::traits::{TextTokenizer, TokenizeError};

const PAD_TOKEN_CANDIDATES: [&str; 3] = ["<pad>", "[PAD]", "</s>"];

/// Loads `tokenizer.json`, dropping any truncation or fixed-length padding it
/// carries so that single encodes report their true length. The pad id is kept.
pub fn auto_tokenizer(repo_files: &[PathBuf]) -> Result<Tokenizer> {
    let mut tokenizer = match repo_files.iter().find(|x| x.ends_with("tokenizer.json")) {
        Some(path) => Tokenizer::from_file(path.as_path()).map_err(Error::msg)?,
        None => return Err(Error::msg("Could not find tokenizer.json")),
    };
    tokenizer.with_truncation(None).map_err(Error::msg)?;
    if let Some(padding) = tokenizer.get_padding_mut() {
        padding.strategy = PaddingStrategy::BatchLongest;
        padding.pad_to_multiple_of = None;
    }
    Ok(tokenizer)
}

impl TextTokenizer for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizeError> {
        // inherent encode lives on the wrapped TokenizerImpl
        self.deref()
            .encode(text, true)
            .map(|encoding| encoding.get_ids().to_vec())
            .map_err(|e| TokenizeError::new(text, e))
    }

    fn pad_id(&self) -> u32 {
        self.get_padding()
            .map(|padding| padding.pad_id)
            .or_else(|| {
                PAD_TOKEN_CANDIDATES
                    .iter()
                    .find_map(|token| self.token_to_id(token))
            })
            .unwrap_or(0)
    }
}
