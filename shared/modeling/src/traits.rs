use tch::{Device, Tensor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("torch error during forward: {0}")]
    Tch(#[from] tch::TchError),

    #[error("model output contained no logits tensor")]
    MissingLogits,

    #[error("expected logits of shape (batch, sequence, vocab), got {0:?}")]
    BadShape(Vec<i64>),
}

/// A pretrained model that can be run in inference mode.
/// Batching, device placement and the forward pass itself belong to the runtime.
pub trait LanguageModel: std::fmt::Debug {
    /// Logits of shape `(batch, sequence, vocab)`.
    fn forward(
        &mut self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<Tensor, ForwardError>;
    fn device(&self) -> Device;
}

#[derive(Debug, Error)]
#[error("failed to tokenize {excerpt:?}: {message}")]
pub struct TokenizeError {
    pub excerpt: String,
    pub message: String,
}

impl TokenizeError {
    pub fn new(text: &str, message: impl ToString) -> Self {
        Self {
            excerpt: text.chars().take(64).collect(),
            message: message.to_string(),
        }
    }
}

pub trait TextTokenizer: Send + Sync {
    /// Ids for `text`, with the tokenizer's special tokens added.
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizeError>;
    fn pad_id(&self) -> u32;

    fn count_tokens(&self, text: &str) -> Result<usize, TokenizeError> {
        Ok(self.encode(text)?.len())
    }
}
