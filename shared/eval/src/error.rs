use mmlu_data_provider::{Letter, TableError};
use mmlu_modeling::{ForwardError, ModelFamily, TokenizeError};
use std::path::PathBuf;
use thiserror::Error;

use crate::taxonomy::TaxonomyError;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("prompts from a prompt directory ({0:?}) are not supported")]
    PromptDirUnsupported(PathBuf),

    #[error("validation loss is not supported for {0:?} models")]
    ValidationLossUnsupported(ModelFamily),

    #[error("answer letter {0} encodes to no tokens")]
    EmptyLetterEncoding(Letter),

    #[error("model returned logits with an empty sequence dimension")]
    EmptySequence,

    #[error("labels span {labels} positions but the model returned logits for {positions}")]
    LabelsExceedLogits { labels: i64, positions: i64 },

    #[error("batch has {rows} rows of logits but {golds} gold labels")]
    BatchMismatch { rows: usize, golds: usize },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),
}
