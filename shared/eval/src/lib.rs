mod aggregate;
mod error;
mod export;
mod harness;
mod metric;
mod prompt;
mod taxonomy;

pub use aggregate::{AccuracyCounts, AccuracyReport, Aggregator, GroupAccuracy};
pub use error::EvalError;
pub use export::{write_predictions, RunSummary};
pub use harness::{
    reject_prompt_dir, EvalOptions, EvalRecord, Evaluator, PreparedSubject, SubjectResult,
};
pub use metric::{letter_token_ids, predict, softmax, LogitAccuracy, Metric, ScoredBatch};
pub use prompt::{
    format_example, format_subject, gen_prompt, parse_example, BuiltPrompt, PromptBuilder,
    PromptParseError, DEFAULT_CONTEXT_BUDGET,
};
pub use taxonomy::{Category, Taxonomy, TaxonomyError};
