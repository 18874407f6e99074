mod auto_model;
mod auto_tokenizer;
mod batcher;
mod dummy;
mod family;
mod precision;
mod traits;

pub use auto_model::{ModelLoadError, TorchScriptModel};
pub use auto_tokenizer::auto_tokenizer;
pub use batcher::{Batcher, EncodedBatch, TokenizedBatch};
pub use dummy::DummyModel;
pub use family::{FamilyPolicy, ModelFamily, PaddingSide, SequencePosition};
pub use precision::{select_device, Precision};
pub use traits::{ForwardError, LanguageModel, TextTokenizer, TokenizeError};

pub fn set_torch_rng_seed(seed: u64) {
    tch::manual_seed(seed as i64);
    tracing::debug!("torch seed set to: {}", seed);
}
