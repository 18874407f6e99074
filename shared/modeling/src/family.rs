use clap::ValueEnum;
use serde::Serialize;

/// Model families that need different scoring conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    /// Encoder-decoder and plain language models, scored on the first decoder position.
    Standard,
    /// Instruction-tuned decoders (alpaca and derivatives), scored on the last prompt position.
    InstructionTuned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencePosition {
    First,
    Last,
}

impl SequencePosition {
    /// `None` for an empty sequence.
    pub fn index(self, seq_len: i64) -> Option<i64> {
        match (self, seq_len) {
            (_, 0) => None,
            (SequencePosition::First, _) => Some(0),
            (SequencePosition::Last, n) => Some(n - 1),
        }
    }

    pub fn pick<T: Copy>(self, ids: &[T]) -> Option<T> {
        match self {
            SequencePosition::First => ids.first().copied(),
            SequencePosition::Last => ids.last().copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyPolicy {
    /// Whether the label ids are handed to the forward call.
    pub pass_labels: bool,
    /// Which sequence position of the logits is scored.
    pub logit_position: SequencePosition,
    /// Which sub-token of an encoded answer letter identifies it.
    pub letter_subtoken: SequencePosition,
    pub padding_side: PaddingSide,
    pub supports_validation_loss: bool,
}

const STANDARD: FamilyPolicy = FamilyPolicy {
    pass_labels: true,
    logit_position: SequencePosition::First,
    letter_subtoken: SequencePosition::First,
    padding_side: PaddingSide::Right,
    supports_validation_loss: true,
};

// last-position scoring needs the prompt flush against the end of the row
const INSTRUCTION_TUNED: FamilyPolicy = FamilyPolicy {
    pass_labels: false,
    logit_position: SequencePosition::Last,
    letter_subtoken: SequencePosition::Last,
    padding_side: PaddingSide::Left,
    supports_validation_loss: false,
};

impl ModelFamily {
    /// Best guess from a model identifier, used when no family is given explicitly.
    pub fn detect(model_id: &str) -> Self {
        if model_id.to_lowercase().contains("alpaca") {
            ModelFamily::InstructionTuned
        } else {
            ModelFamily::Standard
        }
    }

    pub const fn policy(self) -> &'static FamilyPolicy {
        match self {
            ModelFamily::Standard => &STANDARD,
            ModelFamily::InstructionTuned => &INSTRUCTION_TUNED,
        }
    }
}
