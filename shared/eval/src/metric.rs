use mmlu_data_provider::Letter;
use mmlu_modeling::{FamilyPolicy, TextTokenizer};
use tch::{Device, Kind, Tensor};

use crate::{aggregate::AccuracyCounts, EvalError};

/// Logits at the scored position for a batch, with the gold answer of each row.
pub struct ScoredBatch<'a> {
    /// Shape `(batch, vocab)`.
    pub logits: &'a Tensor,
    pub golds: &'a [String],
}

/// Accumulates state across batches and summarises it on demand.
pub trait Metric {
    fn reset(&mut self);
    fn update(&mut self, batch: ScoredBatch<'_>) -> Result<(), EvalError>;
    fn compute(&self) -> f64;
}

pub fn softmax(logits: &[f32; 4]) -> [f32; 4] {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.map(|x| (x - max).exp());
    let sum: f32 = exp.iter().sum();
    exp.map(|x| x / sum)
}

/// Softmax over the four answer logits, then argmax. Ties go to the earliest letter.
pub fn predict(choice_logits: &[f32; 4]) -> Letter {
    let probs = softmax(choice_logits);
    let mut best = 0;
    for (idx, prob) in probs.iter().enumerate().skip(1) {
        if *prob > probs[best] {
            best = idx;
        }
    }
    Letter::ALL[best]
}

/// Token id of each answer letter under `tokenizer`, picking the sub-token the family scores.
pub fn letter_token_ids(
    tokenizer: &dyn TextTokenizer,
    policy: &FamilyPolicy,
) -> Result<[i64; 4], EvalError> {
    let mut ids = [0i64; 4];
    for letter in Letter::ALL {
        let encoded = tokenizer.encode(letter.as_str())?;
        ids[letter.index()] = policy
            .letter_subtoken
            .pick(&encoded)
            .ok_or(EvalError::EmptyLetterEncoding(letter))? as i64;
    }
    Ok(ids)
}

/// Accuracy of the most probable answer letter, restricted to the four letter tokens.
/// Keeps every prediction and gold label, in order, for export.
#[derive(Debug, Clone)]
pub struct LogitAccuracy {
    letter_ids: [i64; 4],
    counts: AccuracyCounts,
    predictions: Vec<Letter>,
    golds: Vec<String>,
}

impl LogitAccuracy {
    pub fn new(letter_ids: [i64; 4]) -> Self {
        Self {
            letter_ids,
            counts: AccuracyCounts::default(),
            predictions: Vec::new(),
            golds: Vec::new(),
        }
    }

    pub fn counts(&self) -> AccuracyCounts {
        self.counts
    }

    pub fn predictions(&self) -> &[Letter] {
        &self.predictions
    }

    pub fn golds(&self) -> &[String] {
        &self.golds
    }

    /// The four letter logits of every row of a `(batch, vocab)` tensor.
    pub fn choice_logits(&self, logits: &Tensor) -> Result<Vec<[f32; 4]>, EvalError> {
        let index = Tensor::from_slice(&self.letter_ids).to(logits.device());
        let gathered = logits
            .f_index_select(-1, &index)?
            .to_kind(Kind::Float)
            .to(Device::Cpu)
            .flatten(0, -1);
        let flat: Vec<f32> = Vec::try_from(&gathered)?;
        Ok(flat
            .chunks_exact(4)
            .map(|x| [x[0], x[1], x[2], x[3]])
            .collect())
    }

    pub fn update_choice_logits(&mut self, choice_logits: &[[f32; 4]], golds: &[String]) {
        for (logits, gold) in choice_logits.iter().zip(golds) {
            let pred = predict(logits);
            if pred.as_str() == gold.trim() {
                self.counts.correct += 1;
            }
            self.counts.total += 1;
            self.predictions.push(pred);
            self.golds.push(gold.clone());
        }
    }
}

impl Metric for LogitAccuracy {
    fn reset(&mut self) {
        self.counts = AccuracyCounts::default();
        self.predictions.clear();
        self.golds.clear();
    }

    fn update(&mut self, batch: ScoredBatch<'_>) -> Result<(), EvalError> {
        let choice_logits = self.choice_logits(batch.logits)?;
        if choice_logits.len() != batch.golds.len() {
            return Err(EvalError::BatchMismatch {
                rows: choice_logits.len(),
                golds: batch.golds.len(),
            });
        }
        self.update_choice_logits(&choice_logits, batch.golds);
        Ok(())
    }

    fn compute(&self) -> f64 {
        self.counts.accuracy()
    }
}
