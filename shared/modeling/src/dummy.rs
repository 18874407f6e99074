use tch::{Device, Kind, Tensor};

use crate::{
    family::SequencePosition,
    traits::{ForwardError, LanguageModel},
};

#[derive(Debug, Clone, Copy)]
struct Bump {
    /// `None` bumps every position.
    position: Option<SequencePosition>,
    token_id: i64,
    logit: f64,
}

/// Emits zero logits except for configured bumps on single tokens, either at every
/// sequence position or only at the first or last one.
/// Records whether each forward call received labels.
#[derive(Debug)]
pub struct DummyModel {
    vocab_size: i64,
    bumps: Vec<Bump>,
    labels_seen: Vec<bool>,
}

impl DummyModel {
    pub fn new(vocab_size: i64) -> Self {
        Self {
            vocab_size,
            bumps: Vec::new(),
            labels_seen: Vec::new(),
        }
    }

    pub fn with_preferred_token(mut self, token_id: i64, logit: f64) -> Self {
        self.bumps.push(Bump {
            position: None,
            token_id,
            logit,
        });
        self
    }

    pub fn with_preferred_token_at(
        mut self,
        position: SequencePosition,
        token_id: i64,
        logit: f64,
    ) -> Self {
        self.bumps.push(Bump {
            position: Some(position),
            token_id,
            logit,
        });
        self
    }

    pub fn labels_seen(&self) -> &[bool] {
        &self.labels_seen
    }
}

impl LanguageModel for DummyModel {
    fn forward(
        &mut self,
        input_ids: &Tensor,
        _attention_mask: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<Tensor, ForwardError> {
        let (batch, seq) = match input_ids.size().as_slice() {
            [batch, seq] => (*batch, *seq),
            other => return Err(ForwardError::BadShape(other.to_vec())),
        };
        self.labels_seen.push(labels.is_some());
        let logits = Tensor::zeros([batch, seq, self.vocab_size], (Kind::Float, Device::Cpu));
        for bump in &self.bumps {
            let positions = match bump.position {
                None => logits.shallow_clone(),
                Some(position) => match position.index(seq) {
                    Some(idx) => logits.narrow(1, idx, 1),
                    None => continue,
                },
            };
            let _ = positions.narrow(-1, bump.token_id, 1).fill_(bump.logit);
        }
        Ok(logits.to(input_ids.device()))
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}
