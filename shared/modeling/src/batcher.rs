use tch::{Device, Tensor};

use crate::{
    family::{FamilyPolicy, PaddingSide},
    traits::{TextTokenizer, TokenizeError},
};

/// Token ids of one batch, padded to the longest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<Vec<i64>>,
    pub attention_mask: Vec<Vec<i64>>,
    pub labels: Vec<Vec<i64>>,
    /// `1` on real label tokens, `0` on padding.
    pub label_mask: Vec<Vec<i64>>,
}

pub struct TokenizedBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub labels: Tensor,
    pub label_mask: Tensor,
}

fn to_tensor(rows: &[Vec<i64>], device: Device) -> Tensor {
    let width = rows.first().map(|x| x.len()).unwrap_or(0) as i64;
    let flat = rows.iter().flatten().copied().collect::<Vec<_>>();
    Tensor::from_slice(&flat)
        .view([rows.len() as i64, width])
        .to(device)
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.len()
    }

    pub fn seq_len(&self) -> usize {
        self.input_ids.first().map(|x| x.len()).unwrap_or(0)
    }

    pub fn to_tensors(&self, device: Device) -> TokenizedBatch {
        TokenizedBatch {
            input_ids: to_tensor(&self.input_ids, device),
            attention_mask: to_tensor(&self.attention_mask, device),
            labels: to_tensor(&self.labels, device),
            label_mask: to_tensor(&self.label_mask, device),
        }
    }
}

/// Tokenizes prompt/target pairs jointly, truncating each row to `max_length`
/// and padding to the longest row on the side the model family expects.
pub struct Batcher<'a> {
    tokenizer: &'a dyn TextTokenizer,
    padding_side: PaddingSide,
    max_length: usize,
}

impl<'a> Batcher<'a> {
    pub fn new(tokenizer: &'a dyn TextTokenizer, policy: &FamilyPolicy, max_length: usize) -> Self {
        Self {
            tokenizer,
            padding_side: policy.padding_side,
            max_length,
        }
    }

    pub fn encode<S: AsRef<str>, T: AsRef<str>>(
        &self,
        inputs: &[S],
        targets: &[T],
    ) -> Result<EncodedBatch, TokenizeError> {
        let pad_id = self.tokenizer.pad_id() as i64;
        let inputs = self.encode_rows(inputs)?;
        let targets = self.encode_rows(targets)?;
        let (input_ids, attention_mask) = pad(inputs, pad_id, self.padding_side);
        let (labels, label_mask) = pad(targets, pad_id, self.padding_side);
        Ok(EncodedBatch {
            input_ids,
            attention_mask,
            labels,
            label_mask,
        })
    }

    fn encode_rows<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Vec<i64>>, TokenizeError> {
        texts
            .iter()
            .map(|text| {
                let mut ids = self.tokenizer.encode(text.as_ref())?;
                ids.truncate(self.max_length);
                Ok(ids.into_iter().map(i64::from).collect())
            })
            .collect()
    }
}

fn pad(rows: Vec<Vec<i64>>, pad_id: i64, side: PaddingSide) -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
    let longest = rows.iter().map(Vec::len).max().unwrap_or(0);
    rows.into_iter()
        .map(|row| {
            let missing = longest - row.len();
            let mut mask = vec![1i64; row.len()];
            let padding = std::iter::repeat(pad_id).take(missing);
            let mask_padding = std::iter::repeat(0i64).take(missing);
            match side {
                PaddingSide::Right => {
                    let mut ids = row;
                    ids.extend(padding);
                    mask.extend(mask_padding);
                    (ids, mask)
                }
                PaddingSide::Left => {
                    let ids = padding.chain(row).collect();
                    let mask = mask_padding.chain(mask).collect();
                    (ids, mask)
                }
            }
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelFamily;
    use pretty_assertions::assert_eq;

    /// One id per whitespace-separated word: its length. Appends an end-of-sequence id.
    struct WordLengths;

    impl TextTokenizer for WordLengths {
        fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizeError> {
            let mut ids = text
                .split_whitespace()
                .map(|word| word.len() as u32)
                .collect::<Vec<_>>();
            ids.push(1);
            Ok(ids)
        }

        fn pad_id(&self) -> u32 {
            0
        }
    }

    #[test]
    fn test_right_padding() {
        let batcher = Batcher::new(&WordLengths, ModelFamily::Standard.policy(), 512);
        let batch = batcher
            .encode(&["a bb ccc", "dddd"], &["A", "B"])
            .unwrap();
        assert_eq!(batch.input_ids, vec![vec![1, 2, 3, 1], vec![4, 1, 0, 0]]);
        assert_eq!(batch.attention_mask, vec![vec![1, 1, 1, 1], vec![1, 1, 0, 0]]);
        assert_eq!(batch.labels, vec![vec![1, 1], vec![1, 1]]);
        assert_eq!(batch.label_mask, vec![vec![1, 1], vec![1, 1]]);
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.seq_len(), 4);
    }

    #[test]
    fn test_left_padding() {
        let batcher = Batcher::new(&WordLengths, ModelFamily::InstructionTuned.policy(), 512);
        let batch = batcher.encode(&["a bb ccc", "dddd"], &["A", "B"]).unwrap();
        assert_eq!(batch.input_ids, vec![vec![1, 2, 3, 1], vec![0, 0, 4, 1]]);
        assert_eq!(batch.attention_mask, vec![vec![1, 1, 1, 1], vec![0, 0, 1, 1]]);
    }

    #[test]
    fn test_label_mask_marks_padding() {
        let batcher = Batcher::new(&WordLengths, ModelFamily::Standard.policy(), 512);
        let batch = batcher.encode(&["a", "b"], &["A", "B C"]).unwrap();
        assert_eq!(batch.labels, vec![vec![1, 1, 0], vec![1, 1, 1]]);
        assert_eq!(batch.label_mask, vec![vec![1, 1, 0], vec![1, 1, 1]]);
    }

    #[test]
    fn test_truncation() {
        let batcher = Batcher::new(&WordLengths, ModelFamily::Standard.policy(), 2);
        let batch = batcher.encode(&["a bb ccc"], &["A"]).unwrap();
        assert_eq!(batch.input_ids, vec![vec![1, 2]]);
    }

    #[test]
    fn test_to_tensors() {
        let batcher = Batcher::new(&WordLengths, ModelFamily::Standard.policy(), 512);
        let batch = batcher.encode(&["a bb ccc", "dddd"], &["A", "B"]).unwrap();
        let tensors = batch.to_tensors(Device::Cpu);
        assert_eq!(tensors.input_ids.size(), vec![2, 4]);
        assert_eq!(tensors.labels.size(), vec![2, 2]);
        let mask: Vec<i64> = Vec::try_from(&tensors.attention_mask.flatten(0, -1)).unwrap();
        assert_eq!(mask, vec![1, 1, 1, 1, 1, 1, 0, 0]);
    }
}
