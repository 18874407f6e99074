use crate::{
    aggregate::AccuracyCounts,
    metric::{letter_token_ids, LogitAccuracy, Metric, ScoredBatch},
    prompt::PromptBuilder,
    EvalError,
};
use indicatif::{ProgressBar, ProgressStyle};
use mmlu_data_provider::{Example, Letter, SubjectData};
use mmlu_modeling::{
    Batcher, EncodedBatch, LanguageModel, ModelFamily, TextTokenizer, TokenizedBatch,
};
use std::{path::Path, sync::Arc};
use tch::{Kind, Tensor};
use tracing::{debug, info, warn};

/// Prompts can only be generated from the dev tables.
pub fn reject_prompt_dir(prompt_dir: Option<&Path>) -> Result<(), EvalError> {
    match prompt_dir {
        Some(dir) => Err(EvalError::PromptDirUnsupported(dir.to_path_buf())),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRecord {
    pub prompt: String,
    pub gold: Letter,
    pub num_fewshot: usize,
}

/// One subject's prompts, built and ready to be batched.
#[derive(Debug, Clone)]
pub struct PreparedSubject {
    name: String,
    records: Vec<EvalRecord>,
    over_budget: usize,
}

impl PreparedSubject {
    fn prepare(
        name: &str,
        pool: &[Example],
        questions: &[Example],
        builder: &PromptBuilder<'_>,
        num_fewshot: usize,
    ) -> Result<Self, EvalError> {
        let mut over_budget = 0;
        let records = questions
            .iter()
            .map(|question| {
                let built = builder.build(pool, name, num_fewshot, question)?;
                if built.over_budget {
                    over_budget += 1;
                }
                Ok(EvalRecord {
                    prompt: built.text,
                    gold: question.answer,
                    num_fewshot: built.num_fewshot,
                })
            })
            .collect::<Result<Vec<_>, EvalError>>()?;
        if over_budget > 0 {
            warn!(
                "{name}: {over_budget} prompts exceed {} tokens even without examples",
                builder.budget()
            );
        }
        Ok(Self {
            name: name.to_owned(),
            records,
            over_budget,
        })
    }

    /// The test set, each question preceded by up to `num_fewshot` dev examples.
    pub fn prepare_test(
        data: &SubjectData,
        builder: &PromptBuilder<'_>,
        num_fewshot: usize,
        prompt_dir: Option<&Path>,
    ) -> Result<Self, EvalError> {
        reject_prompt_dir(prompt_dir)?;
        info!("Preparing {}", data.subject);
        Self::prepare(
            &data.subject,
            data.dev.examples(),
            data.test.examples(),
            builder,
            num_fewshot,
        )
    }

    /// The dev set itself, zero-shot.
    pub fn prepare_validation(
        data: &SubjectData,
        builder: &PromptBuilder<'_>,
        prompt_dir: Option<&Path>,
    ) -> Result<Self, EvalError> {
        reject_prompt_dir(prompt_dir)?;
        Self::prepare(&data.subject, &[], data.dev.examples(), builder, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn records(&self) -> &[EvalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Prompts whose zero-shot form is still longer than the budget.
    pub fn over_budget(&self) -> usize {
        self.over_budget
    }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub batch_size: usize,
    /// Token length every row of a batch is truncated to.
    pub max_length: usize,
    pub quiet: bool,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            batch_size: 4,
            max_length: 512,
            quiet: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectResult {
    pub subject: String,
    pub counts: AccuracyCounts,
    pub predictions: Vec<Letter>,
    pub golds: Vec<String>,
}

impl SubjectResult {
    pub fn accuracy(&self) -> f64 {
        self.counts.accuracy()
    }
}

struct Chunk {
    batch: EncodedBatch,
    golds: Vec<Letter>,
}

fn encode_batches<'b>(
    batcher: &'b Batcher<'b>,
    task: &'b PreparedSubject,
    batch_size: usize,
) -> impl Iterator<Item = Result<Chunk, EvalError>> + 'b {
    task.records().chunks(batch_size.max(1)).map(|records| {
        let prompts = records.iter().map(|x| x.prompt.as_str()).collect::<Vec<_>>();
        let golds = records.iter().map(|x| x.gold).collect::<Vec<_>>();
        let targets = golds.iter().map(|x| x.as_str()).collect::<Vec<_>>();
        let batch = batcher.encode(&prompts, &targets)?;
        Ok(Chunk { batch, golds })
    })
}

/// Runs a model over prepared subjects, scoring the answer-letter logits
/// according to the model family's policy.
pub struct Evaluator<M: LanguageModel> {
    model: M,
    tokenizer: Arc<dyn TextTokenizer>,
    family: ModelFamily,
    metric: LogitAccuracy,
    options: EvalOptions,
}

impl<M: LanguageModel> Evaluator<M> {
    pub fn new(
        model: M,
        tokenizer: Arc<dyn TextTokenizer>,
        family: ModelFamily,
        options: EvalOptions,
    ) -> Result<Self, EvalError> {
        let letter_ids = letter_token_ids(tokenizer.as_ref(), family.policy())?;
        debug!("Answer letter token ids for {family:?}: {letter_ids:?}");
        Ok(Self {
            model,
            tokenizer,
            family,
            metric: LogitAccuracy::new(letter_ids),
            options,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Full logits, shape `(batch, sequence, vocab)`, with labels passed when the family takes them.
    fn forward(&mut self, tensors: &TokenizedBatch) -> Result<Tensor, EvalError> {
        let labels = self
            .family
            .policy()
            .pass_labels
            .then_some(&tensors.labels);
        Ok(self
            .model
            .forward(&tensors.input_ids, &tensors.attention_mask, labels)?)
    }

    /// Logits of the scored sequence position, shape `(batch, vocab)`.
    fn scored_logits(&mut self, batch: &EncodedBatch) -> Result<Tensor, EvalError> {
        let policy = self.family.policy();
        let tensors = batch.to_tensors(self.model.device());
        let logits = self.forward(&tensors)?;
        let seq_len = logits.size().get(1).copied().unwrap_or(0);
        let position = policy
            .logit_position
            .index(seq_len)
            .ok_or(EvalError::EmptySequence)?;
        Ok(logits.select(1, position))
    }

    pub fn test_step(&mut self, batch: &EncodedBatch, golds: &[String]) -> Result<(), EvalError> {
        let _no_grad = tch::no_grad_guard();
        let logits = self.scored_logits(batch)?;
        self.metric.update(ScoredBatch {
            logits: &logits,
            golds,
        })
    }

    fn progress_bar(&self, task: &PreparedSubject) -> Option<ProgressBar> {
        match self.options.quiet {
            true => None,
            false => {
                let pbar = ProgressBar::new(task.len() as u64);
                pbar.set_style(ProgressStyle::default_bar()
                    .template("{prefix} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"));
                pbar.set_prefix(task.name().to_owned());
                Some(pbar)
            }
        }
    }

    /// Scores every record of `task` and returns its counts and predictions.
    pub fn run(&mut self, task: &PreparedSubject) -> Result<SubjectResult, EvalError> {
        info!("Running {}", task.name());
        self.metric.reset();
        let pbar = self.progress_bar(task);
        let tokenizer = self.tokenizer.clone();
        let batcher = Batcher::new(
            tokenizer.as_ref(),
            self.family.policy(),
            self.options.max_length,
        );
        for chunk in encode_batches(&batcher, task, self.options.batch_size) {
            let chunk = chunk?;
            let golds = chunk.golds.iter().map(Letter::to_string).collect::<Vec<_>>();
            self.test_step(&chunk.batch, &golds)?;
            if let Some(pbar) = &pbar {
                pbar.set_message(format!("acc: {:.3}", self.metric.compute()));
                pbar.inc(golds.len() as u64);
            }
        }
        if let Some(pbar) = pbar {
            pbar.finish_and_clear();
        }
        Ok(SubjectResult {
            subject: task.name().to_owned(),
            counts: self.metric.counts(),
            predictions: self.metric.predictions().to_vec(),
            golds: self.metric.golds().to_vec(),
        })
    }

    /// Mean over batches of the token-level cross-entropy of the padded label
    /// sequence, read from the leading logit positions. Padding is masked out.
    pub fn validation_loss(&mut self, task: &PreparedSubject) -> Result<f64, EvalError> {
        if !self.family.policy().supports_validation_loss {
            return Err(EvalError::ValidationLossUnsupported(self.family));
        }
        let _no_grad = tch::no_grad_guard();
        let tokenizer = self.tokenizer.clone();
        let batcher = Batcher::new(
            tokenizer.as_ref(),
            self.family.policy(),
            self.options.max_length,
        );
        let mut losses = Vec::new();
        for chunk in encode_batches(&batcher, task, self.options.batch_size) {
            let tensors = chunk?.batch.to_tensors(self.model.device());
            let logits = self.forward(&tensors)?;
            let label_len = tensors.labels.size().get(1).copied().unwrap_or(0);
            let positions = logits.size().get(1).copied().unwrap_or(0);
            if label_len == 0 {
                continue;
            }
            if label_len > positions {
                return Err(EvalError::LabelsExceedLogits {
                    labels: label_len,
                    positions,
                });
            }
            let token_nll = logits
                .narrow(1, 0, label_len)
                .log_softmax(-1, Kind::Float)
                .gather(-1, &tensors.labels.unsqueeze(-1), false)
                .squeeze_dim(-1)
                .neg();
            let mask = tensors.label_mask.to_kind(Kind::Float);
            let num_tokens = f64::try_from(&mask.sum(Kind::Float))?;
            if num_tokens == 0.0 {
                continue;
            }
            let total = f64::try_from(&(token_nll * &mask).sum(Kind::Float))?;
            losses.push(total / num_tokens);
        }
        Ok(match losses.is_empty() {
            true => 0.0,
            false => losses.iter().sum::<f64>() / losses.len() as f64,
        })
    }
}
