use std::{path::Path, path::PathBuf, sync::Arc};

use mmlu_data_provider::{Example, ExampleTable, Letter, SubjectData};
use mmlu_eval::{
    AccuracyCounts, Aggregator, EvalError, EvalOptions, Evaluator, PreparedSubject,
    PromptBuilder, Taxonomy, DEFAULT_CONTEXT_BUDGET,
};
use mmlu_modeling::{
    Batcher, DummyModel, ModelFamily, SequencePosition, TextTokenizer, TokenizeError,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

const VOCAB: i64 = 64;

/// Whitespace words. Bare answer letters get ids 10..14, anything else lands in 20..50.
struct Words;

impl TextTokenizer for Words {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizeError> {
        Ok(text
            .split_whitespace()
            .map(|word| match word {
                "A" => 10,
                "B" => 11,
                "C" => 12,
                "D" => 13,
                other => 20 + (other.len() % 30) as u32,
            })
            .collect())
    }

    fn pad_id(&self) -> u32 {
        0
    }
}

/// `Words` followed by an end-of-sequence id, like t5 tokenizers.
struct EosWords;

impl TextTokenizer for EosWords {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizeError> {
        let mut ids = Words.encode(text)?;
        ids.push(1);
        Ok(ids)
    }

    fn pad_id(&self) -> u32 {
        0
    }
}

fn example(question: &str, answer: Letter) -> Example {
    Example {
        question: question.to_owned(),
        options: [
            "red".to_owned(),
            "green".to_owned(),
            "blue".to_owned(),
            "yellow".to_owned(),
        ],
        answer,
    }
}

fn subject() -> SubjectData {
    SubjectData {
        subject: "anatomy".to_owned(),
        dev: ExampleTable::from_examples(
            PathBuf::from("dev/anatomy_dev.csv"),
            vec![
                example("Colour of blood?", Letter::A),
                example("Colour of bile?", Letter::B),
            ],
        ),
        test: ExampleTable::from_examples(
            PathBuf::from("test/anatomy_test.csv"),
            vec![
                example("Colour of arteries on diagrams?", Letter::A),
                example("Colour of veins on diagrams?", Letter::C),
                example("Colour of fat?", Letter::D),
            ],
        ),
    }
}

fn options(batch_size: usize) -> EvalOptions {
    EvalOptions {
        batch_size,
        quiet: true,
        ..Default::default()
    }
}

fn prepare(num_fewshot: usize) -> PreparedSubject {
    PreparedSubject::prepare_test(
        &subject(),
        &PromptBuilder::new(&Words, DEFAULT_CONTEXT_BUDGET),
        num_fewshot,
        None,
    )
    .unwrap()
}

#[test_log::test]
fn few_shot_prompts_cover_every_question() {
    let task = prepare(2);
    assert_eq!(task.len(), 3);
    for record in task.records() {
        assert_eq!(record.num_fewshot, 2);
        assert!(record.prompt.starts_with(
            "The following are multiple choice questions (with answers) about anatomy.\n\n"
        ));
        assert!(record.prompt.contains("Colour of bile?"));
        assert!(record.prompt.ends_with("Answer:"));
    }
    assert_eq!(
        task.records().iter().map(|x| x.gold).collect::<Vec<_>>(),
        vec![Letter::A, Letter::C, Letter::D]
    );
}

#[test_log::test]
fn uniform_logits_predict_a() {
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB),
        Arc::new(Words),
        ModelFamily::Standard,
        options(2),
    )
    .unwrap();
    let result = evaluator.run(&prepare(2)).unwrap();
    assert_eq!(result.subject, "anatomy");
    assert_eq!(result.predictions, vec![Letter::A; 3]);
    assert_eq!(result.golds, vec!["A", "C", "D"]);
    assert_eq!(result.counts, AccuracyCounts::new(1, 3));
    // two batches of at most two rows
    assert_eq!(evaluator.model().labels_seen().len(), 2);
}

#[test_log::test]
fn preferred_letter_wins() {
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB).with_preferred_token(12, 5.0),
        Arc::new(Words),
        ModelFamily::InstructionTuned,
        options(4),
    )
    .unwrap();
    let result = evaluator.run(&prepare(1)).unwrap();
    assert_eq!(result.predictions, vec![Letter::C; 3]);
    assert_eq!(result.counts, AccuracyCounts::new(1, 3));
}

#[rstest]
#[case(ModelFamily::Standard, true)]
#[case(ModelFamily::InstructionTuned, false)]
fn labels_follow_family(#[case] family: ModelFamily, #[case] expected: bool) {
    let mut evaluator =
        Evaluator::new(DummyModel::new(VOCAB), Arc::new(Words), family, options(1)).unwrap();
    evaluator.run(&prepare(0)).unwrap();
    assert_eq!(evaluator.model().labels_seen(), &[expected; 3]);
}

#[test_log::test]
fn runs_are_independent() {
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB),
        Arc::new(Words),
        ModelFamily::Standard,
        options(3),
    )
    .unwrap();
    let task = prepare(0);
    let first = evaluator.run(&task).unwrap();
    let second = evaluator.run(&task).unwrap();
    assert_eq!(first, second);
}

#[test_log::test]
fn validation_loss_of_uniform_logits() {
    let data = subject();
    let task = PreparedSubject::prepare_validation(
        &data,
        &PromptBuilder::new(&Words, DEFAULT_CONTEXT_BUDGET),
        None,
    )
    .unwrap();
    assert_eq!(task.len(), 2);
    assert!(task.records().iter().all(|x| x.num_fewshot == 0));

    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB),
        Arc::new(Words),
        ModelFamily::Standard,
        options(4),
    )
    .unwrap();
    let loss = evaluator.validation_loss(&task).unwrap();
    assert!((loss - (VOCAB as f64).ln()).abs() < 1e-4, "loss {loss}");
}

#[test_log::test]
fn validation_loss_needs_labels() {
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB),
        Arc::new(Words),
        ModelFamily::InstructionTuned,
        options(4),
    )
    .unwrap();
    let err = evaluator.validation_loss(&prepare(0)).unwrap_err();
    assert!(matches!(
        err,
        EvalError::ValidationLossUnsupported(ModelFamily::InstructionTuned)
    ));
}

#[test_log::test]
fn prompt_dir_is_rejected() {
    let err = PreparedSubject::prepare_test(
        &subject(),
        &PromptBuilder::new(&Words, DEFAULT_CONTEXT_BUDGET),
        5,
        Some(Path::new("prompts")),
    )
    .unwrap_err();
    assert!(matches!(err, EvalError::PromptDirUnsupported(_)));
}

#[test_log::test]
fn subject_results_roll_up() {
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB).with_preferred_token(13, 2.0),
        Arc::new(Words),
        ModelFamily::Standard,
        options(2),
    )
    .unwrap();
    let result = evaluator.run(&prepare(2)).unwrap();

    let taxonomy = Taxonomy::builtin().unwrap();
    let mut aggregator = Aggregator::new(&taxonomy);
    aggregator.record(&result.subject, result.counts);
    let report = aggregator.report();
    assert_eq!(
        report.summary_lines(),
        vec![
            "Average accuracy 0.333 - health",
            "Average accuracy 0.333 - other (business, health, misc.)",
            "Average accuracy: 0.333",
        ]
    );
}

#[rstest]
#[case(ModelFamily::Standard, Letter::B)]
#[case(ModelFamily::InstructionTuned, Letter::D)]
fn families_score_their_own_position(#[case] family: ModelFamily, #[case] expected: Letter) {
    // B wins at the first position, D at the last
    let model = DummyModel::new(VOCAB)
        .with_preferred_token_at(SequencePosition::First, 11, 5.0)
        .with_preferred_token_at(SequencePosition::Last, 13, 5.0);
    let mut evaluator = Evaluator::new(model, Arc::new(Words), family, options(3)).unwrap();
    let result = evaluator.run(&prepare(2)).unwrap();
    assert_eq!(result.predictions, vec![expected; 3]);
}

#[rstest]
#[case(ModelFamily::Standard)]
#[case(ModelFamily::InstructionTuned)]
fn scored_column_is_never_padding(#[case] family: ModelFamily) {
    let task = prepare(2);
    let prompts = task.records().iter().map(|x| x.prompt.as_str()).collect::<Vec<_>>();
    let golds = task.records().iter().map(|x| x.gold.as_str()).collect::<Vec<_>>();
    let policy = family.policy();
    let batch = Batcher::new(&Words, policy, 512)
        .encode(&prompts, &golds)
        .unwrap();

    // the prompts differ in length, so some rows are padded
    assert!(batch.attention_mask.iter().flatten().any(|x| *x == 0));
    let column = policy
        .logit_position
        .index(batch.seq_len() as i64)
        .unwrap() as usize;
    for mask in &batch.attention_mask {
        assert_eq!(mask[column], 1);
    }
}

#[test_log::test]
fn validation_loss_counts_every_label_token() {
    let data = subject();
    let task = PreparedSubject::prepare_validation(
        &data,
        &PromptBuilder::new(&EosWords, DEFAULT_CONTEXT_BUDGET),
        None,
    )
    .unwrap();
    let bump = 2.0f64;
    let mut evaluator = Evaluator::new(
        DummyModel::new(VOCAB).with_preferred_token_at(SequencePosition::First, 10, bump),
        Arc::new(EosWords),
        ModelFamily::Standard,
        options(4),
    )
    .unwrap();
    let loss = evaluator.validation_loss(&task).unwrap();

    // labels are [A, eos] and [B, eos]; only the first position favours A
    let first_position = (bump.exp() + (VOCAB - 1) as f64).ln();
    let uniform = (VOCAB as f64).ln();
    let expected = ((first_position - bump) + first_position + 2.0 * uniform) / 4.0;
    assert!((loss - expected).abs() < 1e-4, "loss {loss}, expected {expected}");
}

#[test_log::test]
fn over_budget_prompts_are_counted() {
    let data = subject();
    let task =
        PreparedSubject::prepare_test(&data, &PromptBuilder::new(&Words, 3), 2, None).unwrap();
    assert_eq!(task.over_budget(), 3);
    assert!(task.records().iter().all(|x| x.num_fewshot == 0));
    assert_eq!(prepare(2).over_budget(), 0);
}
