use mmlu_data_provider::{Example, Letter, ParseLetterError};
use mmlu_modeling::{TextTokenizer, TokenizeError};
use thiserror::Error;
use tracing::{debug, trace};

/// Maximum number of tokens a prompt may occupy.
pub const DEFAULT_CONTEXT_BUDGET: usize = 2048;

const ANSWER_MARKER: &str = "\nAnswer:";

/// `high_school_us_history` -> `high school us history`
pub fn format_subject(subject: &str) -> String {
    subject.split('_').collect::<Vec<_>>().join(" ")
}

pub fn format_example(example: &Example, include_answer: bool) -> String {
    let mut prompt = example.question.clone();
    for letter in Letter::ALL {
        prompt.push_str(&format!("\n{}. {}", letter, example.option(letter)));
    }
    prompt.push_str(ANSWER_MARKER);
    if include_answer {
        prompt.push_str(&format!(" {}\n\n", example.answer));
    }
    prompt
}

#[derive(Debug, Error)]
pub enum PromptParseError {
    #[error("no answer line")]
    MissingAnswer,

    #[error("no option {0}")]
    MissingOption(Letter),

    #[error(transparent)]
    InvalidAnswer(#[from] ParseLetterError),
}

/// Inverse of `format_example(example, true)`.
pub fn parse_example(text: &str) -> Result<Example, PromptParseError> {
    let text = text.strip_suffix("\n\n").unwrap_or(text);
    let (body, answer) = text
        .rsplit_once(ANSWER_MARKER)
        .ok_or(PromptParseError::MissingAnswer)?;
    let answer = answer.parse::<Letter>()?;

    let mut rest = body;
    let mut options: [String; 4] = Default::default();
    for letter in Letter::ALL.iter().rev() {
        let (before, option) = rest
            .rsplit_once(&format!("\n{letter}. "))
            .ok_or(PromptParseError::MissingOption(*letter))?;
        options[letter.index()] = option.to_owned();
        rest = before;
    }
    Ok(Example {
        question: rest.to_owned(),
        options,
        answer,
    })
}

/// Header naming the subject, followed by the first `num_fewshot` worked examples.
pub fn gen_prompt(dev: &[Example], subject: &str, num_fewshot: usize) -> String {
    let mut prompt = format!(
        "The following are multiple choice questions (with answers) about {}.\n\n",
        format_subject(subject)
    );
    for example in dev.iter().take(num_fewshot) {
        prompt.push_str(&format_example(example, true));
    }
    prompt
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    pub num_fewshot: usize,
    pub num_tokens: usize,
    /// Set when even the zero-shot prompt is longer than the budget.
    pub over_budget: bool,
}

/// Builds few-shot prompts, dropping worked examples until the prompt fits the budget.
pub struct PromptBuilder<'a> {
    tokenizer: &'a dyn TextTokenizer,
    budget: usize,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(tokenizer: &'a dyn TextTokenizer, budget: usize) -> Self {
        Self { tokenizer, budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn build(
        &self,
        dev: &[Example],
        subject: &str,
        num_fewshot: usize,
        question: &Example,
    ) -> Result<BuiltPrompt, TokenizeError> {
        let prompt_end = format_example(question, false);
        let mut k = num_fewshot.min(dev.len());
        loop {
            let text = gen_prompt(dev, subject, k) + &prompt_end;
            let num_tokens = self.tokenizer.count_tokens(&text)?;
            if num_tokens <= self.budget {
                if k < num_fewshot {
                    trace!("{subject}: shrank to {k} examples ({num_tokens} tokens)");
                }
                return Ok(BuiltPrompt {
                    text,
                    num_fewshot: k,
                    num_tokens,
                    over_budget: false,
                });
            }
            if k == 0 {
                debug!(
                    "{subject}: zero-shot prompt is {num_tokens} tokens, over the budget of {}",
                    self.budget
                );
                return Ok(BuiltPrompt {
                    text,
                    num_fewshot: 0,
                    num_tokens,
                    over_budget: true,
                });
            }
            k -= 1;
        }
    }
}
