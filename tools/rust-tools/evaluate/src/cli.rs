use clap::{Args, Parser};
use mmlu_eval::DEFAULT_CONTEXT_BUDGET;
use mmlu_modeling::{ModelFamily, Precision};
use std::path::PathBuf;

use crate::logging::LogOutput;

#[derive(Parser, Debug)]
#[clap(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[clap(flatten)]
    pub eval: EvalArgs,
}

#[derive(Parser, Debug)]
pub enum Commands {
    // Prints the help, optionally as markdown. Used for docs generation.
    #[clap(hide = true)]
    PrintAllHelp {
        #[arg(long, required = true)]
        markdown: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct EvalArgs {
    /// Number of worked dev examples placed before each question.
    #[clap(short = 'k', long, default_value_t = 0, env)]
    pub ntrain: usize,

    #[clap(long, value_enum, default_value_t = Precision::Fp32, env)]
    pub precision: Precision,

    /// CUDA device indices. Only the first is used.
    #[clap(long, value_delimiter = ',', default_value = "0", env)]
    pub devices: Vec<usize>,

    #[clap(long, default_value_t = 42, env)]
    pub seed: u64,

    /// Directory of prebuilt prompts. Not supported; prompts are always built from the dev tables.
    #[clap(short, long, env)]
    pub prompt_dir: Option<PathBuf>,

    /// Root holding `dev/<subject>_dev.csv` and `test/<subject>_test.csv`.
    #[clap(short, long, default_value = "data", env)]
    pub data_dir: PathBuf,

    #[clap(short, long, default_value = "results", env)]
    pub save_dir: PathBuf,

    /// Local model directory or hub repo id. Must contain `model.pt` and `tokenizer.json`.
    #[clap(short, long, default_value = "google/flan-t5-small", env)]
    pub model: String,

    #[clap(long, env)]
    pub revision: Option<String>,

    /// Overrides the family detected from the model id.
    #[clap(long, value_enum, env)]
    pub family: Option<ModelFamily>,

    #[clap(long, default_value_t = 4, env)]
    pub batch_size: usize,

    /// Maximum prompt length in tokens; worked examples are dropped until the prompt fits.
    #[clap(long, default_value_t = DEFAULT_CONTEXT_BUDGET, env)]
    pub context_budget: usize,

    /// Every batch row is truncated to this many tokens.
    #[clap(long, default_value_t = 512, env)]
    pub max_length: usize,

    /// Write `<save_dir>/<subject>.tsv` with one `pred<TAB>gold` line per question.
    #[clap(long, env)]
    pub save_predictions: bool,

    /// Also report the zero-shot loss of the gold letter on each dev set.
    #[clap(long, env)]
    pub validation_loss: bool,

    /// Only evaluate these subjects.
    #[clap(long, value_delimiter = ',', env)]
    pub subjects: Option<Vec<String>>,

    /// TOML file replacing the built-in subject taxonomy.
    #[clap(long, env)]
    pub taxonomy: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = LogOutput::Console, env)]
    pub log: LogOutput,
}

impl EvalArgs {
    pub fn family(&self) -> ModelFamily {
        self.family
            .unwrap_or_else(|| ModelFamily::detect(&self.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mmlu-evaluate"]).unwrap();
        assert!(cli.command.is_none());
        let args = cli.eval;
        assert_eq!(args.ntrain, 0);
        assert_eq!(args.precision, Precision::Fp32);
        assert_eq!(args.devices, vec![0]);
        assert_eq!(args.seed, 42);
        assert_eq!(args.data_dir, PathBuf::from("data"));
        assert_eq!(args.save_dir, PathBuf::from("results"));
        assert_eq!(args.model, "google/flan-t5-small");
        assert_eq!(args.batch_size, 4);
        assert_eq!(args.context_budget, 2048);
        assert_eq!(args.family(), ModelFamily::Standard);
    }

    #[test]
    fn test_family_detection_and_override() {
        let cli = Cli::try_parse_from(["mmlu-evaluate", "-m", "chavinlo/alpaca-native", "-k", "5"])
            .unwrap();
        assert_eq!(cli.eval.ntrain, 5);
        assert_eq!(cli.eval.family(), ModelFamily::InstructionTuned);

        let cli = Cli::try_parse_from([
            "mmlu-evaluate",
            "-m",
            "chavinlo/alpaca-native",
            "--family",
            "standard",
        ])
        .unwrap();
        assert_eq!(cli.eval.family(), ModelFamily::Standard);
    }

    #[test]
    fn test_lists() {
        let cli = Cli::try_parse_from([
            "mmlu-evaluate",
            "--devices",
            "1,2",
            "--subjects",
            "anatomy,virology",
            "--precision",
            "bf16",
        ])
        .unwrap();
        assert_eq!(cli.eval.devices, vec![1, 2]);
        assert_eq!(
            cli.eval.subjects,
            Some(vec!["anatomy".to_owned(), "virology".to_owned()])
        );
        assert_eq!(cli.eval.precision, Precision::Bf16);
    }
}
