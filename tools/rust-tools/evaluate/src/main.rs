use anyhow::{bail, Context, Result};
use clap::Parser;
use mmlu_data_provider::{discover_subjects, resolve_model_files, SubjectData};
use mmlu_eval::{
    reject_prompt_dir, write_predictions, Aggregator, EvalError, EvalOptions, Evaluator,
    PreparedSubject, PromptBuilder, RunSummary, Taxonomy,
};
use mmlu_modeling::{
    auto_tokenizer, select_device, set_torch_rng_seed, TextTokenizer, TorchScriptModel,
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, Level};

use crate::{
    cli::{Cli, Commands, EvalArgs},
    logging::init_logging,
};

mod cli;
mod logging;

fn select_subjects(args: &EvalArgs) -> Result<Vec<String>> {
    let available = discover_subjects(&args.data_dir)?;
    let Some(requested) = &args.subjects else {
        return Ok(available);
    };
    if let Some(missing) = requested.iter().find(|x| !available.contains(*x)) {
        bail!(
            "subject {missing} has no test table in {}",
            args.data_dir.display()
        );
    }
    Ok(available
        .into_iter()
        .filter(|x| requested.contains(x))
        .collect())
}

fn run(args: EvalArgs) -> Result<()> {
    reject_prompt_dir(args.prompt_dir.as_deref())?;
    set_torch_rng_seed(args.seed);

    let family = args.family();
    if args.validation_loss && !family.policy().supports_validation_loss {
        return Err(EvalError::ValidationLossUnsupported(family).into());
    }

    let taxonomy = match &args.taxonomy {
        Some(path) => Taxonomy::from_path(path)?,
        None => Taxonomy::builtin()?,
    };
    let subjects = select_subjects(&args)?;
    info!(
        "Evaluating {} subjects with {} as {family:?}, {}-shot",
        subjects.len(),
        args.model,
        args.ntrain
    );

    let hub_read_token = std::env::var("HF_TOKEN").ok();
    let repo_files = resolve_model_files(&args.model, args.revision.clone(), hub_read_token, true)
        .with_context(|| format!("failed to fetch {}", args.model))?;
    let tokenizer: Arc<dyn TextTokenizer> = Arc::new(auto_tokenizer(&repo_files)?);
    let device = select_device(&args.devices);
    let model = TorchScriptModel::from_pretrained(&repo_files, args.precision.kind(), device)
        .with_context(|| format!("failed to load {}", args.model))?;
    let model_type = model.model_type().map(str::to_owned);

    std::fs::create_dir_all(&args.save_dir)
        .with_context(|| format!("failed to create {}", args.save_dir.display()))?;

    let mut evaluator = Evaluator::new(
        model,
        tokenizer.clone(),
        family,
        EvalOptions {
            batch_size: args.batch_size,
            max_length: args.max_length,
            quiet: false,
        },
    )?;
    let builder = PromptBuilder::new(tokenizer.as_ref(), args.context_budget);
    let mut aggregator = Aggregator::new(&taxonomy);
    let mut validation_loss = BTreeMap::new();

    for subject in &subjects {
        let data = SubjectData::load(&args.data_dir, subject)?;
        let task = PreparedSubject::prepare_test(&data, &builder, args.ntrain, None)?;
        let result = evaluator.run(&task)?;
        println!("Average accuracy {:.3} - {subject}", result.accuracy());
        aggregator.record(subject, result.counts);

        if args.save_predictions {
            write_predictions(
                &args.save_dir.join(format!("{subject}.tsv")),
                &result.predictions,
                &result.golds,
            )?;
        }

        if args.validation_loss {
            let task = PreparedSubject::prepare_validation(&data, &builder, None)?;
            let loss = evaluator.validation_loss(&task)?;
            info!("Validation loss {loss:.4} - {subject}");
            validation_loss.insert(subject.clone(), loss);
        }
    }

    let report = aggregator.report();
    for line in report.summary_lines() {
        println!("{line}");
    }

    RunSummary {
        model: args.model.clone(),
        model_type,
        family,
        num_fewshot: args.ntrain,
        report,
        validation_loss,
    }
    .write(&args.save_dir.join("summary.json"))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::PrintAllHelp { markdown }) = cli.command {
        // This is a required argument for the time being.
        assert!(markdown);

        let () = clap_markdown::print_help_markdown::<Cli>();

        return Ok(());
    }

    init_logging(cli.eval.log, Level::INFO)?;
    run(cli.eval)
}
