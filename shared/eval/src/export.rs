use mmlu_data_provider::Letter;
use mmlu_modeling::ModelFamily;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use tracing::info;

use crate::{aggregate::AccuracyReport, EvalError};

/// One `pred\tgold` line per scored question, in evaluation order.
pub fn write_predictions(
    path: &Path,
    predictions: &[Letter],
    golds: &[String],
) -> Result<(), EvalError> {
    if predictions.len() != golds.len() {
        return Err(EvalError::BatchMismatch {
            rows: predictions.len(),
            golds: golds.len(),
        });
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for (pred, gold) in predictions.iter().zip(golds) {
        writeln!(writer, "{pred}\t{}", gold.trim())?;
    }
    writer.flush()?;
    info!("Wrote {} predictions to {}", predictions.len(), path.display());
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub model: String,
    /// `model_type` from the model's `config.json`, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    pub family: ModelFamily,
    pub num_fewshot: usize,
    #[serde(flatten)]
    pub report: AccuracyReport,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validation_loss: BTreeMap<String, f64>,
}

impl RunSummary {
    pub fn write(&self, path: &Path) -> Result<(), EvalError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!("Wrote run summary to {}", path.display());
        Ok(())
    }
}
