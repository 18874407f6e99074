use std::{io, path::PathBuf};
use tch::{CModule, Device, IValue, Kind, Tensor};
use thiserror::Error;
use tracing::info;

use crate::traits::{ForwardError, LanguageModel};

const TORCHSCRIPT_FILE: &str = "model.pt";

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("missing model.pt, the model must be exported to TorchScript")]
    MissingTorchScript,

    #[error("failed to read file config.json")]
    FailedToReadConfig(#[from] io::Error),

    #[error("could not parse config.json")]
    FailedToParseConfig(#[from] serde_json::Error),

    #[error("failed to load TorchScript module: {0}")]
    LoadModule(#[from] tch::TchError),
}

/// A model exported to TorchScript whose `forward` takes
/// `(input_ids, attention_mask)` or `(input_ids, attention_mask, labels)`
/// and returns logits, either bare, as the first element of a tuple,
/// or under the `"logits"` key of a dict.
pub struct TorchScriptModel {
    module: CModule,
    device: Device,
    model_type: Option<String>,
}

impl std::fmt::Debug for TorchScriptModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorchScriptModel")
            .field("device", &self.device)
            .field("model_type", &self.model_type)
            .finish()
    }
}

fn read_model_type(repo_files: &[PathBuf]) -> Result<Option<String>, ModelLoadError> {
    let Some(config) = repo_files.iter().find(|x| x.ends_with("config.json")) else {
        return Ok(None);
    };
    let config_json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(config)?)?;
    Ok(config_json
        .get("model_type")
        .and_then(|x| x.as_str())
        .map(str::to_owned))
}

impl TorchScriptModel {
    pub fn from_pretrained(
        repo_files: &[PathBuf],
        kind: Kind,
        device: Device,
    ) -> Result<Self, ModelLoadError> {
        let path = repo_files
            .iter()
            .find(|x| x.ends_with(TORCHSCRIPT_FILE))
            .ok_or(ModelLoadError::MissingTorchScript)?;
        let model_type = read_model_type(repo_files)?;
        let mut module = CModule::load_on_device(path, device)?;
        module.to(device, kind, false);
        module.set_eval();
        info!(
            "Loaded {} ({}) on {device:?} as {kind:?}",
            path.display(),
            model_type.as_deref().unwrap_or("unknown model type"),
        );
        Ok(Self {
            module,
            device,
            model_type,
        })
    }

    pub fn model_type(&self) -> Option<&str> {
        self.model_type.as_deref()
    }
}

fn logits_from_output(output: IValue) -> Result<Tensor, ForwardError> {
    match output {
        IValue::Tensor(logits) => Ok(logits),
        IValue::Tuple(values) | IValue::GenericList(values) => values
            .into_iter()
            .find_map(|x| match x {
                IValue::Tensor(t) => Some(t),
                _ => None,
            })
            .ok_or(ForwardError::MissingLogits),
        IValue::GenericDict(entries) => entries
            .into_iter()
            .find_map(|(key, value)| match (key, value) {
                (IValue::String(key), IValue::Tensor(t)) if key == "logits" => Some(t),
                _ => None,
            })
            .ok_or(ForwardError::MissingLogits),
        _ => Err(ForwardError::MissingLogits),
    }
}

impl LanguageModel for TorchScriptModel {
    fn forward(
        &mut self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<Tensor, ForwardError> {
        let mut inputs = vec![
            IValue::Tensor(input_ids.shallow_clone()),
            IValue::Tensor(attention_mask.shallow_clone()),
        ];
        if let Some(labels) = labels {
            inputs.push(IValue::Tensor(labels.shallow_clone()));
        }
        let logits = logits_from_output(self.module.forward_is(&inputs)?)?;
        match logits.size().as_slice() {
            [_, _, _] => Ok(logits),
            other => Err(ForwardError::BadShape(other.to_vec())),
        }
    }

    fn device(&self) -> Device {
        self.device
    }
}
