use anyhow::{anyhow, Result};
use hf_hub::{
    api::{sync::ApiError, Siblings},
    Cache, Repo, RepoType,
};
use std::path::{Path, PathBuf};
use tracing::info;

const MODEL_EXTENSIONS: [&str; 2] = [".pt", ".json"];

fn check_extensions(sibling: &Siblings, extensions: &[&'static str]) -> bool {
    match extensions.is_empty() {
        true => true,
        false => {
            for ext in extensions {
                if sibling.rfilename.ends_with(ext) {
                    return true;
                }
            }
            false
        }
    }
}

fn download_repo_sync(
    repo: Repo,
    cache: Option<PathBuf>,
    token: Option<String>,
    progress_bar: bool,
    extensions: &[&'static str],
) -> Result<Vec<PathBuf>> {
    let builder = hf_hub::api::sync::ApiBuilder::new();
    let cache = match cache {
        Some(cache) => Cache::new(cache),
        None => Cache::default(),
    };
    let api = builder
        .with_cache_dir(cache.path().clone())
        .with_token(token.or(cache.token()))
        .with_progress(progress_bar)
        .build()?
        .repo(repo);
    let res: Result<Vec<PathBuf>, ApiError> = api
        .info()?
        .siblings
        .into_iter()
        .filter(|x| check_extensions(x, extensions))
        .map(|x| api.get(&x.rfilename))
        .collect();
    Ok(res?)
}

pub fn download_model_repo_sync(
    repo_id: &str,
    revision: Option<String>,
    cache: Option<PathBuf>,
    token: Option<String>,
    progress_bar: bool,
) -> Result<Vec<PathBuf>> {
    download_repo_sync(
        match revision {
            Some(revision) => Repo::with_revision(repo_id.to_owned(), RepoType::Model, revision),
            None => Repo::model(repo_id.to_owned()),
        },
        cache,
        token,
        progress_bar,
        &MODEL_EXTENSIONS,
    )
}

fn list_local_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .map_err(|e| anyhow!("couldn't list model files in {}: {e}", dir.display()))?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Files of a model given either as a local directory or as a hub repo id.
pub fn resolve_model_files(
    model: &str,
    revision: Option<String>,
    token: Option<String>,
    progress_bar: bool,
) -> Result<Vec<PathBuf>> {
    let local = Path::new(model);
    if local.is_dir() {
        info!("Using local model directory {}", local.display());
        return list_local_files(local);
    }
    info!("Downloading {model} from the hub");
    download_model_repo_sync(model, revision, None, token, progress_bar)
}
