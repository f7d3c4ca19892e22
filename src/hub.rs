//! Dataset retrieval: the hub download cache or a plain local file.

use std::path::PathBuf;

use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};

use crate::config::DashboardConfig;
use crate::error::{DashError, DashResult};

/// Something that yields a local path for the configured dataset.
pub trait DatasetSource {
    fn fetch(&self) -> DashResult<PathBuf>;

    /// Short human-readable description for the status bar.
    fn describe(&self) -> String;
}

/// Pick the source named by the configuration.
pub fn from_config(config: &DashboardConfig) -> Box<dyn DatasetSource> {
    match &config.source.local_path {
        Some(path) => Box::new(LocalSource { path: path.clone() }),
        None => Box::new(HubSource {
            repo_id: config.source.repo_id.clone(),
            filename: config.source.filename.clone(),
            revision: config.source.revision.clone(),
            token_env: config.source.token_env.clone(),
            token: config.token(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// A file inside a dataset repository on the Hugging Face hub. Downloads are
/// cached by `hf-hub`, so repeated fetches are local.
pub struct HubSource {
    pub repo_id: String,
    pub filename: String,
    pub revision: String,
    pub token_env: String,
    pub token: Option<String>,
}

impl DatasetSource for HubSource {
    fn fetch(&self) -> DashResult<PathBuf> {
        let api = ApiBuilder::new()
            .with_token(self.token.clone())
            .with_progress(false)
            .build()
            .map_err(|e| self.unavailable(e.to_string()))?;

        let repo = api.repo(Repo::with_revision(
            self.repo_id.clone(),
            RepoType::Dataset,
            self.revision.clone(),
        ));

        log::info!("fetching {}/{} from hub", self.repo_id, self.filename);
        let path = repo
            .get(&self.filename)
            .map_err(|e| self.unavailable(e.to_string()))?;
        log::info!("dataset cached at {}", path.display());
        Ok(path)
    }

    fn describe(&self) -> String {
        format!("hub:{}/{}", self.repo_id, self.filename)
    }
}

impl HubSource {
    fn unavailable(&self, reason: String) -> DashError {
        log::error!("hub download failed: {reason}");
        DashError::DatasetUnavailable {
            guidance: hub_guidance(&reason, &self.token_env, self.token.is_some()),
            reason,
        }
    }
}

fn hub_guidance(reason: &str, token_env: &str, has_token: bool) -> String {
    let auth_failure = ["401", "403", "unauthorized", "forbidden"]
        .iter()
        .any(|p| reason.to_ascii_lowercase().contains(p));
    if auth_failure && !has_token {
        format!("This dataset needs a hub token. Set the {token_env} environment variable and reload.")
    } else if auth_failure {
        format!("The token in {token_env} was rejected. Check that it is valid and can read the repository.")
    } else {
        "Check your network connection and the configured repository and file name, then reload."
            .into()
    }
}

// ---------------------------------------------------------------------------
// Local file
// ---------------------------------------------------------------------------

pub struct LocalSource {
    pub path: PathBuf,
}

impl DatasetSource for LocalSource {
    fn fetch(&self) -> DashResult<PathBuf> {
        if self.path.is_file() {
            Ok(self.path.clone())
        } else {
            Err(DashError::DatasetUnavailable {
                reason: format!("{} does not exist", self.path.display()),
                guidance: "Fix source.local_path in segment-dash.toml or remove it to use the hub."
                    .into(),
            })
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
