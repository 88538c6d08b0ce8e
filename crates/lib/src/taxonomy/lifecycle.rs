//! Taxonomy lifecycle: clone, checkout, `make init`, reload, upgrade, and the lazy
//! ensure-initialized check every browse call goes through.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OwnedRwLockReadGuard;

use super::locks::TaxonomyLocks;
use super::runsh::pin_tool_version;
use super::volume::{clone_url, TaxonomyRef, TaxonomyVolume};
use crate::error::ApiError;
use crate::exec::{run_step, ProcessRunner};

/// Result of [`Lifecycle::add_taxonomy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    AlreadyInitialized,
}

#[derive(Clone)]
pub struct Lifecycle {
    volume: TaxonomyVolume,
    runner: Arc<dyn ProcessRunner>,
    locks: Arc<TaxonomyLocks>,
    /// Database file relative to a taxonomy directory; present once `make init` has run.
    database_marker: PathBuf,
}

/// Reject values git would read as options.
fn plain_argument(kind: &str, value: &str) -> Result<(), ApiError> {
    let v = value.trim();
    if v.is_empty() || v.starts_with('-') {
        return Err(ApiError::BadRequest(format!("Invalid {}: {:?}", kind, value)));
    }
    Ok(())
}

impl Lifecycle {
    pub fn new(
        volume: TaxonomyVolume,
        runner: Arc<dyn ProcessRunner>,
        database_marker: PathBuf,
    ) -> Self {
        Self {
            volume,
            runner,
            locks: Arc::new(TaxonomyLocks::new()),
            database_marker,
        }
    }

    pub fn volume(&self) -> &TaxonomyVolume {
        &self.volume
    }

    pub fn is_initialized(&self, taxonomy: &TaxonomyRef) -> bool {
        taxonomy.directory.join(&self.database_marker).exists()
    }

    /// Make sure the taxonomy's database exists, running `make init` first if it does not.
    /// Returns a read lock the caller holds while it uses the taxonomy.
    pub async fn ensure_initialized(
        &self,
        taxonomy: &TaxonomyRef,
    ) -> Result<OwnedRwLockReadGuard<()>, ApiError> {
        if !taxonomy.exists() {
            return Err(ApiError::TaxonomyNotFound(taxonomy.name.clone()));
        }
        let guard = self.locks.read(&taxonomy.name).await;
        if !taxonomy.exists() {
            return Err(ApiError::TaxonomyNotFound(taxonomy.name.clone()));
        }
        if self.is_initialized(taxonomy) {
            return Ok(guard);
        }
        drop(guard);

        {
            let _w = self.locks.write(&taxonomy.name).await;
            if !taxonomy.exists() {
                return Err(ApiError::TaxonomyNotFound(taxonomy.name.clone()));
            }
            if !self.is_initialized(taxonomy) {
                log::info!("taxonomy {} has no database, running make init", taxonomy.name);
                self.make_init(taxonomy).await?;
            }
        }
        Ok(self.locks.read(&taxonomy.name).await)
    }

    /// Run `make init` unconditionally for an existing taxonomy.
    pub async fn init_taxonomy(&self, taxonomy: &TaxonomyRef) -> Result<(), ApiError> {
        let _w = self.locks.write(&taxonomy.name).await;
        if !taxonomy.exists() {
            return Err(ApiError::TaxonomyNotFound(taxonomy.name.clone()));
        }
        self.make_init(taxonomy).await?;
        log::info!("taxonomy {} initialized", taxonomy.name);
        Ok(())
    }

    /// Clone, check out `branch` and initialize, unless the taxonomy directory already exists.
    pub async fn add_taxonomy(&self, repo_url: &str, branch: &str) -> Result<AddOutcome, ApiError> {
        let taxonomy = self.volume.from_repo_url(repo_url)?;
        plain_argument("repository URL", repo_url)?;
        plain_argument("branch", branch)?;
        let _w = self.locks.write(&taxonomy.name).await;
        if taxonomy.exists() {
            log::info!("taxonomy {} already exists, skipping", taxonomy.name);
            return Ok(AddOutcome::AlreadyInitialized);
        }
        log::info!("taxonomy {} does not exist, initializing", taxonomy.name);
        self.checkout_and_init(&taxonomy, repo_url, branch).await?;
        log::info!("taxonomy {} initialized", taxonomy.name);
        Ok(AddOutcome::Created)
    }

    /// Add every repository (url -> branch) whose taxonomy is not present yet. Returns the names created.
    pub async fn init_taxonomies(
        &self,
        repositories: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, ApiError> {
        // Validate every name before touching the volume.
        let mut planned = Vec::with_capacity(repositories.len());
        for (url, branch) in repositories {
            planned.push((self.volume.from_repo_url(url)?, url, branch));
        }
        let mut created = Vec::new();
        for (taxonomy, url, branch) in planned {
            if self.add_taxonomy(url, branch).await? == AddOutcome::Created {
                created.push(taxonomy.name);
            }
        }
        Ok(created)
    }

    /// Delete the taxonomy checkout (if any) and add it again from scratch.
    pub async fn reload_taxonomy(&self, repo_url: &str, branch: &str) -> Result<(), ApiError> {
        let taxonomy = self.volume.from_repo_url(repo_url)?;
        plain_argument("repository URL", repo_url)?;
        plain_argument("branch", branch)?;
        let _w = self.locks.write(&taxonomy.name).await;
        if taxonomy.exists() {
            tokio::fs::remove_dir_all(&taxonomy.directory)
                .await
                .map_err(|e| {
                    ApiError::Initialization(format!(
                        "removing {}: {}",
                        taxonomy.directory.display(),
                        e
                    ))
                })?;
            log::info!("taxonomy {} deleted", taxonomy.name);
        }
        self.checkout_and_init(&taxonomy, repo_url, branch).await?;
        log::info!("taxonomy {} reloaded", taxonomy.name);
        Ok(())
    }

    /// Bring every repository (url -> branch) to TDT `version`: clone when missing, pin the
    /// image in `run.sh`, then `bash run.sh make upgrade`.
    pub async fn update_taxonomies(
        &self,
        repositories: &BTreeMap<String, String>,
        version: &str,
    ) -> Result<(), ApiError> {
        plain_argument("TDT version", version)?;
        let mut planned = Vec::with_capacity(repositories.len());
        for (url, branch) in repositories {
            plain_argument("repository URL", url)?;
            plain_argument("branch", branch)?;
            planned.push((self.volume.from_repo_url(url)?, url, branch));
        }
        for (taxonomy, url, branch) in planned {
            let _w = self.locks.write(&taxonomy.name).await;
            if !taxonomy.exists() {
                log::info!("taxonomy {} does not exist, cloning", taxonomy.name);
                self.clone_and_checkout(&taxonomy, url, branch).await?;
            }
            pin_tool_version(&taxonomy.directory, version).await?;
            run_step(
                self.runner.as_ref(),
                "bash",
                &["run.sh", "make", "upgrade"],
                &taxonomy.directory,
                false,
            )
            .await?;
            log::info!(
                "taxonomy {} updated to TDT version {}",
                taxonomy.name,
                version
            );
        }
        Ok(())
    }

    /// Clone, check out and `make init`; a failure removes whatever the clone left behind so
    /// the next add starts over.
    async fn checkout_and_init(
        &self,
        taxonomy: &TaxonomyRef,
        repo_url: &str,
        branch: &str,
    ) -> Result<(), ApiError> {
        let result = match self.clone_and_checkout(taxonomy, repo_url, branch).await {
            Ok(()) => self.make_init(taxonomy).await,
            Err(e) => Err(e),
        };
        if result.is_err() && taxonomy.exists() {
            match tokio::fs::remove_dir_all(&taxonomy.directory).await {
                Ok(()) => log::warn!("removed partial checkout of taxonomy {}", taxonomy.name),
                Err(e) => log::error!(
                    "could not remove partial checkout {}: {}",
                    taxonomy.directory.display(),
                    e
                ),
            }
        }
        result
    }

    async fn clone_and_checkout(
        &self,
        taxonomy: &TaxonomyRef,
        repo_url: &str,
        branch: &str,
    ) -> Result<(), ApiError> {
        let url = clone_url(repo_url);
        run_step(
            self.runner.as_ref(),
            "git",
            &["clone", &url, &taxonomy.name],
            self.volume.root(),
            false,
        )
        .await?;
        // The branch may not exist yet; stay on the default branch then.
        run_step(
            self.runner.as_ref(),
            "git",
            &["checkout", branch.trim()],
            &taxonomy.directory,
            true,
        )
        .await
    }

    async fn make_init(&self, taxonomy: &TaxonomyRef) -> Result<(), ApiError> {
        run_step(
            self.runner.as_ref(),
            "make",
            &["init"],
            &taxonomy.directory,
            false,
        )
        .await
    }
}
