//! The taxonomies volume and the names that address it.
//!
//! Every [`TaxonomyRef`] is produced through [`TaxonomyVolume`], which runs the traversal guard:
//! the resolved directory must be a strict descendant of the canonical volume root.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::error::ApiError;

/// A taxonomy checkout inside the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyRef {
    pub name: String,
    pub directory: PathBuf,
}

impl TaxonomyRef {
    pub fn exists(&self) -> bool {
        self.directory.is_dir()
    }
}

/// Root directory holding one checkout per taxonomy.
#[derive(Debug, Clone)]
pub struct TaxonomyVolume {
    root: PathBuf,
}

impl TaxonomyVolume {
    /// Open an existing volume directory; the root is canonicalised once here.
    pub fn open(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("resolving taxonomies volume {}", root.display()))?;
        if !root.is_dir() {
            anyhow::bail!("taxonomies volume is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Taxonomy addressed by name (e.g. the `{taxonomy}` route segment).
    pub fn taxonomy(&self, name: &str) -> Result<TaxonomyRef, ApiError> {
        let name = name.trim();
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(invalid_name(name));
        }
        let directory = guard(&self.root, &self.root.join(name), name)?;
        Ok(TaxonomyRef {
            name: name.to_string(),
            directory,
        })
    }

    /// Taxonomy for a repository URL: last path segment without `.git`.
    pub fn from_repo_url(&self, repo_url: &str) -> Result<TaxonomyRef, ApiError> {
        let name = repo_name(repo_url)
            .ok_or_else(|| ApiError::InvalidName(format!("Invalid repository URL: {}", repo_url)))?;
        self.taxonomy(name)
    }

    /// Names of the taxonomy directories present, sorted. Hidden entries are skipped.
    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn invalid_name(name: &str) -> ApiError {
    ApiError::InvalidName(format!("Invalid repository name: {}", name))
}

/// Repository name from its URL: trailing `/` trimmed, last segment, `.git` stripped.
pub fn repo_name(repo_url: &str) -> Option<&str> {
    let last = repo_url.trim().trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then_some(name)
}

/// Clone URL with the `.git` suffix git hosts expect.
pub fn clone_url(repo_url: &str) -> String {
    let url = repo_url.trim().trim_end_matches('/');
    if url.ends_with(".git") {
        url.to_string()
    } else {
        format!("{}.git", url)
    }
}

/// Resolve `candidate` like realpath (symlinks followed where the path exists, `..` applied
/// afterwards) and require a strict descendant of `root`, which must already be canonical.
pub fn guard(root: &Path, candidate: &Path, name: &str) -> Result<PathBuf, ApiError> {
    let resolved = resolve_path(candidate);
    if resolved.starts_with(root) && resolved != root {
        Ok(resolved)
    } else {
        Err(invalid_name(name))
    }
}

fn resolve_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => {
                out.push(other.as_os_str());
                if let Ok(real) = std::fs::canonicalize(&out) {
                    out = real;
                }
            }
        }
    }
    out
}
