//! Pin the TDT image version in a taxonomy's `run.sh`.

use std::path::Path;

use crate::error::ApiError;

const IMAGE_LINE_PREFIX: &str = "IMAGE=${IMAGE:-taxonomy-development-tools";

/// Rewrite `run.sh` text: the image line pins `version`, and docker runs drop `-ti`
/// (no interactive tty on the server). Other lines, and line endings, are kept.
pub fn patch_run_sh(text: &str, version: &str) -> String {
    let mut out = String::with_capacity(text.len() + version.len());
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        if body.starts_with(IMAGE_LINE_PREFIX) {
            out.push_str(IMAGE_LINE_PREFIX);
            out.push(':');
            out.push_str(version);
            out.push('}');
            out.push_str(if ending.is_empty() { "\n" } else { ending });
        } else if line.contains(" -ti ") {
            out.push_str(&line.replace(" -ti ", " "));
        } else {
            out.push_str(line);
        }
    }
    out
}

/// Patch `<taxonomy>/run.sh` in place. A missing script is an initialization error.
pub async fn pin_tool_version(taxonomy_dir: &Path, version: &str) -> Result<(), ApiError> {
    let path = taxonomy_dir.join("run.sh");
    if !path.is_file() {
        return Err(ApiError::Initialization(format!(
            "{} does not exist.",
            path.display()
        )));
    }
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        log::error!("reading {}: {}", path.display(), e);
        ApiError::Initialization("An error occurred while updating run.sh.".to_string())
    })?;
    tokio::fs::write(&path, patch_run_sh(&text, version))
        .await
        .map_err(|e| {
            log::error!("writing {}: {}", path.display(), e);
            ApiError::Initialization("An error occurred while updating run.sh.".to_string())
        })?;
    log::info!("pinned {} to taxonomy-development-tools:{}", path.display(), version);
    Ok(())
}
