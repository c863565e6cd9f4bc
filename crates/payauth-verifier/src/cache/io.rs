//! Filesystem helpers for the on-disk cache.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{VerifyError, VerifyResult};

pub(crate) fn default_cache_dir() -> VerifyResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| VerifyError::Cache {
            message: "could not determine cache directory".to_string(),
        })?;

    Ok(base.join("payauth").join("manifests"))
}

/// Write via a temp file and rename, so readers never see partial content.
pub(crate) async fn write_atomic(path: &Path, content: &str) -> VerifyResult<()> {
    let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));

    fs::write(&temp_path, content)
        .await
        .map_err(|e| VerifyError::Cache {
            message: format!("failed to write temp file: {}", e),
        })?;

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(VerifyError::Cache {
            message: format!("failed to rename temp file: {}", e),
        });
    }

    Ok(())
}
