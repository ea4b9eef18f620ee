//! Output writing for the k12qa binary.
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader never sees a partially written report or table.

use std::path::{Path, PathBuf};

use k12qa_core::error::K12QaError;
use k12qa_core::metrics::encode_kpis;
use k12qa_core::{CuratedTables, KpiRow, QaReport, Result};
use tracing::{debug, info};

/// Directory under the output root that holds curated tables.
pub const CURATED_DIR: &str = "curated";
/// KPI table file name.
pub const KPI_FILE: &str = "kpis.csv";
/// Default QA report file name.
pub const REPORT_FILE: &str = "qa_report.json";

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

/// Writes `contents` to `path` atomically.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            K12QaError::io(format!("Failed to create directory {}", parent.display()), e)
        })?;
    }

    let temp = temp_path(path);
    tokio::fs::write(&temp, contents)
        .await
        .map_err(|e| K12QaError::io(format!("Failed to write {}", temp.display()), e))?;

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(K12QaError::io(
            format!("Failed to move output into place at {}", path.display()),
            e,
        ));
    }

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Saves the QA report as pretty-printed JSON.
pub async fn save_report(report: &QaReport, path: &Path) -> Result<()> {
    let json = report.to_json()?;
    write_atomic(path, json.as_bytes()).await?;
    info!("QA report saved to {}", path.display());
    Ok(())
}

/// Saves every curated table under `<output>/curated/`.
pub async fn save_curated(tables: &CuratedTables, output: &Path) -> Result<()> {
    let dir = output.join(CURATED_DIR);
    for (name, contents) in tables.encode()? {
        write_atomic(&dir.join(name), &contents).await?;
    }
    info!("Curated tables saved to {}", dir.display());
    Ok(())
}

/// Saves the KPI table as `<output>/kpis.csv`.
pub async fn save_kpis(rows: &[KpiRow], output: &Path) -> Result<()> {
    let path = output.join(KPI_FILE);
    write_atomic(&path, &encode_kpis(rows)?).await?;
    info!("{} KPI rows saved to {}", rows.len(), path.display());
    Ok(())
}
