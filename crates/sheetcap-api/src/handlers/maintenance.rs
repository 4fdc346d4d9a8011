//! Disk usage reporting and cleanup over the orchestrator's own job
//! workspace tree -- the only disk-resident cache this system manages.
//! (Remote source fetching has its own external cache in the full product;
//! that fetcher is out of scope here, so there is nothing else to report on.)

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use sheetcap_models::JobId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CacheUsageResponse {
    pub total_bytes: u64,
    pub total_human: String,
}

/// `GET /maintenance/cache-usage`
pub async fn cache_usage(State(state): State<AppState>) -> ApiResult<Json<CacheUsageResponse>> {
    let total_bytes = dir_size(state.orchestrator.jobs_dir()).await.map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(CacheUsageResponse { total_bytes, total_human: human_bytes(total_bytes) }))
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub reclaimed_human: String,
    pub cleared_paths: Vec<String>,
    pub skipped_paths: Vec<String>,
}

/// `POST /maintenance/clear-cache`: purge terminal (done/error/cancelled)
/// job workspaces and anything orphaned from a previous process run.
/// In-flight jobs are left alone and reported in `skipped_paths`.
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<ClearCacheResponse>> {
    let jobs_dir = state.orchestrator.jobs_dir();
    let mut cleared_paths = Vec::new();
    let mut skipped_paths = Vec::new();
    let mut reclaimed: u64 = 0;

    let mut entries = match tokio::fs::read_dir(jobs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Json(ClearCacheResponse { reclaimed_human: human_bytes(0), cleared_paths, skipped_paths }));
        }
        Err(e) => return Err(ApiError::internal(e.to_string())),
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| ApiError::internal(e.to_string()))? {
        let path = entry.path();
        if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "previews" {
            continue;
        }

        let id = JobId::from_string(name.clone());
        let should_clear = match state.orchestrator.status(&id) {
            Ok(status) => status.state.is_terminal(),
            Err(_) => true,
        };

        if !should_clear {
            skipped_paths.push(name);
            continue;
        }

        let size = dir_size(&path).await.unwrap_or(0);
        if state.orchestrator.purge(&id).await.is_err() {
            if tokio::fs::remove_dir_all(&path).await.is_err() {
                skipped_paths.push(name);
                continue;
            }
        }
        reclaimed += size;
        cleared_paths.push(name);
    }

    Ok(Json(ClearCacheResponse { reclaimed_human: human_bytes(reclaimed), cleared_paths, skipped_paths }))
}

fn dir_size<'a>(path: &'a std::path::Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<u64>> + Send + 'a>> {
    Box::pin(async move {
        let mut total = 0u64;
        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                total += dir_size(&entry.path()).await?;
            } else {
                total += metadata.len();
            }
        }
        Ok(total)
    })
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KiB");
        assert_eq!(human_bytes(10 * 1024 * 1024), "10.00 MiB");
    }
}
