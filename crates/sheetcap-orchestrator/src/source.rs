//! Source resolution trait boundary. Remote video download (yt-dlp-style
//! fetch) is out of scope as a *feature* -- only the local-file path is
//! actually implemented; `SourceResolver` exists so a fetcher can be added
//! later without touching the orchestrator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{OrchestratorError, OrchestratorResult};

/// What the caller asked for: either a file already on disk, or a URL a
/// fetcher implementation would need to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    LocalPath(PathBuf),
    Url(String),
}

/// Resolves a `SourceRequest` into a local file path a `Job` can reference.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, request: &SourceRequest) -> OrchestratorResult<PathBuf>;
}

/// The only implementation actually wired up: accepts local paths, rejects
/// URLs outright with `SourceUnavailable` instead of fetching them.
#[derive(Debug, Default, Clone)]
pub struct LocalFileResolver;

#[async_trait]
impl SourceResolver for LocalFileResolver {
    async fn resolve(&self, request: &SourceRequest) -> OrchestratorResult<PathBuf> {
        match request {
            SourceRequest::LocalPath(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(OrchestratorError::SourceUnavailable(path.display().to_string()));
                }
                Ok(path.clone())
            }
            SourceRequest::Url(url) => {
                Err(OrchestratorError::SourceUnavailable(format!("remote fetch not supported: {url}")))
            }
        }
    }
}

#[allow(dead_code)]
fn is_absolute(path: &Path) -> bool {
    path.is_absolute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn resolves_existing_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not really a video").unwrap();
        let resolver = LocalFileResolver;
        let resolved = resolver.resolve(&SourceRequest::LocalPath(file.path().to_path_buf())).await.unwrap();
        assert_eq!(resolved, file.path());
    }

    #[tokio::test]
    async fn missing_local_file_is_source_unavailable() {
        let resolver = LocalFileResolver;
        let result = resolver.resolve(&SourceRequest::LocalPath(PathBuf::from("/no/such/file.mp4"))).await;
        assert!(matches!(result, Err(OrchestratorError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn url_requests_are_rejected() {
        let resolver = LocalFileResolver;
        let result = resolver.resolve(&SourceRequest::Url("https://example.com/clip.mp4".to_string())).await;
        assert!(matches!(result, Err(OrchestratorError::SourceUnavailable(_))));
    }
}
