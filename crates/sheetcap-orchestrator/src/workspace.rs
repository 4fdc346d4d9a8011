//! Per-job directory layout and the path-traversal guard `CaptureEditor`
//! and the pipeline runner both depend on (§3 invariant: every manifest
//! path lies under the job workspace directory).

use std::path::{Path, PathBuf};

use sheetcap_models::{JobId, Manifest};

use crate::error::{OrchestratorError, OrchestratorResult};

/// `jobs_dir/<job_id>/{frames,rectified,pages}`, plus `pages.pdf` and
/// `manifest.json` at the workspace root.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub fn new(jobs_dir: &Path, job_id: &JobId) -> Self {
        Self { root: jobs_dir.join(job_id.as_str()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn rectified_dir(&self) -> PathBuf {
        self.root.join("rectified")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join("pages")
    }

    pub fn upscaled_dir(&self) -> PathBuf {
        self.root.join("upscaled")
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.root.join("pages.pdf")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Create the directory tree for a fresh job.
    pub async fn create(&self) -> OrchestratorResult<()> {
        for dir in [self.frames_dir(), self.rectified_dir(), self.pages_dir(), self.upscaled_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Persist `manifest.json` to disk. Every path that mutates a job's
    /// manifest -- the pipeline's success path, its cancel/error path, and
    /// `CaptureEditor::review_export` -- must call this so the on-disk file
    /// never goes stale relative to the registry's in-memory copy.
    pub async fn write_manifest(&self, manifest: &Manifest) -> OrchestratorResult<()> {
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| OrchestratorError::internal(e.to_string()))?;
        tokio::fs::write(self.manifest_path(), json).await?;
        Ok(())
    }

    /// Remove the entire workspace, used by `purge`.
    pub async fn remove(&self) -> OrchestratorResult<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a capture path supplied by a caller (e.g. `crop_capture`'s
    /// `capture_path`) against this workspace, rejecting anything that
    /// would escape it via `..` components or an absolute path pointing
    /// elsewhere.
    pub fn resolve_capture(&self, capture_path: &Path) -> OrchestratorResult<PathBuf> {
        let candidate = if capture_path.is_absolute() {
            capture_path.to_path_buf()
        } else {
            self.root.join(capture_path)
        };

        let normalized = normalize(&candidate);
        let normalized_root = normalize(&self.root);

        if !normalized.starts_with(&normalized_root) {
            return Err(OrchestratorError::PathTraversal(capture_path.display().to_string()));
        }
        Ok(normalized)
    }
}

/// Lexical normalization (no symlink resolution, no filesystem access) so
/// this works against paths that may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> JobWorkspace {
        JobWorkspace::new(Path::new("/tmp/sheetcap/jobs"), &JobId::from_string("job-1"))
    }

    #[test]
    fn layout_paths_are_under_root() {
        let ws = workspace();
        assert!(ws.frames_dir().starts_with(ws.root()));
        assert!(ws.pdf_path().starts_with(ws.root()));
    }

    #[test]
    fn resolves_relative_capture_path() {
        let ws = workspace();
        let resolved = ws.resolve_capture(Path::new("rectified/page_003.png")).unwrap();
        assert_eq!(resolved, ws.root().join("rectified/page_003.png"));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let ws = workspace();
        let result = ws.resolve_capture(Path::new("../other-job/page_001.png"));
        assert!(matches!(result, Err(OrchestratorError::PathTraversal(_))));
    }

    #[test]
    fn rejects_absolute_path_outside_workspace() {
        let ws = workspace();
        let result = ws.resolve_capture(Path::new("/etc/passwd"));
        assert!(matches!(result, Err(OrchestratorError::PathTraversal(_))));
    }

    #[test]
    fn accepts_absolute_path_inside_workspace() {
        let ws = workspace();
        let inside = ws.root().join("rectified/page_001.png");
        assert_eq!(ws.resolve_capture(&inside).unwrap(), inside);
    }
}
