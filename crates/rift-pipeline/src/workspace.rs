//! Host/container path mapping for checkouts.
//!
//! The host repos root is bind-mounted into every language container at the
//! container repos root, so `<host_root>/<id>` is visible inside the
//! container as `<container_root>/<id>`.

use std::path::{Path, PathBuf};

use rift_core::domain::SessionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    host_root: PathBuf,
    container_root: String,
}

impl WorkspaceLayout {
    pub fn new(host_root: impl Into<PathBuf>, container_root: impl Into<String>) -> Self {
        let container_root = container_root.into();
        let trimmed = container_root.trim_end_matches('/');
        Self {
            host_root: host_root.into(),
            container_root: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Host checkout directory for a session.
    pub fn host_path(&self, session_id: &SessionId) -> PathBuf {
        self.host_root.join(session_id.as_str())
    }

    /// Container path for a host checkout. Paths outside the host root keep
    /// only their final component.
    pub fn container_path(&self, host_path: &Path) -> String {
        let rel = host_path
            .strip_prefix(&self.host_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| host_path.file_name().map(PathBuf::from).unwrap_or_default());
        let rel = rel.to_string_lossy();
        let rel = rel.trim_matches('/');

        match (self.container_root.as_str(), rel) {
            (root, "") => root.to_string(),
            ("/", rel) => format!("/{rel}"),
            (root, rel) => format!("{root}/{rel}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_line_up() {
        let layout = WorkspaceLayout::new("/var/lib/rift/repos", "/repos/");
        let id = SessionId::parse("abc123").unwrap();
        let host = layout.host_path(&id);
        assert_eq!(host, PathBuf::from("/var/lib/rift/repos/abc123"));
        assert_eq!(layout.container_path(&host), "/repos/abc123");
    }

    #[test]
    fn test_foreign_host_path_keeps_name() {
        let layout = WorkspaceLayout::new("/var/lib/rift/repos", "/repos");
        assert_eq!(layout.container_path(Path::new("/elsewhere/app")), "/repos/app");
    }
}
