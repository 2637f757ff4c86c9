//! File-backed code sources.

use std::path::{Component, Path, PathBuf};

use crate::error::{BridgeError, Result};

/// A directory code files are read from.
///
/// Only relative paths that stay inside the root are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    root: PathBuf,
}

impl ContentRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative: &Path) -> Result<PathBuf> {
        if relative.as_os_str().is_empty() {
            return Err(BridgeError::Usage("code path is empty".to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(BridgeError::Usage(format!(
                        "code path {} leaves the content root",
                        relative.display()
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(BridgeError::Usage(format!(
                        "code path {} must be relative to the content root",
                        relative.display()
                    )))
                }
            }
        }
        Ok(self.root.join(relative))
    }

    /// Read the code at `relative`.
    pub async fn read(&self, relative: &Path) -> Result<String> {
        let path = self.resolve(relative)?;
        let code = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| BridgeError::Source {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), bytes = code.len(), "code read");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_escapes() {
        let root = ContentRoot::new("/srv/content");
        assert_eq!(
            root.resolve(Path::new("samples/hello.tbs")).unwrap(),
            PathBuf::from("/srv/content/samples/hello.tbs")
        );
        assert!(root.resolve(Path::new("./hello.tbs")).is_ok());
        assert!(matches!(root.resolve(Path::new("")), Err(BridgeError::Usage(_))));
        assert!(matches!(
            root.resolve(Path::new("../secret.tbs")),
            Err(BridgeError::Usage(_))
        ));
        assert!(matches!(
            root.resolve(Path::new("samples/../../x")),
            Err(BridgeError::Usage(_))
        ));
        assert!(matches!(
            root.resolve(Path::new("/etc/passwd")),
            Err(BridgeError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn read_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("samples")).unwrap();
        std::fs::write(dir.path().join("samples/sum.tbs"), "return 1 + 1;").unwrap();

        let root = ContentRoot::new(dir.path());
        assert_eq!(
            root.read(Path::new("samples/sum.tbs")).await.unwrap(),
            "return 1 + 1;"
        );
        assert!(matches!(
            root.read(Path::new("samples/missing.tbs")).await,
            Err(BridgeError::Source { .. })
        ));
    }
}
