//! Resource bundle backed by a directory on disk.

use std::path::{Component, Path, PathBuf};

use super::ResourceBundle;

/// Serves resources from an unpacked extension directory.
///
/// Names are relative paths inside the directory; anything that would
/// escape it (absolute paths, `..`) is treated as missing.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || !contained {
            return None;
        }

        let path = self.root.join(relative);
        path.is_file().then_some(path)
    }
}

impl ResourceBundle for DirectoryBundle {
    fn read_text(&self, name: &str) -> Option<String> {
        let path = self.locate(name)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("Failed to read bundle resource {}: {}", path.display(), e);
                None
            }
        }
    }

    fn resource_path(&self, name: &str) -> Option<PathBuf> {
        self.locate(name)
    }
}
