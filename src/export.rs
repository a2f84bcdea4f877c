//! Export of the final assembled tree.
//!
//! Exporters consume the scene independently of pipeline internals. The
//! JSON exporter is the built-in default; mesh formats plug in behind the
//! same trait.

use std::path::Path;

use anyhow::{Context, Result};

use crate::scene::SceneNode;

/// Consumes a finished assembly and writes it somewhere useful.
pub trait AssetExporter {
    /// Short format name for logs and file pickers.
    fn format(&self) -> &'static str;

    fn export(&self, root: &SceneNode, path: &Path) -> Result<()>;
}

/// Writes the scene tree as pretty-printed JSON.
#[derive(Debug, Default)]
pub struct JsonExporter;

impl AssetExporter for JsonExporter {
    fn format(&self) -> &'static str {
        "json"
    }

    fn export(&self, root: &SceneNode, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(root).context("Failed to serialize scene")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write scene to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Shape;
    use tempfile::tempdir;

    #[test]
    fn json_export_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let mut root = SceneNode::group("asset");
        root.add_child(SceneNode::mesh("core", Shape::Sphere, vec![1.0]));

        JsonExporter.export(&root, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: SceneNode = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, root);
    }

    #[test]
    fn export_to_unwritable_path_is_an_error() {
        let root = SceneNode::group("asset");
        let result = JsonExporter.export(&root, Path::new("/nonexistent/dir/scene.json"));
        assert!(result.is_err());
    }
}
