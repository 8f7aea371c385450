/// JSON image manifests.
///
/// A manifest describes one image as a nested tree:
///
/// ```json
/// {
///   "name": "laptop.e01",
///   "kind": "image",
///   "children": [
///     { "name": "fs0", "kind": "file_system", "fs_type": "ntfs", "children": [
///       { "name": "/", "kind": "directory", "children": [
///         { "name": "$LogFile:$DATA", "kind": "file", "meta_addr": 2 },
///         { "name": "Users", "kind": "directory", "children": [] }
///       ]}
///     ]}
///   ]
/// }
/// ```
///
/// Several manifests can be loaded into the same [`MemoryTree`].
use super::MemoryTree;
use crate::error::ManifestError;
use crate::model::{NodeId, NodeKind};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// One node of a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestNode {
    pub name: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub fs_type: Option<crate::model::FsType>,
    #[serde(default)]
    pub meta_addr: Option<u64>,
    /// Overrides the kind's default virtual flag.
    #[serde(default, rename = "virtual")]
    pub is_virtual: Option<bool>,
    /// Listing this node's children fails.
    #[serde(default)]
    pub unreadable: bool,
    #[serde(default)]
    pub children: Vec<ManifestNode>,
}

/// Read a manifest file and append its image to `tree`.
pub fn load_manifest(tree: &mut MemoryTree, path: &Path) -> Result<NodeId, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let image = load_manifest_str(tree, &text)?;
    info!(
        "Loaded manifest {} as image {image} ({} nodes in tree)",
        path.display(),
        tree.len()
    );
    Ok(image)
}

/// Parse manifest JSON and append its image to `tree`.
pub fn load_manifest_str(tree: &mut MemoryTree, json: &str) -> Result<NodeId, ManifestError> {
    let root: ManifestNode = serde_json::from_str(json)?;
    if root.kind != NodeKind::Image {
        return Err(ManifestError::NotAnImage(root.kind.to_string()));
    }
    validate(&root, &root.name)?;

    let image = tree.add_image(&root.name);
    apply_flags(tree, image, &root);
    // Pre-order, children pushed reversed so they keep manifest order.
    let mut stack: Vec<(NodeId, &ManifestNode)> =
        root.children.iter().rev().map(|c| (image, c)).collect();
    while let Some((parent, entry)) = stack.pop() {
        let id = if entry.kind == NodeKind::FileSystem {
            tree.add_filesystem(parent, &entry.name, entry.fs_type.unwrap_or_default())
        } else {
            tree.add_node(parent, &entry.name, entry.kind)
        };
        apply_flags(tree, id, entry);
        stack.extend(entry.children.iter().rev().map(|c| (id, c)));
    }
    Ok(image)
}

fn apply_flags(tree: &mut MemoryTree, id: NodeId, entry: &ManifestNode) {
    if let Some(addr) = entry.meta_addr {
        tree.set_meta_addr(id, addr);
    }
    if let Some(v) = entry.is_virtual {
        tree.set_virtual(id, v);
    }
    if entry.unreadable {
        tree.mark_unreadable(id);
    }
}

/// Reject structural problems before anything is inserted, so a bad
/// manifest never leaves a half-built image behind.
fn validate(node: &ManifestNode, path: &str) -> Result<(), ManifestError> {
    if node.name.is_empty() {
        return Err(ManifestError::EmptyName {
            path: path.to_owned(),
        });
    }
    if node.kind == NodeKind::FileSystem && node.fs_type.is_none() {
        return Err(ManifestError::MissingFsType {
            path: path.to_owned(),
        });
    }
    for child in &node.children {
        if child.kind == NodeKind::Image {
            return Err(ManifestError::NotAnImage(format!(
                "nested image under '{path}'"
            )));
        }
        validate(child, &format!("{path}/{}", child.name))?;
    }
    Ok(())
}
