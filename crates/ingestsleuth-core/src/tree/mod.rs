/// Content tree access.
///
/// The scheduler never owns the tree. It reads it through [`ContentTree`]
/// and keeps only node snapshots for queued tasks. This module also holds
/// the two whole-image visitors the scheduler needs: root discovery and
/// eligible-file count estimation. Both are plain matches over the closed
/// [`NodeKind`] set.
pub mod import;
pub mod manifest;
pub mod memory;

pub use import::import_directory;
pub use manifest::load_manifest;
pub use memory::MemoryTree;

use crate::error::TreeError;
use crate::model::{Node, NodeId, NodeKind};
use rayon::prelude::*;
use tracing::{debug, error, warn};

/// Read-only view of a hierarchical content store.
///
/// Implementations must be shareable across threads: the pipeline's
/// workers and the scheduler read the tree concurrently.
pub trait ContentTree: Send + Sync {
    /// Snapshot of a single node.
    fn node(&self, id: NodeId) -> Result<Node, TreeError>;

    /// Direct children in the store's native order. May fail on damaged
    /// or unreadable content.
    fn children(&self, id: NodeId) -> Result<Vec<Node>, TreeError>;

    /// Number of regular files plus directories (excluding `.` and `..`)
    /// inside filesystem `fs`. Used only for progress estimation.
    fn count_eligible_files(&self, fs: NodeId) -> Result<u64, TreeError>;
}

/// Root-level entry points of an image.
///
/// Each root container (filesystem root directory, layout directory, or
/// layout file) contributes its children. A container with no children
/// becomes a root entry itself, which covers unallocated containers and
/// empty filesystems. Containers whose children cannot be listed
/// contribute nothing.
pub fn root_entries(tree: &dyn ContentTree, image: NodeId) -> Vec<Node> {
    let mut containers = Vec::new();
    match tree.node(image) {
        Ok(node) => collect_root_containers(tree, node, &mut containers),
        Err(err) => {
            error!("Could not read image {image} to discover root entries: {err}");
            return Vec::new();
        }
    }

    let mut entries = Vec::new();
    for container in containers {
        match tree.children(container.id) {
            Ok(children) if children.is_empty() => entries.push(container),
            Ok(children) => entries.extend(children),
            Err(err) => {
                warn!(
                    "Could not get children of root {}: {} to enqueue: {err}",
                    container.id, container.name
                );
            }
        }
    }
    debug!("Discovered {} root entries for image {image}", entries.len());
    entries
}

fn collect_root_containers(tree: &dyn ContentTree, node: Node, out: &mut Vec<Node>) {
    match node.kind {
        // Real directory under a filesystem, or layout content outside one.
        NodeKind::Directory | NodeKind::VirtualDirectory | NodeKind::LayoutFile => out.push(node),
        // Structure above the first directory level, and files that may
        // carry derived children.
        NodeKind::Image
        | NodeKind::Volume
        | NodeKind::FileSystem
        | NodeKind::File
        | NodeKind::DerivedFile => match tree.children(node.id) {
            Ok(children) => {
                for child in children {
                    collect_root_containers(tree, child, out);
                }
            }
            Err(err) => {
                warn!(
                    "Could not get children of {} {}: {} during root discovery: {err}",
                    node.kind, node.id, node.name
                );
            }
        },
    }
}

/// Best-effort number of eligible files in an image.
///
/// Filesystems are counted with a single query each; layout files count as
/// one; everything else sums its children. Any failure counts as zero for
/// the affected subtree. Unallocated content is always included, whatever
/// the scheduling request asked for.
pub fn count_image_files(tree: &dyn ContentTree, image: NodeId) -> u64 {
    match tree.node(image) {
        Ok(node) => count_files(tree, &node),
        Err(err) => {
            error!("Could not read image {image} to count files: {err}");
            0
        }
    }
}

fn count_files(tree: &dyn ContentTree, node: &Node) -> u64 {
    match node.kind {
        NodeKind::FileSystem => match tree.count_eligible_files(node.id) {
            Ok(count) => count,
            Err(err) => {
                error!(
                    "Couldn't get count of all files in filesystem {}: {err}",
                    node.id
                );
                0
            }
        },
        NodeKind::LayoutFile => 1,
        NodeKind::Image
        | NodeKind::Volume
        | NodeKind::Directory
        | NodeKind::VirtualDirectory
        | NodeKind::File
        | NodeKind::DerivedFile => match tree.children(node.id) {
            Ok(children) => children.iter().map(|c| count_files(tree, c)).sum(),
            Err(err) => {
                warn!("Could not count children of {}: {err}", node.id);
                0
            }
        },
    }
}

/// Sum of [`count_image_files`] over several images, counted in parallel.
pub fn count_files_in_images(tree: &dyn ContentTree, images: &[NodeId]) -> u64 {
    images
        .par_iter()
        .map(|&image| count_image_files(tree, image))
        .sum()
}
