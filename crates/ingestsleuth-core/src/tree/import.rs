/// Import an on-disk directory as an image.
///
/// The directory becomes an image with a single filesystem of the given
/// type whose root directory mirrors the directory's contents. The walk
/// uses `jwalk`'s rayon-backed parallel traversal; entries arrive
/// parent-first and sorted by name, so every entry finds its parent in
/// `dir_map` and the resulting child order is deterministic.
///
/// Directories that cannot be read stay in the tree flagged unreadable, so
/// the scheduler exercises its recovery path on them exactly as it would on
/// a damaged image.
use super::MemoryTree;
use crate::error::ImportError;
use crate::model::{FsType, NodeId, NodeKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Walk `root_path` and append it to `tree` as a new image. Returns the
/// image id.
pub fn import_directory(
    tree: &mut MemoryTree,
    root_path: &Path,
    fs_type: FsType,
) -> Result<NodeId, ImportError> {
    if !std::fs::metadata(root_path)?.is_dir() {
        return Err(ImportError::NotADirectory(root_path.to_path_buf()));
    }
    let start = Instant::now();

    let image = tree.add_image(&root_display_name(root_path));
    let root = tree.add_filesystem_with_root(image, "fs0", fs_type);

    // Scan-lifetime map from directory path to its node.
    let mut dir_map: HashMap<PathBuf, NodeId> = HashMap::with_capacity(1_024);
    dir_map.insert(root_path.to_path_buf(), root);

    let mut files_found: u64 = 0;
    let mut dirs_found: u64 = 1;
    let mut error_count: u64 = 0;

    let walker = jwalk::WalkDir::new(root_path)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                error_count += 1;
                // jwalk errors are typically access-denied on directories.
                if let Some(path) = err.path() {
                    mark_or_insert_unreadable(tree, &mut dir_map, path);
                }
                warn!("Import error: {err}");
                continue;
            }
        };

        let path = entry.path();
        if path == root_path {
            if entry.read_children_error.is_some() {
                tree.mark_unreadable(root);
            }
            continue;
        }

        let Some(parent_idx) = path.parent().and_then(|p| dir_map.get(p)).copied() else {
            warn!("Skipping {}: parent was not imported", path.display());
            continue;
        };

        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            let id = tree.add_node(parent_idx, &name, NodeKind::Directory);
            if entry.read_children_error.is_some() {
                error_count += 1;
                tree.mark_unreadable(id);
            }
            dir_map.insert(path, id);
            dirs_found += 1;
        } else {
            tree.add_node(parent_idx, &name, NodeKind::File);
            files_found += 1;
        }
    }

    debug!(
        "Import walk complete: {files_found} files, {dirs_found} dirs, {error_count} errors"
    );
    info!(
        "Imported {} as image {image} in {:?}",
        root_path.display(),
        start.elapsed()
    );
    Ok(image)
}

fn mark_or_insert_unreadable(
    tree: &mut MemoryTree,
    dir_map: &mut HashMap<PathBuf, NodeId>,
    path: &Path,
) {
    if let Some(&id) = dir_map.get(path) {
        tree.mark_unreadable(id);
        return;
    }
    let Some(parent_idx) = path.parent().and_then(|p| dir_map.get(p)).copied() else {
        return;
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "<access denied>".to_string());
    let id = tree.add_node(parent_idx, &name, NodeKind::Directory);
    tree.mark_unreadable(id);
    dir_map.insert(path.to_path_buf(), id);
}

/// Display name for the imported image: the directory's own name, or the
/// path itself for drive roots.
fn root_display_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        name.to_string_lossy().to_string()
    } else {
        let s = path.to_string_lossy();
        s.trim_end_matches(['\\', '/']).to_string()
    }
}
