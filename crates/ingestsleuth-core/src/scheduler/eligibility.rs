/// Eligibility filter: decides whether a node is handed to modules at all.
///
/// Rules, in order:
/// 1. Virtual content is skipped unless the request processes unallocated space.
/// 2. The `.` and `..` pseudo-entries are skipped.
/// 3. For regular filesystem files on FAT/NTFS: a file directly in the
///    filesystem root, with a metadata address in the reserved range, whose
///    name starts with `$` and contains `:` is a non-default stream of a
///    system file (e.g. `$LogFile:$DATA`) and is skipped.
///
/// Everything else is accepted. The filter only reads the content tree, so
/// identical inputs always give identical answers.
use crate::model::{FsType, Node, NodeKind};
use crate::tree::ContentTree;
use tracing::{error, warn};

/// Metadata addresses below this value are reserved filesystem entries.
pub const DEFAULT_RESERVED_META_ADDR_LIMIT: u64 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFilter {
    pub reserved_meta_addr_limit: u64,
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self {
            reserved_meta_addr_limit: DEFAULT_RESERVED_META_ADDR_LIMIT,
        }
    }
}

impl EligibilityFilter {
    pub fn new(reserved_meta_addr_limit: u64) -> Self {
        Self {
            reserved_meta_addr_limit,
        }
    }

    pub fn should_enqueue(
        &self,
        node: &Node,
        process_unallocated: bool,
        tree: &dyn ContentTree,
    ) -> bool {
        if !process_unallocated && node.is_virtual {
            return false;
        }
        if node.is_pseudo_entry() {
            return false;
        }
        if node.is_virtual || node.kind != NodeKind::File {
            return true;
        }
        !self.is_reserved_stream(node, tree)
    }

    fn is_reserved_stream(&self, file: &Node, tree: &dyn ContentTree) -> bool {
        if !filesystem_kind(file, tree).is_fat_or_ntfs() {
            return false;
        }
        let in_root_dir = match file.parent.map(|p| tree.node(p)) {
            Some(Ok(parent)) => parent.is_fs_root,
            Some(Err(err)) => {
                warn!(
                    "Could not check if should enqueue the file {}: {err}",
                    file.name
                );
                false
            }
            None => false,
        };
        in_root_dir
            && file
                .meta_addr
                .is_some_and(|addr| addr < self.reserved_meta_addr_limit)
            && file.name.starts_with('$')
            && file.name.contains(':')
    }
}

/// Type of the filesystem governing `node`, `Unsupported` when there is
/// none or it cannot be read.
pub fn filesystem_kind(node: &Node, tree: &dyn ContentTree) -> FsType {
    if let Some(t) = node.fs_type {
        return t;
    }
    let Some(fs) = node.filesystem else {
        return FsType::Unsupported;
    };
    match tree.node(fs) {
        Ok(fs_node) => fs_node.fs_type.unwrap_or_default(),
        Err(err) => {
            error!("Could not get filesystem for {}: {err}", node.id);
            FsType::Unsupported
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;
    use crate::tree::MemoryTree;

    /// One image with an NTFS and an ext filesystem, each holding the same
    /// `$LogFile:$DATA` stream in the root and one level below.
    struct Fixture {
        tree: MemoryTree,
        ntfs_root_stream: NodeId,
        ntfs_nested_stream: NodeId,
        ntfs_high_addr: NodeId,
        ntfs_plain_dollar: NodeId,
        ext_root_stream: NodeId,
        dot: NodeId,
        layout: NodeId,
        derived: NodeId,
    }

    fn fixture() -> Fixture {
        let mut tree = MemoryTree::new();
        let img = tree.add_image("disk.img");

        let ntfs = tree.add_filesystem_with_root(img, "ntfs", FsType::Ntfs);
        let ntfs_root_stream = tree.add_file(ntfs, "$LogFile:$DATA");
        tree.set_meta_addr(ntfs_root_stream, 2);
        let ntfs_high_addr = tree.add_file(ntfs, "$Extend:$J");
        tree.set_meta_addr(ntfs_high_addr, 40);
        let ntfs_plain_dollar = tree.add_file(ntfs, "$MFT");
        tree.set_meta_addr(ntfs_plain_dollar, 0);
        let sub = tree.add_dir(ntfs, "sub");
        let ntfs_nested_stream = tree.add_file(sub, "$LogFile:$DATA");
        tree.set_meta_addr(ntfs_nested_stream, 2);
        let dot = tree.add_dir(sub, ".");
        let derived = tree.add_derived_file(sub, "$Carved:1");

        let ext = tree.add_filesystem_with_root(img, "ext", FsType::Ext);
        let ext_root_stream = tree.add_file(ext, "$LogFile:$DATA");
        tree.set_meta_addr(ext_root_stream, 2);

        let unalloc = tree.add_virtual_dir(img, "$Unalloc");
        let layout = tree.add_layout_file(unalloc, "Unalloc_1");

        Fixture {
            tree,
            ntfs_root_stream,
            ntfs_nested_stream,
            ntfs_high_addr,
            ntfs_plain_dollar,
            ext_root_stream,
            dot,
            layout,
            derived,
        }
    }

    fn check(f: &Fixture, id: NodeId, unalloc: bool) -> bool {
        let node = f.tree.get(id).unwrap().clone();
        EligibilityFilter::default().should_enqueue(&node, unalloc, &f.tree)
    }

    #[test]
    fn test_reserved_ntfs_stream_rejected() {
        let f = fixture();
        assert!(!check(&f, f.ntfs_root_stream, true));
    }

    #[test]
    fn test_same_name_on_other_fs_accepted() {
        let f = fixture();
        assert!(check(&f, f.ext_root_stream, false));
    }

    #[test]
    fn test_stream_outside_root_or_above_limit_accepted() {
        let f = fixture();
        assert!(check(&f, f.ntfs_nested_stream, false));
        assert!(check(&f, f.ntfs_high_addr, false));
        assert!(check(&f, f.ntfs_plain_dollar, false));
        assert!(check(&f, f.derived, false));
    }

    #[test]
    fn test_pseudo_entries_rejected() {
        let f = fixture();
        assert!(!check(&f, f.dot, true));
    }

    #[test]
    fn test_virtual_needs_unalloc_flag() {
        let f = fixture();
        assert!(!check(&f, f.layout, false));
        assert!(check(&f, f.layout, true));
    }

    #[test]
    fn test_filter_is_deterministic() {
        let f = fixture();
        for id in [f.ntfs_root_stream, f.ext_root_stream, f.layout, f.dot] {
            for unalloc in [false, true] {
                assert_eq!(check(&f, id, unalloc), check(&f, id, unalloc));
            }
        }
    }

    #[test]
    fn test_custom_limit() {
        let f = fixture();
        let node = f.tree.get(f.ntfs_high_addr).unwrap().clone();
        assert!(!EligibilityFilter::new(64).should_enqueue(&node, false, &f.tree));
    }
}
