/// Arena-backed content tree.
///
/// All nodes live in a single `Vec`. Relationships use `NodeId` (the arena
/// position) rather than heap pointers. Children are linked through
/// `first_child` / `next_sibling`, with a `last_child` cursor so that
/// appending keeps the native insertion order.
use super::ContentTree;
use crate::error::TreeError;
use crate::model::{FsType, Node, NodeId, NodeKind};
use compact_str::CompactString;

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
    /// Listing children (or counting files, for a filesystem) fails.
    unreadable: bool,
}

/// In-memory content tree, built by the manifest loader, the directory
/// importer, or directly in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    entries: Vec<Entry>,
    images: Vec<NodeId>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty tree with pre-allocated capacity.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        Self {
            entries: Vec::with_capacity(estimated_nodes),
            images: Vec::new(),
        }
    }

    /// Add a new image root.
    pub fn add_image(&mut self, name: &str) -> NodeId {
        let id = NodeId::new(self.entries.len());
        self.entries.push(Entry {
            node: Node {
                id,
                name: CompactString::new(name),
                kind: NodeKind::Image,
                parent: None,
                image: id,
                filesystem: None,
                fs_type: None,
                meta_addr: None,
                is_virtual: false,
                is_fs_root: false,
            },
            first_child: None,
            last_child: None,
            next_sibling: None,
            unreadable: false,
        });
        self.images.push(id);
        id
    }

    /// Append a child of `kind` under `parent`.
    ///
    /// Image, filesystem, and root-directory membership are inherited from
    /// the parent. A directory directly under a filesystem is that
    /// filesystem's root directory.
    ///
    /// # Panics
    /// If `parent` is not a node of this tree, or `kind` is `Image`.
    pub fn add_node(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> NodeId {
        assert!(kind != NodeKind::Image, "use add_image for image roots");
        let id = NodeId::new(self.entries.len());
        let p = &self.entries[parent.idx()].node;

        let filesystem = if p.kind == NodeKind::FileSystem {
            Some(p.id)
        } else {
            p.filesystem
        };
        let node = Node {
            id,
            name: CompactString::new(name),
            kind,
            parent: Some(parent),
            image: p.image,
            filesystem,
            fs_type: None,
            meta_addr: None,
            is_virtual: kind.is_virtual_by_default(),
            is_fs_root: kind == NodeKind::Directory && p.kind == NodeKind::FileSystem,
        };

        self.entries.push(Entry {
            node,
            first_child: None,
            last_child: None,
            next_sibling: None,
            unreadable: false,
        });

        match self.entries[parent.idx()].last_child {
            Some(last) => self.entries[last.idx()].next_sibling = Some(id),
            None => self.entries[parent.idx()].first_child = Some(id),
        }
        self.entries[parent.idx()].last_child = Some(id);
        id
    }

    pub fn add_volume(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::Volume)
    }

    pub fn add_filesystem(&mut self, parent: NodeId, name: &str, fs_type: FsType) -> NodeId {
        let id = self.add_node(parent, name, NodeKind::FileSystem);
        self.entries[id.idx()].node.fs_type = Some(fs_type);
        id
    }

    /// Add a filesystem together with its root directory. Returns the root
    /// directory.
    pub fn add_filesystem_with_root(
        &mut self,
        parent: NodeId,
        name: &str,
        fs_type: FsType,
    ) -> NodeId {
        let fs = self.add_filesystem(parent, name, fs_type);
        self.add_node(fs, "/", NodeKind::Directory)
    }

    pub fn add_dir(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::Directory)
    }

    pub fn add_file(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::File)
    }

    pub fn add_virtual_dir(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::VirtualDirectory)
    }

    pub fn add_layout_file(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::LayoutFile)
    }

    pub fn add_derived_file(&mut self, parent: NodeId, name: &str) -> NodeId {
        self.add_node(parent, name, NodeKind::DerivedFile)
    }

    pub fn set_meta_addr(&mut self, id: NodeId, meta_addr: u64) {
        self.entries[id.idx()].node.meta_addr = Some(meta_addr);
    }

    pub fn set_virtual(&mut self, id: NodeId, is_virtual: bool) {
        self.entries[id.idx()].node.is_virtual = is_virtual;
    }

    /// Make child listing (and file counting, for a filesystem) fail for `id`.
    pub fn mark_unreadable(&mut self, id: NodeId) {
        self.entries[id.idx()].unreadable = true;
    }

    /// Image roots in creation order.
    pub fn images(&self) -> &[NodeId] {
        &self.images
    }

    /// Borrow a node without cloning.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.entries.get(id.idx()).map(|e| &e.node)
    }

    /// Reconstruct the full path for a node by walking up to its image.
    pub fn full_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let Some(entry) = self.entries.get(cur.idx()) else {
                break;
            };
            if entry.node.name != "/" {
                segments.push(entry.node.name.as_str());
            }
            current = entry.node.parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Total number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: NodeId) -> Result<&Entry, TreeError> {
        self.entries.get(id.idx()).ok_or(TreeError::UnknownNode(id))
    }
}

impl ContentTree for MemoryTree {
    fn node(&self, id: NodeId) -> Result<Node, TreeError> {
        Ok(self.entry(id)?.node.clone())
    }

    fn children(&self, id: NodeId) -> Result<Vec<Node>, TreeError> {
        let entry = self.entry(id)?;
        if entry.unreadable {
            return Err(TreeError::Unreadable {
                id,
                name: entry.node.name.to_string(),
            });
        }
        let mut children = Vec::new();
        let mut child = entry.first_child;
        while let Some(cid) = child {
            let c = &self.entries[cid.idx()];
            children.push(c.node.clone());
            child = c.next_sibling;
        }
        Ok(children)
    }

    /// Regular files plus directories other than `.` and `..` that belong
    /// to `fs`.
    fn count_eligible_files(&self, fs: NodeId) -> Result<u64, TreeError> {
        let entry = self.entry(fs)?;
        if entry.unreadable {
            return Err(TreeError::CountFailed {
                fs,
                reason: format!("filesystem {} is unreadable", entry.node.name),
            });
        }
        let count = self
            .entries
            .iter()
            .map(|e| &e.node)
            .filter(|n| n.filesystem == Some(fs))
            .filter(|n| {
                n.kind == NodeKind::File || (n.kind == NodeKind::Directory && !n.is_pseudo_entry())
            })
            .count();
        Ok(count as u64)
    }
}
