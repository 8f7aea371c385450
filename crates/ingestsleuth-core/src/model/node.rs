/// Content-tree nodes as seen by the scheduler.
///
/// A `Node` is a cheap, owned snapshot of one entry of the content tree.
/// The tree owns the real data; the scheduler only keeps snapshots for
/// as long as a task referencing them is queued.
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable unique identifier of a content-tree node.
///
/// Higher ids were created later. The root-set ordering relies on this to
/// surface the most recently created entries first among equal priorities.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a `NodeId` from an arena position.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index as u64)
    }

    /// Return the id as a `usize` for arena indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of node kinds in a content tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Image,
    Volume,
    FileSystem,
    /// Real directory inside a filesystem.
    Directory,
    /// Regular file inside a filesystem.
    File,
    /// Layout directory not backed by a filesystem (e.g. an unallocated-space container).
    VirtualDirectory,
    /// Block run without filesystem structure (e.g. a chunk of unallocated space).
    LayoutFile,
    /// File produced by an analysis module from another file's content.
    DerivedFile,
}

impl NodeKind {
    /// Human-readable label, used in logs and reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Volume => "volume",
            Self::FileSystem => "filesystem",
            Self::Directory => "directory",
            Self::File => "file",
            Self::VirtualDirectory => "virtual_directory",
            Self::LayoutFile => "layout_file",
            Self::DerivedFile => "derived_file",
        }
    }

    /// Directory-like nodes are expanded by the traversal instead of being
    /// queued as leaves.
    pub fn is_dir(self) -> bool {
        matches!(self, Self::Directory | Self::VirtualDirectory)
    }

    /// `true` for content backed by a real filesystem's metadata.
    pub fn is_fs_content(self) -> bool {
        matches!(self, Self::Directory | Self::File)
    }

    /// Layout content is virtual by nature.
    pub fn is_virtual_by_default(self) -> bool {
        matches!(self, Self::VirtualDirectory | Self::LayoutFile)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Filesystem types the scheduler distinguishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Fat12,
    Fat16,
    Fat32,
    Ntfs,
    ExFat,
    Ext,
    Hfs,
    Iso9660,
    #[default]
    Unsupported,
}

impl FsType {
    /// FAT and NTFS keep reserved system files in the root directory
    /// whose named streams are never analysed.
    pub fn is_fat_or_ntfs(self) -> bool {
        matches!(self, Self::Fat12 | Self::Fat16 | Self::Fat32 | Self::Ntfs)
    }

    /// Parse a user-supplied name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let t = match name.to_ascii_lowercase().as_str() {
            "fat12" => Self::Fat12,
            "fat16" => Self::Fat16,
            "fat32" | "fat" => Self::Fat32,
            "ntfs" => Self::Ntfs,
            "exfat" => Self::ExFat,
            "ext" | "ext2" | "ext3" | "ext4" => Self::Ext,
            "hfs" | "hfs+" | "apfs" => Self::Hfs,
            "iso9660" => Self::Iso9660,
            "unsupported" | "other" => Self::Unsupported,
            _ => return None,
        };
        Some(t)
    }
}

/// Snapshot of a content-tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,

    /// Entry name only, never the full path.
    pub name: CompactString,

    pub kind: NodeKind,

    /// Parent node. `None` only for images.
    pub parent: Option<NodeId>,

    /// Image this node belongs to. For an image node this is its own id.
    pub image: NodeId,

    /// Filesystem governing this node, if it lives under one.
    pub filesystem: Option<NodeId>,

    /// Filesystem type. Only set on `FileSystem` nodes.
    pub fs_type: Option<FsType>,

    /// Metadata address (inode / MFT entry number), when known.
    pub meta_addr: Option<u64>,

    /// `true` for content with no allocated filesystem backing
    /// (unallocated space, layout containers).
    pub is_virtual: bool,

    /// `true` for the root directory of a filesystem.
    pub is_fs_root: bool,
}

impl Node {
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// `true` for the `.` and `..` pseudo-entries.
    #[inline]
    pub fn is_pseudo_entry(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}
