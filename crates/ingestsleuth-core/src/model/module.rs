/// Analysis module interfaces and module sets.
///
/// Modules themselves are external collaborators. The scheduler only needs
/// their names (identity) and the pipeline only needs a way to run them.
use super::task::{ImageTask, ProcessTask};
use crate::scheduler::IngestScheduler;
use compact_str::CompactString;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity shared by every module kind. Two modules with the same name are
/// the same module.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;
}

/// A module that analyses one file (or directory) at a time.
///
/// Modules may schedule derived files through `scheduler`; the derived file
/// inherits the task's context.
pub trait FileModule: Module {
    fn process(&self, task: &ProcessTask, scheduler: &IngestScheduler) -> anyhow::Result<()>;
}

/// A module that analyses a whole image.
pub trait ImageModule: Module {
    fn process(&self, task: &ImageTask) -> anyhow::Result<()>;
}

/// Membership of a module set: its sorted module names. Used as part of the
/// dedup key.
///
/// Two sets with the same module names have the same key even when they are
/// distinct objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleSetKey(Arc<[CompactString]>);

impl ModuleSetKey {
    pub fn names(&self) -> &[CompactString] {
        &self.0
    }
}

/// Name-keyed set of module handles.
///
/// Merging is idempotent: adding a module whose name is already present
/// keeps the existing handle.
pub struct ModuleSet<M: ?Sized> {
    modules: BTreeMap<CompactString, Arc<M>>,
}

impl<M: ?Sized + Module> ModuleSet<M> {
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    /// Insert a module. Returns `false` if a module with that name was
    /// already present.
    pub fn insert(&mut self, module: Arc<M>) -> bool {
        let name = CompactString::new(module.name());
        if self.modules.contains_key(&name) {
            return false;
        }
        self.modules.insert(name, module);
        true
    }

    /// Union by module name.
    pub fn merge(&mut self, other: &ModuleSet<M>) {
        for module in other.modules.values() {
            self.insert(Arc::clone(module));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<M>> {
        self.modules.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Module names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<M>> {
        self.modules.values()
    }

    /// Membership key. Names come out of the map sorted, so the key does
    /// not depend on insertion order.
    pub fn key(&self) -> ModuleSetKey {
        ModuleSetKey(self.modules.keys().cloned().collect())
    }
}

impl<M: ?Sized + Module> Default for ModuleSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ?Sized> Clone for ModuleSet<M> {
    fn clone(&self) -> Self {
        Self {
            modules: self.modules.clone(),
        }
    }
}

impl<M: ?Sized + Module> FromIterator<Arc<M>> for ModuleSet<M> {
    fn from_iter<I: IntoIterator<Item = Arc<M>>>(iter: I) -> Self {
        let mut set = Self::new();
        for module in iter {
            set.insert(module);
        }
        set
    }
}

impl<M: ?Sized> fmt::Debug for ModuleSet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}
