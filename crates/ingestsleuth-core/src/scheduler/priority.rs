/// Priority classification of root-level entries.
///
/// Only entries that become root tasks are classified. Their descendants
/// inherit the urgency implicitly through traversal order.
///
/// The rules assume an investigation looking for user content: user
/// profile folders first, system folders and orphan files late, swap and
/// hibernation files last.
use crate::model::Node;
use serde::{Deserialize, Serialize};

/// Priority tier of a root-level entry. Declared lowest first so the
/// derived `Ord` gives `High > Medium > Low > Last`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Last,
    Low,
    Medium,
    High,
}

/// A case-insensitive name-prefix rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    pub prefix: String,
    pub tier: Priority,
}

impl PriorityRule {
    pub fn new(prefix: &str, tier: Priority) -> Self {
        Self {
            prefix: prefix.to_owned(),
            tier,
        }
    }

    /// ASCII case-insensitive prefix match, compared byte-wise so that
    /// names with multi-byte characters never split a code point.
    pub fn matches(&self, name: &str) -> bool {
        let (name, prefix) = (name.as_bytes(), self.prefix.as_bytes());
        name.len() >= prefix.len() && name[..prefix.len()].eq_ignore_ascii_case(prefix)
    }
}

/// Ordered rule table, evaluated top-down. First match wins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityRules(pub Vec<PriorityRule>);

impl Default for PriorityRules {
    fn default() -> Self {
        Self(vec![
            PriorityRule::new("Users", Priority::High),
            PriorityRule::new("Documents and Settings", Priority::High),
            PriorityRule::new("home", Priority::High),
            PriorityRule::new("ProgramData", Priority::High),
            PriorityRule::new("Program Files", Priority::Medium),
            PriorityRule::new("$OrphanFiles", Priority::Low),
            PriorityRule::new("Windows", Priority::Low),
            PriorityRule::new("pagefile", Priority::Last),
            PriorityRule::new("hiberfil", Priority::Last),
        ])
    }
}

impl PriorityRules {
    /// Tier for a root-level entry.
    ///
    /// Content without filesystem structure (unallocated containers, layout
    /// files, derived files) always goes last. Unmatched names are `Medium`.
    pub fn classify(&self, node: &Node) -> Priority {
        if !node.kind.is_fs_content() {
            return Priority::Last;
        }
        self.classify_name(&node.name)
    }

    /// Name-only lookup.
    pub fn classify_name(&self, name: &str) -> Priority {
        self.0
            .iter()
            .find(|rule| rule.matches(name))
            .map(|rule| rule.tier)
            .unwrap_or(Priority::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeId, NodeKind};
    use compact_str::CompactString;

    fn fs_node(name: &str, kind: NodeKind) -> Node {
        Node {
            id: NodeId(7),
            name: CompactString::new(name),
            kind,
            parent: Some(NodeId(3)),
            image: NodeId(0),
            filesystem: Some(NodeId(2)),
            fs_type: None,
            meta_addr: None,
            is_virtual: false,
            is_fs_root: false,
        }
    }

    #[test]
    fn test_tier_order() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::Low > Priority::Last);
    }

    #[test]
    fn test_default_table() {
        let rules = PriorityRules::default();
        assert_eq!(rules.classify_name("Users"), Priority::High);
        assert_eq!(rules.classify_name("users"), Priority::High);
        assert_eq!(rules.classify_name("Documents and Settings"), Priority::High);
        assert_eq!(rules.classify_name("HOME"), Priority::High);
        assert_eq!(rules.classify_name("ProgramData"), Priority::High);
        assert_eq!(rules.classify_name("Program Files (x86)"), Priority::Medium);
        assert_eq!(rules.classify_name("$OrphanFiles"), Priority::Low);
        assert_eq!(rules.classify_name("WINDOWS"), Priority::Low);
        assert_eq!(rules.classify_name("pagefile.sys"), Priority::Last);
        assert_eq!(rules.classify_name("hiberfil.sys"), Priority::Last);
        assert_eq!(rules.classify_name("Temp"), Priority::Medium);
    }

    #[test]
    fn test_prefix_only() {
        let rules = PriorityRules::default();
        // "ProgramData" must win over "Program Files" by table order, and a
        // name that merely contains a pattern does not match.
        assert_eq!(rules.classify_name("ProgramDataBackup"), Priority::High);
        assert_eq!(rules.classify_name("OldWindows"), Priority::Medium);
        assert_eq!(rules.classify_name("Use"), Priority::Medium);
    }

    #[test]
    fn test_non_fs_content_is_last() {
        let rules = PriorityRules::default();
        assert_eq!(
            rules.classify(&fs_node("Users", NodeKind::VirtualDirectory)),
            Priority::Last
        );
        assert_eq!(
            rules.classify(&fs_node("Users", NodeKind::LayoutFile)),
            Priority::Last
        );
        assert_eq!(
            rules.classify(&fs_node("Users", NodeKind::Directory)),
            Priority::High
        );
    }

    #[test]
    fn test_multibyte_names_do_not_panic() {
        let rules = PriorityRules::default();
        assert_eq!(rules.classify_name("ü"), Priority::Medium);
        assert_eq!(rules.classify_name("Üsers-ünïcode"), Priority::Medium);
    }
}
