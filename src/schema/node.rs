use serde::{Deserialize, Serialize};

/// Newtype wrapper for content node IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Reference to an external asset (background sprite, audio clip).
/// The flow controller never loads these; it only hands them to the display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef(pub String);

/// Reference to an external scene object toggled by activation directives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

/// Which role panel is shown while a node is on screen.
/// Exactly one panel is visible at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    #[default]
    User,
    Machine,
    Extra,
}

impl NodeRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Machine => "machine",
            Self::Extra => "extra",
        }
    }
}

/// A side effect requested when a node is entered or left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationDirective {
    pub target: TargetId,
    #[serde(default)]
    pub activate_on_entry: bool,
    #[serde(default)]
    pub deactivate_on_exit: bool,
}

/// Nodes carry at most this many activation directives.
pub const MAX_DIRECTIVES: usize = 2;

/// The smallest narrative unit: one screen of text plus its presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: NodeId,
    /// Authored name, e.g. `h1.s3` or `H1.C0.2`.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default)]
    pub background: Option<AssetRef>,
    #[serde(default)]
    pub sound: Option<AssetRef>,
    #[serde(default)]
    pub disable_advance_by_hold: bool,
    #[serde(default)]
    pub disable_advance_by_click: bool,
    #[serde(default = "default_counts_as_click")]
    pub counts_as_click: bool,
    #[serde(default)]
    pub directives: Vec<ActivationDirective>,
}

fn default_counts_as_click() -> bool {
    true
}

impl ContentNode {
    pub fn new(id: NodeId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            text: text.into(),
            role: NodeRole::default(),
            background: None,
            sound: None,
            disable_advance_by_hold: false,
            disable_advance_by_click: false,
            counts_as_click: true,
            directives: Vec::new(),
        }
    }

    /// Both gating flags set: the player cannot leave this node by any action.
    pub fn is_dead_end(&self) -> bool {
        self.disable_advance_by_hold && self.disable_advance_by_click
    }

    /// Tooling-only mutator.
    pub fn set_disable_advance_by_hold(&mut self, disabled: bool) {
        self.disable_advance_by_hold = disabled;
    }

    /// Tooling-only mutator.
    pub fn set_disable_advance_by_click(&mut self, disabled: bool) {
        self.disable_advance_by_click = disabled;
    }

    /// Targets to switch on when this node is entered.
    pub fn activations(&self) -> impl Iterator<Item = &TargetId> {
        self.directives
            .iter()
            .take(MAX_DIRECTIVES)
            .filter(|d| d.activate_on_entry)
            .map(|d| &d.target)
    }

    /// Targets to switch off when this node is left.
    pub fn deactivations(&self) -> impl Iterator<Item = &TargetId> {
        self.directives
            .iter()
            .take(MAX_DIRECTIVES)
            .filter(|d| d.deactivate_on_exit)
            .map(|d| &d.target)
    }

    /// Short single-line preview of the node text: 47 chars plus `...`
    /// when the text is longer than 50 chars.
    pub fn preview(&self) -> String {
        let count = self.text.chars().count();
        if count > 50 {
            let head: String = self.text.chars().take(47).collect();
            format!("{}...", head)
        } else {
            self.text.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(target: &str, on_entry: bool, on_exit: bool) -> ActivationDirective {
        ActivationDirective {
            target: TargetId(target.to_string()),
            activate_on_entry: on_entry,
            deactivate_on_exit: on_exit,
        }
    }

    #[test]
    fn new_node_defaults() {
        let node = ContentNode::new(NodeId(7), "h1.s0", "Hello.");
        assert_eq!(node.role, NodeRole::User);
        assert!(node.counts_as_click);
        assert!(!node.disable_advance_by_hold);
        assert!(!node.disable_advance_by_click);
        assert!(!node.is_dead_end());
    }

    #[test]
    fn role_defaults_to_user() {
        assert_eq!(NodeRole::default(), NodeRole::User);
        let node: ContentNode = ron::from_str("(id: NodeId(3))").unwrap();
        assert_eq!(node.role, NodeRole::User);
        assert!(node.counts_as_click);
    }

    #[test]
    fn dead_end_requires_both_flags() {
        let mut node = ContentNode::new(NodeId(1), "n", "");
        node.set_disable_advance_by_hold(true);
        assert!(!node.is_dead_end());
        node.set_disable_advance_by_click(true);
        assert!(node.is_dead_end());
    }

    #[test]
    fn directives_split_by_phase() {
        let mut node = ContentNode::new(NodeId(1), "n", "");
        node.directives = vec![directive("lamp", true, false), directive("door", true, true)];
        let on: Vec<_> = node.activations().map(|t| t.0.as_str()).collect();
        let off: Vec<_> = node.deactivations().map(|t| t.0.as_str()).collect();
        assert_eq!(on, vec!["lamp", "door"]);
        assert_eq!(off, vec!["door"]);
    }

    #[test]
    fn directives_beyond_two_are_ignored() {
        let mut node = ContentNode::new(NodeId(1), "n", "");
        node.directives = vec![
            directive("a", true, false),
            directive("b", true, false),
            directive("c", true, false),
        ];
        assert_eq!(node.activations().count(), 2);
    }

    #[test]
    fn preview_truncates_long_text() {
        let node = ContentNode::new(NodeId(1), "n", "x".repeat(60));
        let preview = node.preview();
        assert_eq!(preview.chars().count(), 50);
        assert!(preview.ends_with("..."));

        let short = ContentNode::new(NodeId(2), "n", "short");
        assert_eq!(short.preview(), "short");
    }

    #[test]
    fn role_labels() {
        assert_eq!(NodeRole::User.label(), "user");
        assert_eq!(NodeRole::Machine.label(), "machine");
        assert_eq!(NodeRole::Extra.label(), "extra");
    }

    #[test]
    fn counts_as_click_defaults_true_in_ron() {
        let node: ContentNode = ron::from_str(r#"(id: NodeId(3), text: "hi")"#).unwrap();
        assert!(node.counts_as_click);
        assert_eq!(node.name, "");
    }
}
