use serde::{Deserialize, Serialize};

/// Editor behaviour shared by every open document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    /// Undo levels kept (0 = unlimited)
    #[serde(default = "default_max_undo")]
    pub max_undo: usize,

    /// Skip reference rewriting after renames
    #[serde(default)]
    pub ignore_name_changes: bool,

    /// Spaces per nesting level in nested text
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,

    /// Store snapshots as nested text instead of deep instances
    #[serde(default = "default_true")]
    pub store_nested_state: bool,
}

fn default_max_undo() -> usize {
    100
}

fn default_indent_width() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo: default_max_undo(),
            ignore_name_changes: false,
            indent_width: default_indent_width(),
            store_nested_state: true,
        }
    }
}
