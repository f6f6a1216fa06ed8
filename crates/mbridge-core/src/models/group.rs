//! Controller group table entries and the actions that edit it

use serde::Serialize;

/// Group identifier; zero is reserved
pub type GroupId = u16;

/// Longest group name the controller stores
pub const MAX_GROUP_NAME_LEN: usize = 16;

/// One entry of the controller's group table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub group_id: GroupId,
    pub name: String,
}

/// Group-settings action, executed immediately under the stack gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    Show,
    /// Insert a group, renaming it if the id already exists
    Add { group_id: GroupId, name: String },
    Remove { group_id: GroupId },
}

impl GroupAction {
    pub fn name(&self) -> &'static str {
        match self {
            GroupAction::Show => "show-groups",
            GroupAction::Add { .. } => "add-group",
            GroupAction::Remove { .. } => "remove-group",
        }
    }
}
