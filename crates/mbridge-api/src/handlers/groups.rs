//! Controller group table management

use axum::extract::State;
use axum::Json;
use mbridge_core::{GroupAction, GroupInfo};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::parse::parse_id;
use crate::response::ApiJson;
use crate::state::AppState;

/// Group-settings request, selected by its `action` field
#[derive(Debug, Deserialize)]
#[serde(tag = "action")]
pub enum GroupSettingsRequest {
    #[serde(rename = "show-groups")]
    ShowGroups,
    #[serde(rename = "add-group")]
    AddGroup { group_id: String, group_name: String },
    #[serde(rename = "remove-group")]
    RemoveGroup { group_id: String },
}

impl TryFrom<GroupSettingsRequest> for GroupAction {
    type Error = ApiError;

    fn try_from(request: GroupSettingsRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            GroupSettingsRequest::ShowGroups => GroupAction::Show,
            GroupSettingsRequest::AddGroup {
                group_id,
                group_name,
            } => GroupAction::Add {
                group_id: parse_id("group_id", &group_id)?,
                name: group_name,
            },
            GroupSettingsRequest::RemoveGroup { group_id } => GroupAction::Remove {
                group_id: parse_id("group_id", &group_id)?,
            },
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupSettingsResponse {
    pub status: String,
    pub message: String,
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group_id: String,
    pub group_name: String,
}

impl From<GroupInfo> for GroupEntry {
    fn from(group: GroupInfo) -> Self {
        Self {
            group_id: format!("0x{:04X}", group.group_id),
            group_name: group.name,
        }
    }
}

/// POST /api/group-settings
pub async fn group_settings(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<GroupSettingsRequest>,
) -> Result<Json<GroupSettingsResponse>, ApiError> {
    let action = GroupAction::try_from(request)?;
    let groups = state.controller().group_settings(action).await?;

    Ok(Json(GroupSettingsResponse {
        status: "success".to_string(),
        message: "Group settings command executed successfully".to_string(),
        groups: groups.into_iter().map(GroupEntry::from).collect(),
    }))
}
