// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{
        Context,
        handlers::{
            access::{require_group_admin, require_group_visibility},
            check_length, check_max_length,
            users::UserView,
        },
    },
    db::models::{Group, GroupAdmin, GroupChanges, GroupMember, NewGroup, User},
    error::{ApiError, ApiResult},
    normalize::{make_name, normalize_email},
};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Option<Uuid>,
    pub created_by_name: String,
    pub created_date: DateTime<Utc>,
}

impl From<&Group> for GroupView {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            tags: group.tags.clone(),
            created_by: group.created_by,
            created_by_name: group.created_by_name.clone(),
            created_date: group.created_at,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberView {
    pub user: UserView,
    pub is_joined: bool,
    pub is_group_admin: bool,
    pub invited_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GroupAdminView {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

impl From<GroupAdmin> for GroupAdminView {
    fn from(admin: GroupAdmin) -> Self {
        Self {
            group_id: admin.group_id,
            user_id: admin.user_id,
            granted_at: admin.granted_at,
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupInput {
    pub name: String,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
pub struct InviteInput {
    pub emails: Vec<String>,
}

fn check_group_fields(name: Option<&str>, description: Option<&str>) -> ApiResult<()> {
    if let Some(name) = name {
        check_length("name", name, 3, 20)?;
    }
    if let Some(description) = description {
        check_max_length("description", description, 500)?;
    }
    Ok(())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

async fn load_group(ctx: &Context, id: Uuid) -> ApiResult<Group> {
    ctx.store()
        .group_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Group {id} not found")))
}

async fn member_view(
    ctx: &Context,
    member: GroupMember,
    user: &User,
) -> ApiResult<GroupMemberView> {
    let is_group_admin = ctx
        .store()
        .group_admin(member.group_id, member.user_id)
        .await?
        .is_some();
    Ok(GroupMemberView {
        user: UserView::from(user),
        is_joined: member.is_joined,
        is_group_admin,
        invited_at: member.invited_at,
    })
}

/// Creates a group; the creator becomes a joined member and a group admin.
pub async fn create_group(ctx: &Context, input: CreateGroupInput) -> ApiResult<GroupView> {
    let requester = ctx.current_user().await?;
    check_group_fields(Some(&input.name), input.description.as_deref())?;

    let name = make_name(&input.name);
    if ctx.store().group_by_name(&name).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A group named {name} already exists"
        )));
    }

    let new_group = NewGroup {
        id: Uuid::now_v7(),
        name,
        description: input.description,
        tags: clean_tags(input.tags.unwrap_or_default()),
        created_by: Some(requester.id),
        created_by_name: requester.full_name(),
    };
    let group = ctx.store().insert_group(new_group, requester.id).await?;
    tracing::info!(group_id = %group.id, creator = %requester.id, "Created group");
    Ok(GroupView::from(&group))
}

/// Global admins see every group, everyone else the groups they were invited to or joined.
pub async fn list_groups(ctx: &Context) -> ApiResult<Vec<GroupView>> {
    let requester = ctx.current_user().await?;
    let groups = if requester.is_admin {
        ctx.store().list_groups().await?
    } else {
        ctx.store().list_groups_for_user(requester.id).await?
    };
    Ok(groups.iter().map(GroupView::from).collect())
}

pub async fn get_group(ctx: &Context, id: Uuid) -> ApiResult<GroupView> {
    ctx.current_user().await?;
    let group = load_group(ctx, id).await?;
    Ok(GroupView::from(&group))
}

pub async fn update_group(
    ctx: &Context,
    id: Uuid,
    input: UpdateGroupInput,
) -> ApiResult<GroupView> {
    let requester = ctx.current_user().await?;
    require_group_admin(ctx.store(), requester.id, id).await?;
    load_group(ctx, id).await?;
    check_group_fields(input.name.as_deref(), input.description.as_deref())?;

    let name = input.name.as_deref().map(make_name);
    if let Some(name) = &name {
        if let Some(existing) = ctx.store().group_by_name(name).await? {
            if existing.id != id {
                return Err(ApiError::Conflict(format!(
                    "A group named {name} already exists"
                )));
            }
        }
    }

    let changes = GroupChanges {
        name,
        description: input.description.map(Some),
        tags: input.tags.map(clean_tags),
        updated_at: Utc::now(),
    };
    let group = ctx.store().update_group(id, changes).await?;
    Ok(GroupView::from(&group))
}

/// Deletes the group after removing every pack it owns.
pub async fn delete_group(ctx: &Context, id: Uuid) -> ApiResult<()> {
    let requester = ctx.current_user().await?;
    require_group_admin(ctx.store(), requester.id, id).await?;
    load_group(ctx, id).await?;
    if !ctx.store().delete_group(id).await? {
        return Err(ApiError::NotFound(format!("Group {id} not found")));
    }
    tracing::info!(group_id = %id, by = %requester.id, "Deleted group");
    Ok(())
}

pub async fn list_members(ctx: &Context, group_id: Uuid) -> ApiResult<Vec<GroupMemberView>> {
    let requester = ctx.current_user().await?;
    require_group_visibility(ctx.store(), requester.id, group_id).await?;
    load_group(ctx, group_id).await?;

    let mut views = Vec::new();
    for (member, user) in ctx.store().list_members(group_id).await? {
        views.push(member_view(ctx, member, &user).await?);
    }
    Ok(views)
}

/// Invites every registered user among `emails`.
///
/// Unknown addresses and the group's creator are skipped. Existing membership
/// rows are left as they are, so a joined member is never reset to pending.
pub async fn invite_members(
    ctx: &Context,
    group_id: Uuid,
    input: InviteInput,
) -> ApiResult<Vec<GroupMemberView>> {
    let requester = ctx.current_user().await?;
    require_group_admin(ctx.store(), requester.id, group_id).await?;
    let group = load_group(ctx, group_id).await?;

    let mut invited = Vec::new();
    for email in &input.emails {
        let email = normalize_email(email);
        let Some(user) = ctx.store().user_by_email(&email).await? else {
            tracing::debug!(%group_id, %email, "Skipping invitation for unknown email");
            continue;
        };
        if group.created_by == Some(user.id) {
            continue;
        }
        let member = ctx
            .store()
            .insert_member_if_absent(group_id, user.id, false)
            .await?;
        invited.push(member_view(ctx, member, &user).await?);
    }
    tracing::info!(%group_id, count = invited.len(), "Invited users to group");
    Ok(invited)
}

/// Accepts a pending invitation of the requester.
pub async fn accept_invitation(ctx: &Context, group_id: Uuid) -> ApiResult<GroupMemberView> {
    let requester = ctx.current_user().await?;
    load_group(ctx, group_id).await?;
    if ctx
        .store()
        .membership(group_id, requester.id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!(
            "No invitation to group {group_id} found"
        )));
    }
    let member = ctx.store().mark_joined(group_id, requester.id).await?;
    member_view(ctx, member, &requester).await
}

/// Removes a membership. Users may remove themselves; admins may remove anyone.
pub async fn leave_group(ctx: &Context, group_id: Uuid, user_id: Option<Uuid>) -> ApiResult<()> {
    let requester = ctx.current_user().await?;
    let target = user_id.unwrap_or(requester.id);
    if target != requester.id {
        require_group_admin(ctx.store(), requester.id, group_id).await?;
    }
    load_group(ctx, group_id).await?;
    if !ctx.store().delete_member(group_id, target).await? {
        return Err(ApiError::NotFound(format!(
            "User {target} is not a member of group {group_id}"
        )));
    }
    tracing::info!(%group_id, user_id = %target, by = %requester.id, "Removed group member");
    Ok(())
}

pub async fn grant_group_admin(
    ctx: &Context,
    group_id: Uuid,
    user_id: Uuid,
) -> ApiResult<GroupAdminView> {
    let requester = ctx.current_user().await?;
    require_group_admin(ctx.store(), requester.id, group_id).await?;
    load_group(ctx, group_id).await?;
    if ctx.store().user_by_id(user_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("User {user_id} not found")));
    }
    let admin = ctx.store().insert_group_admin(group_id, user_id).await?;
    tracing::info!(%group_id, %user_id, by = %requester.id, "Granted group admin");
    Ok(GroupAdminView::from(admin))
}
