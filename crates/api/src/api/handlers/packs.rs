// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{
        Context,
        handlers::{
            access::{Access, authorize_owner, check_forbidden, check_forbidden_on_create},
            check_length, check_max_length,
        },
    },
    db::models::{NewPack, PackChanges},
    error::{ApiError, ApiResult},
    normalize::make_name,
    store::{OwnedPack, Ownership, PackOwner},
};

pub const DEFAULT_TOTAL_TIME: i32 = 3600;
pub const MIN_TOTAL_TIME: i32 = 300;
pub const MAX_TOTAL_TIME: i32 = 10800;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Group,
    Undetermined,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PackView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub timed: bool,
    pub total_time: i32,
    pub live_results: bool,
    pub owner_type: OwnerType,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    pub created_date: DateTime<Utc>,
}

impl From<&OwnedPack> for PackView {
    fn from(owned: &OwnedPack) -> Self {
        let owner_type = match owned.ownership() {
            Ownership::User(_) => OwnerType::User,
            Ownership::Group(_) => OwnerType::Group,
            Ownership::Undetermined => OwnerType::Undetermined,
        };
        Self {
            id: owned.pack.id,
            name: owned.pack.name.clone(),
            description: owned.pack.description.clone(),
            timed: owned.pack.timed,
            total_time: owned.pack.total_time,
            live_results: owned.pack.live_results,
            owner_type,
            user_id: owned.user_id,
            group_id: owned.group_id,
            created_date: owned.pack.created_at,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreatePackInput {
    pub name: String,
    pub description: Option<String>,
    pub timed: Option<bool>,
    pub total_time: Option<i32>,
    pub live_results: Option<bool>,
    /// Owner of a personal pack when it is not the requester. Ignored for group packs.
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub timed: Option<bool>,
    pub total_time: Option<i32>,
    pub live_results: Option<bool>,
}

/// Which packs the admin listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackFilter {
    User,
    Group,
    #[default]
    Both,
}

impl FromStr for PackFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(PackFilter::User),
            "group" => Ok(PackFilter::Group),
            "both" => Ok(PackFilter::Both),
            other => Err(ApiError::BadRequest(format!(
                "type must be one of user, group, both (got '{other}')"
            ))),
        }
    }
}

fn check_pack_fields(
    name: Option<&str>,
    description: Option<&str>,
    total_time: Option<i32>,
) -> ApiResult<()> {
    if let Some(name) = name {
        check_length("name", name, 3, 50)?;
    }
    if let Some(description) = description {
        check_max_length("description", description, 500)?;
    }
    if let Some(total_time) = total_time {
        if !(MIN_TOTAL_TIME..=MAX_TOTAL_TIME).contains(&total_time) {
            return Err(ApiError::BadRequest(format!(
                "totalTime must be between {MIN_TOTAL_TIME} and {MAX_TOTAL_TIME}"
            )));
        }
    }
    Ok(())
}

/// Falls back to [`DEFAULT_TOTAL_TIME`] when unset or outside the accepted range.
pub fn effective_total_time(total_time: Option<i32>) -> i32 {
    match total_time {
        Some(t) if (MIN_TOTAL_TIME..=MAX_TOTAL_TIME).contains(&t) => t,
        _ => DEFAULT_TOTAL_TIME,
    }
}

async fn ensure_owner_exists(ctx: &Context, owner: PackOwner) -> ApiResult<()> {
    let exists = match owner {
        PackOwner::User(id) => ctx.store().user_by_id(id).await?.is_some(),
        PackOwner::Group(id) => ctx.store().group_by_id(id).await?.is_some(),
    };
    if exists {
        Ok(())
    } else {
        Err(match owner {
            PackOwner::User(id) => ApiError::NotFound(format!("User {id} not found")),
            PackOwner::Group(id) => ApiError::NotFound(format!("Group {id} not found")),
        })
    }
}

async fn load_pack(ctx: &Context, id: Uuid) -> ApiResult<OwnedPack> {
    ctx.store()
        .pack_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pack {id} not found")))
}

/// Loads a pack after checking `access` for the current user.
pub(crate) async fn authorized_pack(ctx: &Context, id: Uuid, access: Access) -> ApiResult<OwnedPack> {
    let requester = ctx.current_user().await?;
    let pack = load_pack(ctx, id).await?;
    check_forbidden(ctx.store(), requester.id, &pack, access).await?;
    Ok(pack)
}

/// Creates a group pack when `group_id` is given, a personal pack otherwise.
pub async fn create_pack(
    ctx: &Context,
    group_id: Option<Uuid>,
    input: CreatePackInput,
) -> ApiResult<PackView> {
    let requester = ctx.current_user().await?;
    check_pack_fields(
        Some(&input.name),
        input.description.as_deref(),
        input.total_time,
    )?;

    let owner = match group_id {
        Some(group_id) => PackOwner::Group(group_id),
        None => PackOwner::User(input.user_id.unwrap_or(requester.id)),
    };
    check_forbidden_on_create(ctx.store(), requester.id, owner).await?;
    ensure_owner_exists(ctx, owner).await?;

    let new_pack = NewPack {
        id: Uuid::now_v7(),
        name: make_name(&input.name),
        description: input.description,
        timed: input.timed.unwrap_or(false),
        total_time: effective_total_time(input.total_time),
        live_results: input.live_results.unwrap_or(false),
    };
    let pack = ctx.store().insert_pack(new_pack, owner).await?;
    tracing::info!(pack_id = %pack.pack.id, ?owner, by = %requester.id, "Created pack");
    Ok(PackView::from(&pack))
}

/// Lists the packs of one owner; without filters that is the requester.
pub async fn list_packs(
    ctx: &Context,
    group_id: Option<Uuid>,
    user_id: Option<Uuid>,
) -> ApiResult<Vec<PackView>> {
    let requester = ctx.current_user().await?;
    let owner = match (group_id, user_id) {
        (Some(group_id), _) => PackOwner::Group(group_id),
        (None, user_id) => PackOwner::User(user_id.unwrap_or(requester.id)),
    };
    authorize_owner(ctx.store(), requester.id, owner, Access::ReadOnly).await?;
    ensure_owner_exists(ctx, owner).await?;

    let packs = ctx.store().list_packs_for_owner(owner).await?;
    Ok(packs.iter().map(PackView::from).collect())
}

pub async fn list_all_packs(ctx: &Context, filter: PackFilter) -> ApiResult<Vec<PackView>> {
    let requester = ctx.current_user().await?;
    if !requester.is_admin {
        return Err(ApiError::Forbidden);
    }
    let packs = ctx.store().list_packs().await?;
    Ok(packs
        .iter()
        .filter(|pack| match (filter, pack.ownership()) {
            (PackFilter::Both, _) => true,
            (PackFilter::User, Ownership::User(_)) => true,
            (PackFilter::Group, Ownership::Group(_)) => true,
            _ => false,
        })
        .map(PackView::from)
        .collect())
}

pub async fn get_pack(ctx: &Context, id: Uuid) -> ApiResult<PackView> {
    let pack = authorized_pack(ctx, id, Access::ReadOnly).await?;
    Ok(PackView::from(&pack))
}

pub async fn update_pack(ctx: &Context, id: Uuid, input: UpdatePackInput) -> ApiResult<PackView> {
    authorized_pack(ctx, id, Access::Mutating).await?;
    check_pack_fields(
        input.name.as_deref(),
        input.description.as_deref(),
        input.total_time,
    )?;

    let changes = PackChanges {
        name: input.name.as_deref().map(make_name),
        description: input.description.map(Some),
        timed: input.timed,
        total_time: input.total_time,
        live_results: input.live_results,
        updated_at: Utc::now(),
    };
    let pack = ctx.store().update_pack(id, changes).await?;
    Ok(PackView::from(&pack))
}

/// Deletes the pack with all of its cards.
pub async fn delete_pack(ctx: &Context, id: Uuid) -> ApiResult<()> {
    authorized_pack(ctx, id, Access::Mutating).await?;
    if !ctx.store().delete_pack(id).await? {
        return Err(ApiError::NotFound(format!("Pack {id} not found")));
    }
    tracing::info!(pack_id = %id, "Deleted pack");
    Ok(())
}
