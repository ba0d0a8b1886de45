// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistence boundary used by the request handlers.

use diesel::result::DatabaseErrorKind;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{
    Card, CardChanges, CardOption, Group, GroupAdmin, GroupChanges, GroupMember, NewCard,
    NewGroup, NewPack, NewUser, Pack, PackChanges, User, UserChanges,
};

#[cfg(test)]
pub mod memory;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(diesel::result::Error),
    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => StoreError::NotFound,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// The owner a pack is created for or listed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackOwner {
    User(Uuid),
    Group(Uuid),
}

/// Resolved ownership of a stored pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    User(Uuid),
    Group(Uuid),
    /// Neither or both side rows are present.
    Undetermined,
}

/// Classifies a pack by which ownership side row is populated.
pub fn detect_type(user_id: Option<Uuid>, group_id: Option<Uuid>) -> Ownership {
    match (user_id, group_id) {
        (Some(user_id), None) => Ownership::User(user_id),
        (None, Some(group_id)) => Ownership::Group(group_id),
        _ => Ownership::Undetermined,
    }
}

/// A pack together with its ownership side rows.
#[derive(Debug, Clone)]
pub struct OwnedPack {
    pub pack: Pack,
    pub user_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

impl OwnedPack {
    pub fn ownership(&self) -> Ownership {
        detect_type(self.user_id, self.group_id)
    }
}

#[derive(Debug, Clone)]
pub struct CardWithOptions {
    pub card: Card,
    /// Sorted by `position`.
    pub options: Vec<CardOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardOptionInput {
    pub text: String,
    pub is_correct: bool,
    pub position: i32,
}

impl CardOptionInput {
    pub fn into_option(self, card_id: Uuid) -> CardOption {
        CardOption {
            id: Uuid::now_v7(),
            card_id,
            text: self.text,
            is_correct: self.is_correct,
            position: self.position,
        }
    }
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────── Users ─────────────────────────────

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// `email` must already be normalized.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError>;

    /// Deletes the user and every pack owned by them. Returns `false` if no such user.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;

    // ───────────────────────────── Groups ────────────────────────────

    /// Inserts the group, a joined membership row and a group-admin row for `creator`.
    async fn insert_group(&self, group: NewGroup, creator: Uuid) -> Result<Group, StoreError>;

    async fn group_by_id(&self, id: Uuid) -> Result<Option<Group>, StoreError>;

    /// `name` must already be normalized.
    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    /// Groups in which `user_id` has a membership row, joined or pending.
    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, StoreError>;

    async fn update_group(&self, id: Uuid, changes: GroupChanges) -> Result<Group, StoreError>;

    /// Deletes the group's packs, then the group with its membership and admin rows.
    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError>;

    // ─────────────────────────── Membership ──────────────────────────

    async fn membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError>;

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<(GroupMember, User)>, StoreError>;

    /// Creates a membership row, leaving an existing one untouched.
    async fn insert_member_if_absent(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        is_joined: bool,
    ) -> Result<GroupMember, StoreError>;

    async fn mark_joined(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, StoreError>;

    async fn delete_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    async fn group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupAdmin>, StoreError>;

    /// Idempotent.
    async fn insert_group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupAdmin, StoreError>;

    // ───────────────────────────── Packs ─────────────────────────────

    /// Inserts the pack and exactly one ownership side row.
    async fn insert_pack(&self, pack: NewPack, owner: PackOwner) -> Result<OwnedPack, StoreError>;

    async fn pack_by_id(&self, id: Uuid) -> Result<Option<OwnedPack>, StoreError>;

    async fn list_packs_for_owner(&self, owner: PackOwner) -> Result<Vec<OwnedPack>, StoreError>;

    async fn list_packs(&self) -> Result<Vec<OwnedPack>, StoreError>;

    async fn update_pack(&self, id: Uuid, changes: PackChanges) -> Result<OwnedPack, StoreError>;

    async fn delete_pack(&self, id: Uuid) -> Result<bool, StoreError>;

    // ───────────────────────────── Cards ─────────────────────────────

    async fn insert_card(
        &self,
        card: NewCard,
        options: Vec<CardOptionInput>,
    ) -> Result<CardWithOptions, StoreError>;

    async fn card_by_id(&self, id: Uuid) -> Result<Option<CardWithOptions>, StoreError>;

    async fn list_cards_for_pack(&self, pack_id: Uuid) -> Result<Vec<CardWithOptions>, StoreError>;

    /// When `options` is `Some`, all existing options are deleted and replaced.
    async fn update_card(
        &self,
        id: Uuid,
        changes: CardChanges,
        options: Option<Vec<CardOptionInput>>,
    ) -> Result<CardWithOptions, StoreError>;

    async fn delete_card(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_type_is_exclusive() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();

        assert_eq!(detect_type(Some(user), None), Ownership::User(user));
        assert_eq!(detect_type(None, Some(group)), Ownership::Group(group));
        assert_eq!(detect_type(None, None), Ownership::Undetermined);
        assert_eq!(detect_type(Some(user), Some(group)), Ownership::Undetermined);
    }
}
