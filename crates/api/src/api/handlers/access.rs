// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Decides who may read, change or create packs and administer groups.
//!
//! Three privilege signals are combined: the global admin flag, a group-admin
//! row and a membership row (joined or pending). Every negative branch ends in
//! [`ApiError::Forbidden`]; permission is only ever granted affirmatively.

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::store::{OwnedPack, Ownership, PackOwner, Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    Mutating,
}

/// The privilege queries the resolver needs, independent of the rest of the store.
#[async_trait::async_trait]
pub trait OwnershipLookup: Send + Sync {
    /// Unknown users are not admins.
    async fn is_admin(&self, user_id: Uuid) -> Result<bool, StoreError>;

    async fn is_group_admin(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    /// True for pending invitations as well as joined members.
    async fn is_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S: Store + ?Sized> OwnershipLookup for S {
    async fn is_admin(&self, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .user_by_id(user_id)
            .await?
            .is_some_and(|user| user.is_admin))
    }

    async fn is_group_admin(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.group_admin(group_id, user_id).await?.is_some())
    }

    async fn is_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.membership(group_id, user_id).await?.is_some())
    }
}

fn deny(requester: Uuid, reason: &str) -> ApiError {
    tracing::debug!(%requester, reason, "Access denied");
    ApiError::Forbidden
}

/// Checks `access` against a known owner.
///
/// A personal owner admits only its user. A group admits its admins for any
/// access and additionally its members for reads. Global admins pass everything.
pub async fn authorize_owner<L: OwnershipLookup + ?Sized>(
    lookup: &L,
    requester: Uuid,
    owner: PackOwner,
    access: Access,
) -> ApiResult<()> {
    if lookup.is_admin(requester).await? {
        return Ok(());
    }
    match owner {
        PackOwner::User(user_id) => {
            if user_id == requester {
                Ok(())
            } else {
                Err(deny(requester, "not the owner of a personal pack"))
            }
        }
        PackOwner::Group(group_id) => {
            if lookup.is_group_admin(group_id, requester).await? {
                return Ok(());
            }
            match access {
                Access::ReadOnly if lookup.is_group_member(group_id, requester).await? => Ok(()),
                Access::ReadOnly => Err(deny(requester, "not a member of the owning group")),
                Access::Mutating => Err(deny(requester, "not an admin of the owning group")),
            }
        }
    }
}

/// Checks `access` to an existing pack.
///
/// A pack whose ownership cannot be determined is only reachable by global admins.
pub async fn check_forbidden<L: OwnershipLookup + ?Sized>(
    lookup: &L,
    requester: Uuid,
    pack: &OwnedPack,
    access: Access,
) -> ApiResult<()> {
    match pack.ownership() {
        Ownership::User(user_id) => {
            authorize_owner(lookup, requester, PackOwner::User(user_id), access).await
        }
        Ownership::Group(group_id) => {
            authorize_owner(lookup, requester, PackOwner::Group(group_id), access).await
        }
        Ownership::Undetermined => {
            if lookup.is_admin(requester).await? {
                Ok(())
            } else {
                tracing::warn!(pack_id = %pack.pack.id, "Pack has no determinable owner");
                Err(deny(requester, "pack ownership is undetermined"))
            }
        }
    }
}

/// Checks whether `requester` may create a pack for `owner`.
///
/// Plain group membership does not authorize creation.
pub async fn check_forbidden_on_create<L: OwnershipLookup + ?Sized>(
    lookup: &L,
    requester: Uuid,
    owner: PackOwner,
) -> ApiResult<()> {
    authorize_owner(lookup, requester, owner, Access::Mutating).await
}

/// Global admins and group admins administer a group.
pub async fn require_group_admin<L: OwnershipLookup + ?Sized>(
    lookup: &L,
    requester: Uuid,
    group_id: Uuid,
) -> ApiResult<()> {
    authorize_owner(lookup, requester, PackOwner::Group(group_id), Access::Mutating).await
}

/// Global admins, group admins and members (pending or joined) see a group's internals.
pub async fn require_group_visibility<L: OwnershipLookup + ?Sized>(
    lookup: &L,
    requester: Uuid,
    group_id: Uuid,
) -> ApiResult<()> {
    authorize_owner(lookup, requester, PackOwner::Group(group_id), Access::ReadOnly).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::seed_user;
    use crate::db::models::{NewGroup, NewPack};
    use crate::store::memory::MemoryStore;

    fn new_pack(name: &str) -> NewPack {
        NewPack {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            timed: false,
            total_time: 3600,
            live_results: false,
        }
    }

    async fn seed_group(store: &MemoryStore, creator: Uuid, name: &str) -> Uuid {
        store
            .insert_group(
                NewGroup {
                    id: Uuid::now_v7(),
                    name: name.to_string(),
                    description: None,
                    tags: Vec::new(),
                    created_by: Some(creator),
                    created_by_name: "Creator".to_string(),
                },
                creator,
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_personal_pack_is_private_to_its_owner() {
        let store = MemoryStore::new();
        let a = seed_user(&store, "Alice", false).await;
        let b = seed_user(&store, "Bob", false).await;
        let p1 = store
            .insert_pack(new_pack("P1"), PackOwner::User(a.id))
            .await
            .unwrap();

        assert!(check_forbidden(&store, a.id, &p1, Access::Mutating).await.is_ok());
        assert!(matches!(
            check_forbidden(&store, b.id, &p1, Access::ReadOnly).await,
            Err(ApiError::Forbidden)
        ));
        assert!(matches!(
            check_forbidden(&store, b.id, &p1, Access::Mutating).await,
            Err(ApiError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_global_admin_bypasses_ownership() {
        let store = MemoryStore::new();
        let owner = seed_user(&store, "Alice", false).await;
        let admin = seed_user(&store, "Root", true).await;
        let pack = store
            .insert_pack(new_pack("P1"), PackOwner::User(owner.id))
            .await
            .unwrap();
        let group_id = seed_group(&store, owner.id, "Physics").await;
        let group_pack = store
            .insert_pack(new_pack("P2"), PackOwner::Group(group_id))
            .await
            .unwrap();

        assert!(check_forbidden(&store, admin.id, &pack, Access::Mutating).await.is_ok());
        assert!(check_forbidden(&store, admin.id, &group_pack, Access::Mutating).await.is_ok());
        assert!(
            check_forbidden_on_create(&store, admin.id, PackOwner::User(owner.id))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_group_member_reads_but_does_not_mutate() {
        let store = MemoryStore::new();
        let c = seed_user(&store, "Carol", false).await;
        let d = seed_user(&store, "Dave", false).await;
        let outsider = seed_user(&store, "Eve", false).await;
        let group_id = seed_group(&store, c.id, "Chemistry").await;
        store.insert_member_if_absent(group_id, d.id, true).await.unwrap();
        let pack = store
            .insert_pack(new_pack("Organic"), PackOwner::Group(group_id))
            .await
            .unwrap();

        assert!(check_forbidden(&store, d.id, &pack, Access::ReadOnly).await.is_ok());
        assert!(matches!(
            check_forbidden(&store, d.id, &pack, Access::Mutating).await,
            Err(ApiError::Forbidden)
        ));
        assert!(check_forbidden(&store, c.id, &pack, Access::Mutating).await.is_ok());
        assert!(matches!(
            check_forbidden(&store, outsider.id, &pack, Access::ReadOnly).await,
            Err(ApiError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_pending_invitation_grants_read() {
        let store = MemoryStore::new();
        let c = seed_user(&store, "Carol", false).await;
        let invited = seed_user(&store, "Ivan", false).await;
        let group_id = seed_group(&store, c.id, "Biology").await;
        store
            .insert_member_if_absent(group_id, invited.id, false)
            .await
            .unwrap();
        let pack = store
            .insert_pack(new_pack("Cells"), PackOwner::Group(group_id))
            .await
            .unwrap();

        assert!(check_forbidden(&store, invited.id, &pack, Access::ReadOnly).await.is_ok());
    }

    #[tokio::test]
    async fn test_undetermined_ownership_fails_closed() {
        let store = MemoryStore::new();
        let user = seed_user(&store, "Alice", false).await;
        let admin = seed_user(&store, "Root", true).await;
        let pack_id = store.insert_orphan_pack("Orphan").await;
        let pack = store.pack_by_id(pack_id).await.unwrap().unwrap();
        assert_eq!(pack.ownership(), Ownership::Undetermined);

        assert!(matches!(
            check_forbidden(&store, user.id, &pack, Access::ReadOnly).await,
            Err(ApiError::Forbidden)
        ));
        assert!(check_forbidden(&store, admin.id, &pack, Access::Mutating).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_rules() {
        let store = MemoryStore::new();
        let c = seed_user(&store, "Carol", false).await;
        let d = seed_user(&store, "Dave", false).await;
        let group_id = seed_group(&store, c.id, "History").await;
        store.insert_member_if_absent(group_id, d.id, true).await.unwrap();

        assert!(
            check_forbidden_on_create(&store, d.id, PackOwner::User(d.id))
                .await
                .is_ok()
        );
        assert!(matches!(
            check_forbidden_on_create(&store, d.id, PackOwner::User(c.id)).await,
            Err(ApiError::Forbidden)
        ));
        assert!(
            check_forbidden_on_create(&store, c.id, PackOwner::Group(group_id))
                .await
                .is_ok()
        );
        assert!(matches!(
            check_forbidden_on_create(&store, d.id, PackOwner::Group(group_id)).await,
            Err(ApiError::Forbidden)
        ));
    }
}
