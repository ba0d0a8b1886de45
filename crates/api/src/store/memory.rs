// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory [`Store`] used by the handler tests.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CardOptionInput, CardWithOptions, OwnedPack, PackOwner, Store, StoreError};
use crate::db::models::*;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    members: HashMap<(Uuid, Uuid), GroupMember>,
    admins: HashMap<(Uuid, Uuid), GroupAdmin>,
    packs: HashMap<Uuid, Pack>,
    user_packs: HashMap<Uuid, Uuid>,
    group_packs: HashMap<Uuid, Uuid>,
    cards: HashMap<Uuid, Card>,
    options: Vec<CardOption>,
}

impl State {
    fn owned(&self, pack: &Pack) -> OwnedPack {
        OwnedPack {
            pack: pack.clone(),
            user_id: self.user_packs.get(&pack.id).copied(),
            group_id: self.group_packs.get(&pack.id).copied(),
        }
    }

    fn with_options(&self, card: &Card) -> CardWithOptions {
        let mut options: Vec<CardOption> = self
            .options
            .iter()
            .filter(|option| option.card_id == card.id)
            .cloned()
            .collect();
        options.sort_by_key(|option| option.position);
        CardWithOptions {
            card: card.clone(),
            options,
        }
    }

    fn remove_pack(&mut self, pack_id: Uuid) -> bool {
        let removed = self.packs.remove(&pack_id).is_some();
        self.user_packs.remove(&pack_id);
        self.group_packs.remove(&pack_id);
        let card_ids: Vec<Uuid> = self
            .cards
            .values()
            .filter(|card| card.pack_id == pack_id)
            .map(|card| card.id)
            .collect();
        for card_id in card_ids {
            self.remove_card(card_id);
        }
        removed
    }

    fn remove_card(&mut self, card_id: Uuid) -> bool {
        self.options.retain(|option| option.card_id != card_id);
        self.cards.remove(&card_id).is_some()
    }

    /// Inserts a pack with neither side row, which regular code paths never produce.
    fn insert_orphan(&mut self, pack: Pack) {
        self.packs.insert(pack.id, pack);
    }
}

fn sorted_packs(mut packs: Vec<OwnedPack>) -> Vec<OwnedPack> {
    packs.sort_by(|a, b| a.pack.name.cmp(&b.pack.name));
    packs
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_orphan_pack(&self, name: &str) -> Uuid {
        let now = Utc::now();
        let pack = Pack {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: None,
            timed: false,
            total_time: 3600,
            live_results: false,
            created_at: now,
            updated_at: now,
        };
        let id = pack.id;
        self.state.write().await.insert_orphan(pack);
        id
    }

    pub async fn pack_count(&self) -> usize {
        self.state.read().await.packs.len()
    }

    pub async fn card_count(&self) -> usize {
        self.state.read().await.cards.len()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {}", user.email)));
        }
        let now = Utc::now();
        let record = User {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            password_hash: user.password_hash,
            is_admin: user.is_admin,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(first_name) = changes.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.last_name = last_name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }
        user.updated_at = changes.updated_at;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let owned: Vec<Uuid> = state
            .user_packs
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(pack_id, _)| *pack_id)
            .collect();
        for pack_id in owned {
            state.remove_pack(pack_id);
        }
        state.members.retain(|(_, user_id), _| *user_id != id);
        state.admins.retain(|(_, user_id), _| *user_id != id);
        for group in state.groups.values_mut() {
            if group.created_by == Some(id) {
                group.created_by = None;
            }
        }
        Ok(state.users.remove(&id).is_some())
    }

    async fn insert_group(&self, group: NewGroup, creator: Uuid) -> Result<Group, StoreError> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|g| g.name == group.name) {
            return Err(StoreError::Conflict(format!("group name {}", group.name)));
        }
        let now = Utc::now();
        let record = Group {
            id: group.id,
            name: group.name,
            description: group.description,
            tags: group.tags,
            created_by: group.created_by,
            created_by_name: group.created_by_name,
            created_at: now,
            updated_at: now,
        };
        state.groups.insert(record.id, record.clone());
        state.members.insert(
            (record.id, creator),
            GroupMember {
                group_id: record.id,
                user_id: creator,
                is_joined: true,
                invited_at: now,
            },
        );
        state.admins.insert(
            (record.id, creator),
            GroupAdmin {
                group_id: record.id,
                user_id: creator,
                granted_at: now,
            },
        );
        Ok(record)
    }

    async fn group_by_id(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let mut groups: Vec<Group> = self.state.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, StoreError> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| state.members.contains_key(&(g.id, user_id)))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn update_group(&self, id: Uuid, changes: GroupChanges) -> Result<Group, StoreError> {
        let mut state = self.state.write().await;
        let group = state.groups.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            group.name = name;
        }
        if let Some(description) = changes.description {
            group.description = description;
        }
        if let Some(tags) = changes.tags {
            group.tags = tags;
        }
        group.updated_at = changes.updated_at;
        Ok(group.clone())
    }

    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let owned: Vec<Uuid> = state
            .group_packs
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(pack_id, _)| *pack_id)
            .collect();
        for pack_id in owned {
            state.remove_pack(pack_id);
        }
        let removed = state.groups.remove(&id).is_some();
        state.members.retain(|(group_id, _), _| *group_id != id);
        state.admins.retain(|(group_id, _), _| *group_id != id);
        Ok(removed)
    }

    async fn membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .members
            .get(&(group_id, user_id))
            .cloned())
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<(GroupMember, User)>, StoreError> {
        let state = self.state.read().await;
        let mut members: Vec<(GroupMember, User)> = state
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .filter_map(|m| state.users.get(&m.user_id).map(|u| (m.clone(), u.clone())))
            .collect();
        members.sort_by(|(_, a), (_, b)| {
            (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name))
        });
        Ok(members)
    }

    async fn insert_member_if_absent(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        is_joined: bool,
    ) -> Result<GroupMember, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .members
            .entry((group_id, user_id))
            .or_insert_with(|| GroupMember {
                group_id,
                user_id,
                is_joined,
                invited_at: Utc::now(),
            })
            .clone())
    }

    async fn mark_joined(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, StoreError> {
        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(&(group_id, user_id))
            .ok_or(StoreError::NotFound)?;
        member.is_joined = true;
        Ok(member.clone())
    }

    async fn delete_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state
            .write()
            .await
            .members
            .remove(&(group_id, user_id))
            .is_some())
    }

    async fn group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupAdmin>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .admins
            .get(&(group_id, user_id))
            .cloned())
    }

    async fn insert_group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupAdmin, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .admins
            .entry((group_id, user_id))
            .or_insert_with(|| GroupAdmin {
                group_id,
                user_id,
                granted_at: Utc::now(),
            })
            .clone())
    }

    async fn insert_pack(&self, pack: NewPack, owner: PackOwner) -> Result<OwnedPack, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let record = Pack {
            id: pack.id,
            name: pack.name,
            description: pack.description,
            timed: pack.timed,
            total_time: pack.total_time,
            live_results: pack.live_results,
            created_at: now,
            updated_at: now,
        };
        state.packs.insert(record.id, record.clone());
        match owner {
            PackOwner::User(user_id) => state.user_packs.insert(record.id, user_id),
            PackOwner::Group(group_id) => state.group_packs.insert(record.id, group_id),
        };
        Ok(state.owned(&record))
    }

    async fn pack_by_id(&self, id: Uuid) -> Result<Option<OwnedPack>, StoreError> {
        let state = self.state.read().await;
        Ok(state.packs.get(&id).map(|pack| state.owned(pack)))
    }

    async fn list_packs_for_owner(&self, owner: PackOwner) -> Result<Vec<OwnedPack>, StoreError> {
        let state = self.state.read().await;
        let packs = state
            .packs
            .values()
            .map(|pack| state.owned(pack))
            .filter(|owned| match owner {
                PackOwner::User(user_id) => owned.user_id == Some(user_id),
                PackOwner::Group(group_id) => owned.group_id == Some(group_id),
            })
            .collect();
        Ok(sorted_packs(packs))
    }

    async fn list_packs(&self) -> Result<Vec<OwnedPack>, StoreError> {
        let state = self.state.read().await;
        let packs = state.packs.values().map(|pack| state.owned(pack)).collect();
        Ok(sorted_packs(packs))
    }

    async fn update_pack(&self, id: Uuid, changes: PackChanges) -> Result<OwnedPack, StoreError> {
        let mut state = self.state.write().await;
        let pack = state.packs.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            pack.name = name;
        }
        if let Some(description) = changes.description {
            pack.description = description;
        }
        if let Some(timed) = changes.timed {
            pack.timed = timed;
        }
        if let Some(total_time) = changes.total_time {
            pack.total_time = total_time;
        }
        if let Some(live_results) = changes.live_results {
            pack.live_results = live_results;
        }
        pack.updated_at = changes.updated_at;
        let pack = pack.clone();
        Ok(state.owned(&pack))
    }

    async fn delete_pack(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.write().await.remove_pack(id))
    }

    async fn insert_card(
        &self,
        card: NewCard,
        options: Vec<CardOptionInput>,
    ) -> Result<CardWithOptions, StoreError> {
        let mut state = self.state.write().await;
        if !state.packs.contains_key(&card.pack_id) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        let record = Card {
            id: card.id,
            pack_id: card.pack_id,
            card_type: card.card_type,
            question: card.question,
            created_at: now,
            updated_at: now,
        };
        state.cards.insert(record.id, record.clone());
        state.options.extend(
            options
                .into_iter()
                .map(|option| option.into_option(record.id)),
        );
        Ok(state.with_options(&record))
    }

    async fn card_by_id(&self, id: Uuid) -> Result<Option<CardWithOptions>, StoreError> {
        let state = self.state.read().await;
        Ok(state.cards.get(&id).map(|card| state.with_options(card)))
    }

    async fn list_cards_for_pack(&self, pack_id: Uuid) -> Result<Vec<CardWithOptions>, StoreError> {
        let state = self.state.read().await;
        let mut cards: Vec<CardWithOptions> = state
            .cards
            .values()
            .filter(|card| card.pack_id == pack_id)
            .map(|card| state.with_options(card))
            .collect();
        cards.sort_by_key(|c| c.card.created_at);
        Ok(cards)
    }

    async fn update_card(
        &self,
        id: Uuid,
        changes: CardChanges,
        options: Option<Vec<CardOptionInput>>,
    ) -> Result<CardWithOptions, StoreError> {
        let mut state = self.state.write().await;
        let card = state.cards.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(card_type) = changes.card_type {
            card.card_type = card_type;
        }
        if let Some(question) = changes.question {
            card.question = question;
        }
        card.updated_at = changes.updated_at;
        let card = card.clone();
        if let Some(options) = options {
            state.options.retain(|option| option.card_id != id);
            state
                .options
                .extend(options.into_iter().map(|option| option.into_option(id)));
        }
        Ok(state.with_options(&card))
    }

    async fn delete_card(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.write().await.remove_card(id))
    }
}
