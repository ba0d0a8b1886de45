// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use diesel::prelude::*;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use super::models::*;
use super::schema::{
    card_options, cards, group_admins, group_members, group_packs, groups, packs, user_packs,
    users,
};
use crate::store::{
    CardOptionInput, CardWithOptions, OwnedPack, PackOwner, Store, StoreError,
};

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<AsyncPgConnection>,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

type PackRow = (Pack, Option<Uuid>, Option<Uuid>);

fn into_owned(rows: Vec<PackRow>) -> Vec<OwnedPack> {
    rows.into_iter()
        .map(|(pack, user_id, group_id)| OwnedPack {
            pack,
            user_id,
            group_id,
        })
        .collect()
}

async fn load_owned_pack(
    conn: &mut AsyncPgConnection,
    pack_id: Uuid,
) -> QueryResult<Option<OwnedPack>> {
    let row = packs::table
        .left_join(user_packs::table)
        .left_join(group_packs::table)
        .filter(packs::id.eq(pack_id))
        .select((
            Pack::as_select(),
            user_packs::user_id.nullable(),
            group_packs::group_id.nullable(),
        ))
        .first::<PackRow>(conn)
        .await
        .optional()?;
    Ok(row.map(|(pack, user_id, group_id)| OwnedPack {
        pack,
        user_id,
        group_id,
    }))
}

async fn load_options(conn: &mut AsyncPgConnection, card: &Card) -> QueryResult<Vec<CardOption>> {
    CardOption::belonging_to(card)
        .select(CardOption::as_select())
        .order(card_options::position.asc())
        .load(conn)
        .await
}

async fn insert_options(
    conn: &mut AsyncPgConnection,
    card_id: Uuid,
    options: Vec<CardOptionInput>,
) -> QueryResult<()> {
    let rows: Vec<CardOption> = options
        .into_iter()
        .map(|option| option.into_option(card_id))
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(card_options::table)
            .values(&rows)
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table
            .filter(users::email.eq(email))
            .select(User::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table.count().get_result(&mut conn).await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(users::table
            .select(User::as_select())
            .order((users::last_name.asc(), users::first_name.asc()))
            .load(&mut conn)
            .await?)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> Result<User, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::update(users::table.find(id))
            .set(&changes)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let owned = user_packs::table
                    .filter(user_packs::user_id.eq(id))
                    .select(user_packs::pack_id);
                let packs_removed = diesel::delete(packs::table.filter(packs::id.eq_any(owned)))
                    .execute(conn)
                    .await?;
                let removed = diesel::delete(users::table.find(id)).execute(conn).await?;
                if removed > 0 {
                    tracing::debug!("Removed user {id} and {packs_removed} owned pack(s)");
                }
                Ok(removed > 0)
            }
            .scope_boxed()
        })
        .await
    }

    async fn insert_group(&self, group: NewGroup, creator: Uuid) -> Result<Group, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let inserted = diesel::insert_into(groups::table)
                    .values(&group)
                    .returning(Group::as_returning())
                    .get_result(conn)
                    .await?;
                diesel::insert_into(group_members::table)
                    .values(NewGroupMember {
                        group_id: inserted.id,
                        user_id: creator,
                        is_joined: true,
                    })
                    .execute(conn)
                    .await?;
                diesel::insert_into(group_admins::table)
                    .values(NewGroupAdmin {
                        group_id: inserted.id,
                        user_id: creator,
                    })
                    .execute(conn)
                    .await?;
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }

    async fn group_by_id(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(groups::table
            .find(id)
            .select(Group::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(groups::table
            .filter(groups::name.eq(name))
            .select(Group::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(groups::table
            .select(Group::as_select())
            .order(groups::name.asc())
            .load(&mut conn)
            .await?)
    }

    async fn list_groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(groups::table
            .inner_join(group_members::table)
            .filter(group_members::user_id.eq(user_id))
            .select(Group::as_select())
            .order(groups::name.asc())
            .load(&mut conn)
            .await?)
    }

    async fn update_group(&self, id: Uuid, changes: GroupChanges) -> Result<Group, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::update(groups::table.find(id))
            .set(&changes)
            .returning(Group::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn delete_group(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let owned = group_packs::table
                    .filter(group_packs::group_id.eq(id))
                    .select(group_packs::pack_id);
                let packs_removed = diesel::delete(packs::table.filter(packs::id.eq_any(owned)))
                    .execute(conn)
                    .await?;
                let removed = diesel::delete(groups::table.find(id)).execute(conn).await?;
                diesel::delete(group_members::table.filter(group_members::group_id.eq(id)))
                    .execute(conn)
                    .await?;
                diesel::delete(group_admins::table.filter(group_admins::group_id.eq(id)))
                    .execute(conn)
                    .await?;
                if removed > 0 {
                    tracing::debug!("Removed group {id} and {packs_removed} owned pack(s)");
                }
                Ok(removed > 0)
            }
            .scope_boxed()
        })
        .await
    }

    async fn membership(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(group_members::table
            .find((group_id, user_id))
            .select(GroupMember::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn list_members(&self, group_id: Uuid) -> Result<Vec<(GroupMember, User)>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(group_members::table
            .inner_join(users::table)
            .filter(group_members::group_id.eq(group_id))
            .select((GroupMember::as_select(), User::as_select()))
            .order((users::last_name.asc(), users::first_name.asc()))
            .load(&mut conn)
            .await?)
    }

    async fn insert_member_if_absent(
        &self,
        group_id: Uuid,
        user_id: Uuid,
        is_joined: bool,
    ) -> Result<GroupMember, StoreError> {
        let mut conn = self.conn().await?;
        diesel::insert_into(group_members::table)
            .values(NewGroupMember {
                group_id,
                user_id,
                is_joined,
            })
            .on_conflict((group_members::group_id, group_members::user_id))
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(group_members::table
            .find((group_id, user_id))
            .select(GroupMember::as_select())
            .first(&mut conn)
            .await?)
    }

    async fn mark_joined(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, StoreError> {
        let mut conn = self.conn().await?;
        Ok(diesel::update(group_members::table.find((group_id, user_id)))
            .set(group_members::is_joined.eq(true))
            .returning(GroupMember::as_returning())
            .get_result(&mut conn)
            .await?)
    }

    async fn delete_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed = diesel::delete(group_members::table.find((group_id, user_id)))
            .execute(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupAdmin>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(group_admins::table
            .find((group_id, user_id))
            .select(GroupAdmin::as_select())
            .first(&mut conn)
            .await
            .optional()?)
    }

    async fn insert_group_admin(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupAdmin, StoreError> {
        let mut conn = self.conn().await?;
        diesel::insert_into(group_admins::table)
            .values(NewGroupAdmin { group_id, user_id })
            .on_conflict((group_admins::group_id, group_admins::user_id))
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(group_admins::table
            .find((group_id, user_id))
            .select(GroupAdmin::as_select())
            .first(&mut conn)
            .await?)
    }

    async fn insert_pack(&self, pack: NewPack, owner: PackOwner) -> Result<OwnedPack, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let pack = diesel::insert_into(packs::table)
                    .values(&pack)
                    .returning(Pack::as_returning())
                    .get_result(conn)
                    .await?;
                let (user_id, group_id) = match owner {
                    PackOwner::User(user_id) => {
                        diesel::insert_into(user_packs::table)
                            .values(UserPack {
                                pack_id: pack.id,
                                user_id,
                            })
                            .execute(conn)
                            .await?;
                        (Some(user_id), None)
                    }
                    PackOwner::Group(group_id) => {
                        diesel::insert_into(group_packs::table)
                            .values(GroupPack {
                                pack_id: pack.id,
                                group_id,
                            })
                            .execute(conn)
                            .await?;
                        (None, Some(group_id))
                    }
                };
                Ok(OwnedPack {
                    pack,
                    user_id,
                    group_id,
                })
            }
            .scope_boxed()
        })
        .await
    }

    async fn pack_by_id(&self, id: Uuid) -> Result<Option<OwnedPack>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(load_owned_pack(&mut conn, id).await?)
    }

    async fn list_packs_for_owner(&self, owner: PackOwner) -> Result<Vec<OwnedPack>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = match owner {
            PackOwner::User(user_id) => {
                packs::table
                    .inner_join(user_packs::table)
                    .left_join(group_packs::table)
                    .filter(user_packs::user_id.eq(user_id))
                    .select((
                        Pack::as_select(),
                        user_packs::user_id.nullable(),
                        group_packs::group_id.nullable(),
                    ))
                    .order(packs::name.asc())
                    .load::<PackRow>(&mut conn)
                    .await?
            }
            PackOwner::Group(group_id) => {
                packs::table
                    .inner_join(group_packs::table)
                    .left_join(user_packs::table)
                    .filter(group_packs::group_id.eq(group_id))
                    .select((
                        Pack::as_select(),
                        user_packs::user_id.nullable(),
                        group_packs::group_id.nullable(),
                    ))
                    .order(packs::name.asc())
                    .load::<PackRow>(&mut conn)
                    .await?
            }
        };
        Ok(into_owned(rows))
    }

    async fn list_packs(&self) -> Result<Vec<OwnedPack>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = packs::table
            .left_join(user_packs::table)
            .left_join(group_packs::table)
            .select((
                Pack::as_select(),
                user_packs::user_id.nullable(),
                group_packs::group_id.nullable(),
            ))
            .order(packs::name.asc())
            .load::<PackRow>(&mut conn)
            .await?;
        Ok(into_owned(rows))
    }

    async fn update_pack(&self, id: Uuid, changes: PackChanges) -> Result<OwnedPack, StoreError> {
        let mut conn = self.conn().await?;
        diesel::update(packs::table.find(id))
            .set(&changes)
            .execute(&mut conn)
            .await?;
        load_owned_pack(&mut conn, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_pack(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed = diesel::delete(packs::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn insert_card(
        &self,
        card: NewCard,
        options: Vec<CardOptionInput>,
    ) -> Result<CardWithOptions, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let card = diesel::insert_into(cards::table)
                    .values(&card)
                    .returning(Card::as_returning())
                    .get_result(conn)
                    .await?;
                insert_options(conn, card.id, options).await?;
                let options = load_options(conn, &card).await?;
                Ok(CardWithOptions { card, options })
            }
            .scope_boxed()
        })
        .await
    }

    async fn card_by_id(&self, id: Uuid) -> Result<Option<CardWithOptions>, StoreError> {
        let mut conn = self.conn().await?;
        let card = cards::table
            .find(id)
            .select(Card::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        match card {
            Some(card) => {
                let options = load_options(&mut conn, &card).await?;
                Ok(Some(CardWithOptions { card, options }))
            }
            None => Ok(None),
        }
    }

    async fn list_cards_for_pack(&self, pack_id: Uuid) -> Result<Vec<CardWithOptions>, StoreError> {
        let mut conn = self.conn().await?;
        let card_records = cards::table
            .filter(cards::pack_id.eq(pack_id))
            .select(Card::as_select())
            .order(cards::created_at.asc())
            .load::<Card>(&mut conn)
            .await?;
        let options = CardOption::belonging_to(&card_records)
            .select(CardOption::as_select())
            .order(card_options::position.asc())
            .load::<CardOption>(&mut conn)
            .await?;
        Ok(options
            .grouped_by(&card_records)
            .into_iter()
            .zip(card_records)
            .map(|(options, card)| CardWithOptions { card, options })
            .collect())
    }

    async fn update_card(
        &self,
        id: Uuid,
        changes: CardChanges,
        options: Option<Vec<CardOptionInput>>,
    ) -> Result<CardWithOptions, StoreError> {
        let mut conn = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut conn;
        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                let card = diesel::update(cards::table.find(id))
                    .set(&changes)
                    .returning(Card::as_returning())
                    .get_result(conn)
                    .await?;
                if let Some(options) = options {
                    diesel::delete(card_options::table.filter(card_options::card_id.eq(id)))
                        .execute(conn)
                        .await?;
                    insert_options(conn, id, options).await?;
                }
                let options = load_options(conn, &card).await?;
                Ok(CardWithOptions { card, options })
            }
            .scope_boxed()
        })
        .await
    }

    async fn delete_card(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let removed = diesel::delete(cards::table.find(id))
            .execute(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}
