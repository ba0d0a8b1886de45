// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::associations::Identifiable;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::*;

#[derive(diesel_derive_enum::DbEnum, Debug, PartialEq, Eq, Deserialize, Serialize, Clone, Copy)]
#[DbValueStyle = "kebab-case"]
#[ExistingTypePath = "crate::db::schema::sql_types::CardType"]
#[serde(rename_all = "kebab-case")]
pub enum CardType {
    MultipleChoice,
    Checkbox,
    TrueFalse,
    FillBlank,
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CardType::MultipleChoice => "multiple-choice",
            CardType::Checkbox => "checkbox",
            CardType::TrueFalse => "true-false",
            CardType::FillBlank => "fill-blank",
        })
    }
}

/* =========================
 * USERS
 * ========================= */

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Fields left as `None` are not touched by the update.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = users)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_admin: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl UserChanges {
    pub fn new() -> Self {
        Self {
            first_name: None,
            last_name: None,
            email: None,
            password_hash: None,
            is_admin: None,
            updated_at: Utc::now(),
        }
    }
}

/* =========================
 * GROUPS
 * ========================= */

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Option<Uuid>,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_by: Option<Uuid>,
    pub created_by_name: String,
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = groups)]
pub struct GroupChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

/* =========================
 * GROUP MEMBERSHIP
 * ========================= */

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = group_members)]
#[diesel(primary_key(group_id, user_id))]
#[diesel(belongs_to(Group))]
#[diesel(belongs_to(User))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub is_joined: bool,
    pub invited_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = group_members)]
pub struct NewGroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub is_joined: bool,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = group_admins)]
#[diesel(primary_key(group_id, user_id))]
#[diesel(belongs_to(Group))]
#[diesel(belongs_to(User))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupAdmin {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = group_admins)]
pub struct NewGroupAdmin {
    pub group_id: Uuid,
    pub user_id: Uuid,
}

/* =========================
 * PACKS
 * ========================= */

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = packs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Pack {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub timed: bool,
    pub total_time: i32,
    pub live_results: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = packs)]
pub struct NewPack {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub timed: bool,
    pub total_time: i32,
    pub live_results: bool,
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = packs)]
pub struct PackChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub timed: Option<bool>,
    pub total_time: Option<i32>,
    pub live_results: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = user_packs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserPack {
    pub pack_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Insertable, Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = group_packs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupPack {
    pub pack_id: Uuid,
    pub group_id: Uuid,
}

/* =========================
 * CARDS
 * ========================= */

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = cards)]
#[diesel(belongs_to(Pack))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Card {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub card_type: CardType,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = cards)]
pub struct NewCard {
    pub id: Uuid,
    pub pack_id: Uuid,
    pub card_type: CardType,
    pub question: String,
}

#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = cards)]
pub struct CardChanges {
    pub card_type: Option<CardType>,
    pub question: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Insertable, Debug, Clone)]
#[diesel(table_name = card_options)]
#[diesel(belongs_to(Card))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CardOption {
    pub id: Uuid,
    pub card_id: Uuid,
    pub text: String,
    pub is_correct: bool,
    pub position: i32,
}
