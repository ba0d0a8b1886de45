// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHasher, SaltString},
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{
        Context,
        auth::{ACCESS_AUDIENCE, AccessJwtPayload, JwtPayload, generate_jwt},
        handlers::check_length,
    },
    db::models::{NewUser, User, UserChanges},
    error::{ApiError, ApiResult},
    normalize::{is_plausible_email, make_name, normalize_email},
};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct TokenView {
    pub access_token: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    fn validate(&self) -> ApiResult<()> {
        check_length("firstName", &self.first_name, 1, 30)?;
        check_length("lastName", &self.last_name, 1, 30)?;
        check_email(&self.email)?;
        check_password(&self.password)
    }
}

#[derive(Deserialize, Debug)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UpdateUserInput {
    fn validate(&self) -> ApiResult<()> {
        if let Some(first_name) = &self.first_name {
            check_length("firstName", first_name, 3, 30)?;
        }
        if let Some(last_name) = &self.last_name {
            check_length("lastName", last_name, 3, 30)?;
        }
        if let Some(email) = &self.email {
            check_email(email)?;
        }
        Ok(())
    }

    fn into_changes(self) -> UserChanges {
        UserChanges {
            first_name: self.first_name.as_deref().map(make_name),
            last_name: self.last_name.as_deref().map(make_name),
            email: self.email.as_deref().map(normalize_email),
            ..UserChanges::new()
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordInput {
    pub old_password: Option<String>,
    pub new_password: String,
}

fn check_email(email: &str) -> ApiResult<()> {
    if is_plausible_email(&normalize_email(email)) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("email must be an email".to_string()))
    }
}

fn check_password(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if !(6..=30).contains(&len) {
        return Err(ApiError::BadRequest(
            "password must be between 6 and 30 characters long".to_string(),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

fn password_matches(user: &User, password: &str) -> ApiResult<bool> {
    let parsed_hash = argon2::PasswordHash::new(&user.password_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn require_self_or_admin(requester: &User, target: Uuid) -> ApiResult<()> {
    if requester.is_admin || requester.id == target {
        Ok(())
    } else {
        tracing::debug!(requester = %requester.id, %target, "User may not act on another user");
        Err(ApiError::Forbidden)
    }
}

async fn load_user(ctx: &Context, id: Uuid) -> ApiResult<User> {
    ctx.store()
        .user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))
}

pub async fn register(ctx: &Context, input: RegisterInput) -> ApiResult<UserView> {
    input.validate()?;
    let email = normalize_email(&input.email);
    if ctx.store().user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "A user with email {email} already exists"
        )));
    }

    let is_admin = ctx.first_user_admin() && ctx.store().count_users().await? == 0;

    let new_user = NewUser {
        id: Uuid::now_v7(),
        first_name: make_name(&input.first_name),
        last_name: make_name(&input.last_name),
        email,
        password_hash: hash_password(&input.password)?,
        is_admin,
    };
    let user = ctx.store().insert_user(new_user).await?;
    tracing::info!(user_id = %user.id, is_admin, "Registered user");
    Ok(UserView::from(&user))
}

pub async fn login(ctx: &Context, input: LoginInput) -> ApiResult<TokenView> {
    let email = normalize_email(&input.email);
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let user = ctx.store().user_by_email(&email).await?.ok_or_else(invalid)?;
    if !password_matches(&user, &input.password)? {
        return Err(invalid());
    }

    let payload = JwtPayload::new_with_duration(
        user.id,
        vec![ACCESS_AUDIENCE.to_string()],
        AccessJwtPayload {
            email: user.email.clone(),
        },
        ctx.access_token_ttl(),
    );
    let access_token = generate_jwt(&payload, ctx.get_signing_key())?;
    tracing::debug!(user_id = %user.id, "Issued access token");
    Ok(TokenView { access_token })
}

pub async fn who_am_i(ctx: &Context) -> ApiResult<UserView> {
    let user = ctx.current_user().await?;
    Ok(UserView::from(&user))
}

/// Without an `id` the requester is returned.
pub async fn get_user(ctx: &Context, id: Option<Uuid>) -> ApiResult<UserView> {
    let requester = ctx.current_user().await?;
    let id = id.unwrap_or(requester.id);
    require_self_or_admin(&requester, id)?;
    let user = load_user(ctx, id).await?;
    Ok(UserView::from(&user))
}

pub async fn list_users(ctx: &Context) -> ApiResult<Vec<UserView>> {
    let requester = ctx.current_user().await?;
    if !requester.is_admin {
        return Err(ApiError::Forbidden);
    }
    let users = ctx.store().list_users().await?;
    Ok(users.iter().map(UserView::from).collect())
}

pub async fn update_user(
    ctx: &Context,
    id: Option<Uuid>,
    input: UpdateUserInput,
) -> ApiResult<UserView> {
    let requester = ctx.current_user().await?;
    let id = id.unwrap_or(requester.id);
    require_self_or_admin(&requester, id)?;
    input.validate()?;
    load_user(ctx, id).await?;

    let changes = input.into_changes();
    if let Some(email) = &changes.email {
        if let Some(existing) = ctx.store().user_by_email(email).await? {
            if existing.id != id {
                return Err(ApiError::Conflict(format!(
                    "A user with email {email} already exists"
                )));
            }
        }
    }
    let user = ctx.store().update_user(id, changes).await?;
    Ok(UserView::from(&user))
}

/// The old password is required unless an admin resets someone else's password.
pub async fn change_password(
    ctx: &Context,
    id: Option<Uuid>,
    input: ChangePasswordInput,
) -> ApiResult<UserView> {
    let requester = ctx.current_user().await?;
    let id = id.unwrap_or(requester.id);
    require_self_or_admin(&requester, id)?;
    check_password(&input.new_password)?;
    let user = load_user(ctx, id).await?;

    let admin_reset = requester.is_admin && requester.id != id;
    if !admin_reset {
        let old_password = input.old_password.as_deref().ok_or_else(|| {
            ApiError::BadRequest("oldPassword must be provided".to_string())
        })?;
        if !password_matches(&user, old_password)? {
            return Err(ApiError::Conflict(
                "The old password does not match".to_string(),
            ));
        }
    }

    let changes = UserChanges {
        password_hash: Some(hash_password(&input.new_password)?),
        ..UserChanges::new()
    };
    let user = ctx.store().update_user(id, changes).await?;
    tracing::info!(user_id = %id, admin_reset, "Password changed");
    Ok(UserView::from(&user))
}

pub async fn set_admin(ctx: &Context, id: Uuid, make_admin: bool) -> ApiResult<UserView> {
    let requester = ctx.current_user().await?;
    if !requester.is_admin {
        return Err(ApiError::Forbidden);
    }
    load_user(ctx, id).await?;
    let changes = UserChanges {
        is_admin: Some(make_admin),
        ..UserChanges::new()
    };
    let user = ctx.store().update_user(id, changes).await?;
    tracing::info!(user_id = %id, by = %requester.id, is_admin = make_admin, "Admin flag changed");
    Ok(UserView::from(&user))
}

/// Deletes the user together with their personal packs.
pub async fn delete_user(ctx: &Context, id: Option<Uuid>) -> ApiResult<()> {
    let requester = ctx.current_user().await?;
    let id = id.unwrap_or(requester.id);
    require_self_or_admin(&requester, id)?;
    if !ctx.store().delete_user(id).await? {
        return Err(ApiError::NotFound(format!("User {id} not found")));
    }
    tracing::info!(user_id = %id, "Deleted user");
    Ok(())
}
