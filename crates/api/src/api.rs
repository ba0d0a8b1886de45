// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::db::models::User;
use crate::error::{ApiError, ApiResult};
use crate::store::Store;

pub mod auth;
pub mod handlers;
pub mod router;

#[derive(Clone)]
pub struct BaseContext {
    pub store: Arc<dyn Store>,
    pub keypair: ed25519_dalek::SigningKey,
    pub access_token_ttl: Duration,
    pub first_user_admin: bool,
}

pub struct Context {
    base: BaseContext,
    user: Option<AuthenticatedUser>,
}

/// Identity carried by a validated bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

impl Context {
    pub fn new(base: BaseContext, user_details: Option<AuthenticatedUser>) -> Self {
        Self {
            base,
            user: user_details,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.base.store.as_ref()
    }

    pub fn require_authentication(&self) -> ApiResult<AuthenticatedUser> {
        if let Some(user) = &self.user {
            Ok(user.clone())
        } else {
            Err(ApiError::Unauthorized("Authentication required".to_string()))
        }
    }

    /// Resolves the token subject against the user store.
    pub async fn current_user(&self) -> ApiResult<User> {
        let authenticated = self.require_authentication()?;
        match self.store().user_by_id(authenticated.user_id).await? {
            Some(user) => Ok(user),
            None => {
                tracing::debug!(user_id = %authenticated.user_id, "Token subject no longer exists");
                Err(ApiError::Unauthorized(
                    "Authentication required".to_string(),
                ))
            }
        }
    }

    pub fn get_signing_key(&self) -> &ed25519_dalek::SigningKey {
        &self.base.keypair
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.base.access_token_ttl
    }

    pub fn first_user_admin(&self) -> bool {
        self.base.first_user_admin
    }
}
