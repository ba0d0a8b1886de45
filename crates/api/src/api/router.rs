// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Body, Bytes},
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    api::{
        AuthenticatedUser, BaseContext, Context,
        auth::parse_access_token,
        handlers::{cards, groups, packs, users},
    },
    error::{ApiError, ApiResult},
};

/// Upper bound on a buffered request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Decoded query string.
#[derive(Debug, Default)]
struct Query(Vec<(String, String)>);

impl Query {
    fn parse(raw: Option<&str>) -> ApiResult<Self> {
        let mut pairs = Vec::new();
        for pair in raw.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            pairs.push((decode(key)?, decode(value)?));
        }
        Ok(Self(pairs))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn uuid(&self, key: &str) -> ApiResult<Option<Uuid>> {
        self.get(key).map(parse_id).transpose()
    }

    fn require_uuid(&self, key: &str) -> ApiResult<Uuid> {
        self.uuid(key)?
            .ok_or_else(|| ApiError::BadRequest(format!("Query parameter {key} is required")))
    }

    fn require_bool(&self, key: &str) -> ApiResult<bool> {
        match self.get(key) {
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ApiError::BadRequest(format!(
                "Query parameter {key} must be true or false (got '{other}')"
            ))),
            None => Err(ApiError::BadRequest(format!(
                "Query parameter {key} is required"
            ))),
        }
    }
}

fn decode(raw: &str) -> ApiResult<String> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ApiError::BadRequest("Malformed query string".to_string()))
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("Validation failed ('{raw}' is not a uuid)")))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> ApiResult<Response<String>> {
    let body = serde_json::to_string(value)
        .map_err(|e| ApiError::Internal(format!("failed to serialize response: {e}")))?;
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(resp)
}

fn ok<T: Serialize>(value: T) -> ApiResult<Response<String>> {
    json(StatusCode::OK, &value)
}

fn created<T: Serialize>(value: T) -> ApiResult<Response<String>> {
    json(StatusCode::CREATED, &value)
}

fn no_content() -> Response<String> {
    let mut resp = Response::new(String::new());
    *resp.status_mut() = StatusCode::NO_CONTENT;
    resp
}

fn error_response(err: &ApiError) -> Response<String> {
    let mut resp = Response::new(err.body());
    *resp.status_mut() = err.status();
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

/// Extracts the user from a valid `Authorization: Bearer` access token.
pub fn authenticate(base: &BaseContext, headers: &HeaderMap) -> Option<AuthenticatedUser> {
    let token = headers.get(AUTHORIZATION).and_then(|auth_header| {
        let auth_str = auth_header.to_str().ok()?;
        auth_str.strip_prefix("Bearer ").map(str::to_string)
    })?;
    match parse_access_token(&token, &base.keypair.verifying_key()) {
        Ok(jwt) => Some(AuthenticatedUser { user_id: jwt.sub }),
        Err(e) => {
            tracing::debug!("Rejected bearer token: {e}");
            None
        }
    }
}

/// Serves one request.
pub async fn handle<B>(base: BaseContext, req: Request<B>) -> Response<String>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::OPTIONS {
        return no_content();
    }

    let ctx = Context::new(base.clone(), authenticate(&base, req.headers()));
    let query = Query::parse(req.uri().query());
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(ApiError::PayloadTooLarge(MAX_BODY_BYTES)),
        Err(e) => Err(ApiError::BadRequest(format!("Failed to read request body: {e}"))),
    };

    let result = match (query, body) {
        (Ok(query), Ok(body)) => route(&ctx, &method, &path, &query, &body).await,
        (Err(e), _) | (_, Err(e)) => Err(e),
    };
    let resp = match result {
        Ok(resp) => resp,
        Err(err) => {
            if let ApiError::Internal(detail) = &err {
                tracing::error!(%method, %path, "Request failed: {detail}");
            }
            error_response(&err)
        }
    };
    tracing::info!(%method, %path, status = resp.status().as_u16(), "Handled request");
    resp
}

async fn route(
    ctx: &Context,
    method: &Method,
    path: &str,
    query: &Query,
    body: &Bytes,
) -> ApiResult<Response<String>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match (method, segments.as_slice()) {
        // Users
        (&Method::POST, ["api", "login"]) => ok(users::login(ctx, parse_body(body)?).await?),
        (&Method::POST, ["api", "user"]) => created(users::register(ctx, parse_body(body)?).await?),
        (&Method::GET, ["api", "user", "whoAmI"]) => ok(users::who_am_i(ctx).await?),
        (&Method::GET, ["api", "user"]) => {
            ok(users::get_user(ctx, query.uuid("id")?).await?)
        }
        (&Method::PUT, ["api", "user"]) => {
            let id = query.uuid("id")?;
            ok(users::update_user(ctx, id, parse_body(body)?).await?)
        }
        (&Method::DELETE, ["api", "user"]) => {
            users::delete_user(ctx, query.uuid("id")?).await?;
            Ok(no_content())
        }
        (&Method::PATCH, ["api", "user", "newPassword"]) => {
            let id = query.uuid("id")?;
            ok(users::change_password(ctx, id, parse_body(body)?).await?)
        }
        (&Method::PATCH, ["api", "user", id]) => {
            let id = parse_id(id)?;
            ok(users::set_admin(ctx, id, query.require_bool("makeAdmin")?).await?)
        }
        (&Method::GET, ["api", "users"]) => ok(users::list_users(ctx).await?),

        // Groups
        (&Method::POST, ["api", "group"]) => {
            created(groups::create_group(ctx, parse_body(body)?).await?)
        }
        (&Method::GET, ["api", "groups"]) => ok(groups::list_groups(ctx).await?),
        (&Method::GET, ["api", "group", id]) => ok(groups::get_group(ctx, parse_id(id)?).await?),
        (&Method::PUT, ["api", "group", id]) => {
            let id = parse_id(id)?;
            ok(groups::update_group(ctx, id, parse_body(body)?).await?)
        }
        (&Method::DELETE, ["api", "group", id]) => {
            groups::delete_group(ctx, parse_id(id)?).await?;
            Ok(no_content())
        }
        (&Method::GET, ["api", "group", id, "users"]) => {
            ok(groups::list_members(ctx, parse_id(id)?).await?)
        }
        (&Method::POST, ["api", "group", id, "users"]) => {
            let id = parse_id(id)?;
            created(groups::invite_members(ctx, id, parse_body(body)?).await?)
        }
        (&Method::PATCH, ["api", "group", id, "join"]) => {
            ok(groups::accept_invitation(ctx, parse_id(id)?).await?)
        }
        (&Method::DELETE, ["api", "group", id, "leave"]) => {
            let id = parse_id(id)?;
            groups::leave_group(ctx, id, query.uuid("userId")?).await?;
            Ok(no_content())
        }
        (&Method::POST, ["api", "group", id, "admins"]) => {
            let id = parse_id(id)?;
            created(groups::grant_group_admin(ctx, id, query.require_uuid("userId")?).await?)
        }

        // Packs
        (&Method::POST, ["api", "pack"]) => {
            let group_id = query.uuid("groupId")?;
            created(packs::create_pack(ctx, group_id, parse_body(body)?).await?)
        }
        (&Method::GET, ["api", "packs"]) => {
            let group_id = query.uuid("groupId")?;
            ok(packs::list_packs(ctx, group_id, query.uuid("userId")?).await?)
        }
        (&Method::GET, ["api", "packs", "all"]) => {
            let filter = match query.get("type") {
                Some(raw) => raw.parse::<packs::PackFilter>()?,
                None => packs::PackFilter::default(),
            };
            ok(packs::list_all_packs(ctx, filter).await?)
        }
        (&Method::GET, ["api", "pack", id]) => ok(packs::get_pack(ctx, parse_id(id)?).await?),
        (&Method::PUT, ["api", "pack", id]) => {
            let id = parse_id(id)?;
            ok(packs::update_pack(ctx, id, parse_body(body)?).await?)
        }
        (&Method::DELETE, ["api", "pack", id]) => {
            packs::delete_pack(ctx, parse_id(id)?).await?;
            Ok(no_content())
        }

        // Cards
        (&Method::POST, ["api", "card"]) => created(cards::create_card(ctx, parse_body(body)?).await?),
        (&Method::GET, ["api", "cards", "pack", id]) => {
            ok(cards::list_cards_for_pack(ctx, parse_id(id)?).await?)
        }
        (&Method::GET, ["api", "card", id]) => ok(cards::get_card(ctx, parse_id(id)?).await?),
        (&Method::PUT, ["api", "card", id]) => {
            let id = parse_id(id)?;
            ok(cards::update_card(ctx, id, parse_body(body)?).await?)
        }
        (&Method::DELETE, ["api", "card", id]) => {
            cards::delete_card(ctx, parse_id(id)?).await?;
            Ok(no_content())
        }

        _ => Err(ApiError::NotFound(format!("Cannot {method} {path}"))),
    }
}
