// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::{ApiError, ApiResult};

pub mod access;
pub mod cards;
pub mod groups;
pub mod packs;
pub mod users;

/// Fails with `BadRequest` unless `value` has between `min` and `max` characters.
pub(crate) fn check_length(field: &str, value: &str, min: usize, max: usize) -> ApiResult<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters long"
        )));
    }
    Ok(())
}

pub(crate) fn check_max_length(field: &str, value: &str, max: usize) -> ApiResult<()> {
    if value.chars().count() > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be at most {max} characters long"
        )));
    }
    Ok(())
}
