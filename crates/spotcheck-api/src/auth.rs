use std::hash::{Hash, Hasher};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::AppError;

/// Header carrying the caller's identity, set by the upstream identity provider.
pub const USER_HEADER: &str = "x-spotcheck-user";

const MAX_USER_ID_LEN: usize = 128;

/// A request that carries a user identity. Rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Optional identity for read routes; ghost locations stay hidden without one.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub user_id: Option<String>,
}

impl Viewer {
    pub fn as_deref(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = extract_user_id(&parts.headers)?
            .ok_or_else(|| AppError::unauthorized(format!("Missing {USER_HEADER} header")))?;
        Ok(Self {
            user_id: user_id.to_string(),
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Viewer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = extract_user_id(&parts.headers)?.map(str::to_string);
        Ok(Self { user_id })
    }
}

/// Read the identity header. Absent or blank yields `None`; malformed is an error.
pub fn extract_user_id(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(USER_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized(format!("{USER_HEADER} header is not valid ASCII")))?
        .trim();

    if value.is_empty() {
        return Ok(None);
    }
    if value.len() > MAX_USER_ID_LEN {
        return Err(AppError::unauthorized(format!(
            "{USER_HEADER} header exceeds {MAX_USER_ID_LEN} characters"
        )));
    }
    Ok(Some(value))
}

/// Stable, non-reversible stand-in for a user id in logs.
pub fn user_fingerprint(user_id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish()
}
