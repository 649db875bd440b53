//! Caller identity. Authentication happens upstream; the gateway forwards
//! the verified user id and role as headers.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;
use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    Customer,
}

#[derive(Clone, Copy, Debug)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Present for logged-in callers, `None` for guests.
pub struct MaybeUser(pub Option<Caller>);
pub struct AuthUser(pub Caller);
pub struct AdminUser(pub Caller);

fn caller(parts: &Parts) -> Result<Option<Caller>, AppError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else { return Ok(None) };
    let user_id = raw.to_str().ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| AppError::Unauthorized("malformed user id".into()))?;
    let role = parts.headers.get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or_default();
    Ok(Some(Caller { user_id, role }))
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        caller(parts).map(MaybeUser)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        caller(parts)?.map(AuthUser).ok_or_else(|| AppError::Unauthorized("authentication required".into()))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let caller = caller(parts)?.ok_or_else(|| AppError::Unauthorized("authentication required".into()))?;
        if !caller.is_admin() { return Err(AppError::Forbidden("admin role required".into())); }
        Ok(AdminUser(caller))
    }
}
