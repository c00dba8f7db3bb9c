//! Bearer-token identity. Tokens come from the identity provider, signed
//! HS256 with the shared secret; the first authenticated request of a
//! subject creates its user row.

use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use axum::{
	async_trait,
	extract::{ConnectInfo, FromRequestParts},
	http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
	error::AppError,
	state::AppState,
	users::{Identity, Role, User},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
	pub sub: String,
	pub email: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub picture: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub phone: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	pub exp: i64,
}

impl From<Claims> for Identity {
	fn from(claims: Claims) -> Self {
		Identity {
			subject: claims.sub,
			email: claims.email.trim().to_lowercase(),
			name: claims.name,
			image_url: claims.picture,
			phone: claims.phone,
		}
	}
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, AppError> {
	let validation = Validation::new(Algorithm::HS256);
	decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
		.map(|data| data.claims)
		.map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// Signs a token the way the identity provider does. Used by tooling and tests.
pub fn issue_token(identity: &Identity, secret: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
	let now = Utc::now();
	let claims = Claims {
		sub: identity.subject.clone(),
		email: identity.email.clone(),
		name: identity.name.clone(),
		picture: identity.image_url.clone(),
		phone: identity.phone.clone(),
		iat: Some(now.timestamp()),
		exp: (now + ttl).timestamp(),
	};
	encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
	let Some(header) = parts.headers.get(AUTHORIZATION) else {
		return Ok(None);
	};
	let value = header
		.to_str()
		.map_err(|_| AppError::Unauthorized("Bad authorization header".to_string()))?;
	value
		.strip_prefix("Bearer ")
		.map(|token| Some(token.trim()))
		.ok_or_else(|| AppError::Unauthorized("Bad authorization header".to_string()))
}

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
	let Some(token) = bearer_token(parts)? else {
		return Ok(None);
	};
	let identity = Identity::from(verify(token, &state.config.jwt_secret)?);

	let role = if state.config.is_admin_email(&identity.email) {
		Role::Admin
	} else {
		Role::User
	};
	let user = state.store.upsert_user(&identity, role).await?;
	Ok(Some(user))
}

/// The signed-in user, if any. A present but invalid token is still rejected.
pub struct MaybeUser(pub Option<User>);

/// A signed-in user; 401 otherwise.
pub struct CurrentUser(pub User);

/// A signed-in admin; 401 without a user, 403 for everyone else.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
		Ok(MaybeUser(resolve_user(parts, state).await?))
	}
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
		resolve_user(parts, state)
			.await?
			.map(CurrentUser)
			.ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))
	}
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
		let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
		if !user.is_admin() {
			return Err(AppError::Forbidden("Unauthorized access".to_string()));
		}
		Ok(AdminUser(user))
	}
}

/// Client address for rate limiting: first `X-Forwarded-For` hop, else the peer.
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let forwarded = parts
			.headers
			.get("x-forwarded-for")
			.and_then(|v| v.to_str().ok())
			.and_then(|v| v.split(',').next())
			.and_then(|ip| ip.trim().parse::<IpAddr>().ok());

		let peer = || parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip());

		forwarded
			.or_else(peer)
			.map(ClientIp)
			.ok_or_else(|| AppError::bad_request("Unable to determine client address"))
	}
}
