use std::{fmt, str::FromStr};

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::{
	auth::{AdminUser, CurrentUser},
	error::{AppError, AppResult},
	extract::{JsonBody, Path},
	response::ok,
	state::SharedState,
};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
	User,
	Admin,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::User => "USER",
			Role::Admin => "ADMIN",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"USER" => Ok(Role::User),
			"ADMIN" => Ok(Role::Admin),
			other => Err(format!("Invalid role: {other}")),
		}
	}
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: Uuid,
	#[serde(skip_serializing)]
	pub subject: String,
	pub email: String,
	pub name: Option<String>,
	pub image_url: Option<String>,
	pub phone: Option<String>,
	pub role: Role,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl User {
	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}

	pub fn summary(&self) -> UserSummary {
		UserSummary {
			id: self.id,
			name: self.name.clone(),
			email: self.email.clone(),
			image_url: self.image_url.clone(),
			phone: self.phone.clone(),
		}
	}
}

/// The public slice of a user shown next to admin booking rows.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
	pub id: Uuid,
	pub name: Option<String>,
	pub email: String,
	pub image_url: Option<String>,
	pub phone: Option<String>,
}

/// What the identity provider tells us about the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
	pub subject: String,
	pub email: String,
	pub name: Option<String>,
	pub image_url: Option<String>,
	pub phone: Option<String>,
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<Value> {
	ok(user)
}

pub async fn list_users(State(state): State<SharedState>, _admin: AdminUser) -> AppResult<Json<Value>> {
	let users = state.store.list_users().await?;
	Ok(ok(users))
}

#[derive(serde::Deserialize, Debug)]
pub struct RoleChange {
	role: String,
}

pub async fn update_user_role(
	State(state): State<SharedState>,
	AdminUser(admin): AdminUser,
	Path(user_id): Path<Uuid>,
	JsonBody(change): JsonBody<RoleChange>,
) -> AppResult<Json<Value>> {
	let role: Role = change.role.parse().map_err(AppError::BadRequest)?;

	if admin.id == user_id && role != Role::Admin {
		return Err(AppError::bad_request("You cannot remove your own admin role"));
	}

	let user = state
		.store
		.set_user_role(user_id, role)
		.await?
		.ok_or_else(|| AppError::not_found("User not found"))?;

	info!("{} set role of {} to {}", admin.email, user.email, role);
	Ok(ok(user))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn roles_round_trip_through_their_column_text() {
		for role in [Role::User, Role::Admin] {
			assert_eq!(role.as_str().parse::<Role>(), Ok(role));
		}
		assert!("admin".parse::<Role>().is_err());
		assert_eq!(serde_json::to_value(Role::Admin).unwrap(), "ADMIN");
	}
}
