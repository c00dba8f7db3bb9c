use axum::{extract::State, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use super::cars::CarView;
use crate::{
	auth::CurrentUser,
	error::{AppError, AppResult},
	extract::Path,
	response::ok,
	state::SharedState,
};

pub async fn toggle_saved_car(State(state): State<SharedState>, CurrentUser(user): CurrentUser, Path(car_id): Path<Uuid>) -> AppResult<Json<Value>> {
	if state.store.find_car(car_id).await?.is_none() {
		return Err(AppError::not_found("Car not found"));
	}

	let saved = state.store.toggle_saved_car(user.id, car_id).await?;
	let message = if saved {
		"Car added to favorites"
	} else {
		"Car removed from favorites"
	};

	Ok(Json(json!({ "success": true, "saved": saved, "message": message })))
}

pub async fn saved_cars(State(state): State<SharedState>, CurrentUser(user): CurrentUser) -> AppResult<Json<Value>> {
	let cars: Vec<CarView> = state
		.store
		.saved_cars(user.id)
		.await?
		.into_iter()
		.map(|car| CarView::new(car, true))
		.collect();
	Ok(ok(cars))
}
