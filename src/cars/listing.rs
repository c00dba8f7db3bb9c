use std::collections::{BTreeSet, HashSet};

use axum::{extract::State, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
	cars::CarView,
	query::{CarQuery, ListingParams, Pagination},
};
use crate::{
	auth::MaybeUser,
	error::{AppError, AppResult},
	extract::{Path, Query},
	response::ok,
	settings::Dealership,
	state::SharedState,
	test_drive::booking::UserTestDrive,
};

/// Price bounds reported when there is nothing to aggregate.
pub const DEFAULT_PRICE_RANGE: (f64, f64) = (0.0, 1_000_000.0);

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct PriceRange {
	pub min: f64,
	pub max: f64,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarFilters {
	pub makes: Vec<String>,
	pub body_types: Vec<String>,
	pub fuel_types: Vec<String>,
	pub transmissions: Vec<String>,
	pub price_range: PriceRange,
}

impl CarFilters {
	pub fn price_range(min: Option<f64>, max: Option<f64>) -> PriceRange {
		PriceRange {
			min: min.unwrap_or(DEFAULT_PRICE_RANGE.0),
			max: max.unwrap_or(DEFAULT_PRICE_RANGE.1),
		}
	}
}

pub async fn get_cars(State(state): State<SharedState>, MaybeUser(user): MaybeUser, Query(params): Query<ListingParams>) -> AppResult<Json<Value>> {
	let query = CarQuery::from(params);
	let page = state.store.search_cars(&query).await?;

	let saved = match &user {
		Some(user) => state.store.saved_car_ids(user.id).await?,
		None => HashSet::new(),
	};

	let cars: Vec<CarView> = page
		.cars
		.into_iter()
		.map(|car| {
			let wishlisted = saved.contains(&car.id);
			CarView::new(car, wishlisted)
		})
		.collect();

	Ok(Json(json!({
		"success": true,
		"data": cars,
		"pagination": Pagination::new(page.total, query.page, query.limit),
	})))
}

pub async fn car_filters(State(state): State<SharedState>) -> AppResult<Json<Value>> {
	let filters = state.store.car_filters().await?;
	Ok(ok(filters))
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct FeaturedParams {
	limit: Option<i64>,
}

pub async fn featured_cars(State(state): State<SharedState>, Query(params): Query<FeaturedParams>) -> AppResult<Json<Value>> {
	let limit = params.limit.unwrap_or(3).clamp(1, 20);
	let cars: Vec<CarView> = state
		.store
		.featured_cars(limit)
		.await?
		.into_iter()
		.map(|car| CarView::new(car, false))
		.collect();
	Ok(ok(cars))
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct SuggestParams {
	q: Option<String>,
}

pub async fn suggest(State(state): State<SharedState>, Query(params): Query<SuggestParams>) -> AppResult<Json<Value>> {
	let keyword = params.q.unwrap_or_default();
	let names = state.store.listing_names().await?;
	Ok(ok(suggestions(&names, &keyword)))
}

/// Makes and models close to `keyword`: containing it, or within two edits.
pub fn suggestions(names: &[(String, String)], keyword: &str) -> Vec<String> {
	let keyword = keyword.trim().to_lowercase();
	if keyword.is_empty() {
		return Vec::new();
	}

	let mut result = BTreeSet::new();
	for (make, model) in names {
		for candidate in [make, model] {
			let lower = candidate.to_lowercase();
			if lower.contains(&keyword) || levenshtein::levenshtein(&lower, &keyword) <= 2 {
				result.insert(candidate.clone());
			}
		}
	}
	result.into_iter().collect()
}

#[derive(serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TestDriveInfo {
	user_test_drive: Option<UserTestDrive>,
	dealership: Option<Dealership>,
}

#[derive(serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CarDetail {
	#[serde(flatten)]
	view: CarView,
	test_drive_info: TestDriveInfo,
}

pub async fn get_car(State(state): State<SharedState>, MaybeUser(user): MaybeUser, Path(car_id): Path<Uuid>) -> AppResult<Json<Value>> {
	let car = state
		.store
		.find_car(car_id)
		.await?
		.ok_or_else(|| AppError::not_found("Car not found"))?;

	let (wishlisted, user_test_drive) = match &user {
		Some(user) => {
			let wishlisted = state.store.saved_car_ids(user.id).await?.contains(&car.id);
			let booking = state.store.latest_user_booking(car.id, user.id).await?;
			(wishlisted, booking.map(UserTestDrive::from))
		}
		None => (false, None),
	};

	let dealership = state.store.dealership().await?;

	Ok(ok(CarDetail {
		view: CarView::new(car, wishlisted),
		test_drive_info: TestDriveInfo {
			user_test_drive,
			dealership,
		},
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn names() -> Vec<(String, String)> {
		vec![
			("Toyota".into(), "Corolla".into()),
			("Toyota".into(), "Camry".into()),
			("Honda".into(), "Civic".into()),
		]
	}

	#[test]
	fn typos_within_two_edits_are_suggested() {
		assert_eq!(suggestions(&names(), "toyta"), vec!["Toyota"]);
		assert_eq!(suggestions(&names(), "civc"), vec!["Civic"]);
	}

	#[test]
	fn substrings_are_suggested_once() {
		assert_eq!(suggestions(&names(), "o"), vec!["Corolla", "Honda", "Toyota"]);
	}

	#[test]
	fn blank_keyword_suggests_nothing() {
		assert!(suggestions(&names(), "   ").is_empty());
	}

	#[test]
	fn empty_inventory_gets_default_price_range() {
		assert_eq!(CarFilters::price_range(None, None), PriceRange { min: 0.0, max: 1_000_000.0 });
		assert_eq!(CarFilters::price_range(Some(5.0), Some(9.0)), PriceRange { min: 5.0, max: 9.0 });
	}
}
