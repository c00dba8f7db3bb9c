use std::{fmt, str::FromStr};

use axum::{extract::State, Json};
use chrono::{DateTime, Datelike, Utc};
use hyper::StatusCode;
use log::{info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::{
	auth::AdminUser,
	error::{AppError, AppResult},
	extract::{JsonBody, MultipartForm, Path, Query},
	images::Upload,
	response::{message, ok},
	state::SharedState,
};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CarStatus {
	Available,
	Unavailable,
	Sold,
}

impl CarStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			CarStatus::Available => "AVAILABLE",
			CarStatus::Unavailable => "UNAVAILABLE",
			CarStatus::Sold => "SOLD",
		}
	}
}

impl fmt::Display for CarStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for CarStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"AVAILABLE" => Ok(CarStatus::Available),
			"UNAVAILABLE" => Ok(CarStatus::Unavailable),
			"SOLD" => Ok(CarStatus::Sold),
			other => Err(format!("Invalid car status: {other}")),
		}
	}
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Car {
	pub id: Uuid,
	pub make: String,
	pub model: String,
	pub year: i32,
	pub price: f64,
	pub mileage: i32,
	pub color: String,
	pub fuel_type: String,
	pub transmission: String,
	pub body_type: String,
	pub seats: Option<i32>,
	pub description: String,
	pub status: CarStatus,
	pub featured: bool,
	pub images: Vec<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A car as shown to a (possibly anonymous) shopper.
#[derive(serde::Serialize, Debug, Clone)]
pub struct CarView {
	#[serde(flatten)]
	pub car: Car,
	pub wishlisted: bool,
}

impl CarView {
	pub fn new(car: Car, wishlisted: bool) -> Self {
		Self { car, wishlisted }
	}
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarPatch {
	pub status: Option<CarStatus>,
	pub featured: Option<bool>,
}

impl CarPatch {
	pub fn apply(&self, car: &mut Car, now: DateTime<Utc>) {
		if let Some(status) = self.status {
			car.status = status;
		}
		if let Some(featured) = self.featured {
			car.featured = featured;
		}
		car.updated_at = now;
	}
}

/// Text parts of the add-car upload, as they arrive.
#[derive(Debug, Default)]
pub struct CarForm {
	make: Option<String>,
	model: Option<String>,
	year: Option<String>,
	price: Option<String>,
	mileage: Option<String>,
	color: Option<String>,
	fuel_type: Option<String>,
	transmission: Option<String>,
	body_type: Option<String>,
	seats: Option<String>,
	description: Option<String>,
	status: Option<String>,
	featured: Option<String>,
}

impl CarForm {
	/// Returns false for field names the form does not know.
	pub fn set(&mut self, name: &str, value: String) -> bool {
		let value = Some(value.trim().trim_matches('"').to_string());
		match name {
			"make" => self.make = value,
			"model" => self.model = value,
			"year" => self.year = value,
			"price" => self.price = value,
			"mileage" => self.mileage = value,
			"color" => self.color = value,
			"fuelType" => self.fuel_type = value,
			"transmission" => self.transmission = value,
			"bodyType" => self.body_type = value,
			"seats" => self.seats = value,
			"description" => self.description = value,
			"status" => self.status = value,
			"featured" => self.featured = value,
			_ => return false,
		}
		true
	}

	/// Validates the form into a car without images.
	pub fn into_car(self, id: Uuid, now: DateTime<Utc>) -> AppResult<Car> {
		let make = required(self.make, "Make")?;
		let model = required(self.model, "Model")?;

		let year: i32 = required(self.year, "Year")?
			.parse()
			.map_err(|_| AppError::bad_request("Year must be a valid year"))?;
		if year < 1900 || year > now.year() + 1 {
			return Err(AppError::bad_request("Year must be a valid year"));
		}

		let price: f64 = required(self.price, "Price")?
			.parse()
			.map_err(|_| AppError::bad_request("Price must be a number"))?;
		if !price.is_finite() || price < 0.0 {
			return Err(AppError::bad_request("Price must be a non-negative number"));
		}

		let mileage: i32 = required(self.mileage, "Mileage")?
			.parse()
			.map_err(|_| AppError::bad_request("Mileage must be a whole number"))?;
		if mileage < 0 {
			return Err(AppError::bad_request("Mileage must be a whole number"));
		}

		let seats = match self.seats.filter(|s| !s.is_empty()) {
			Some(raw) => Some(raw.parse::<i32>().ok().filter(|s| *s > 0).ok_or_else(|| AppError::bad_request("Seats must be a positive number"))?),
			None => None,
		};

		let description = required(self.description, "Description")?;
		if description.chars().count() < 10 {
			return Err(AppError::bad_request("Description must be at least 10 characters"));
		}

		let status = match self.status.filter(|s| !s.is_empty()) {
			Some(raw) => raw.parse().map_err(AppError::BadRequest)?,
			None => CarStatus::Available,
		};

		let featured = match self.featured.filter(|s| !s.is_empty()) {
			Some(raw) => raw.parse().map_err(|_| AppError::bad_request("Featured must be true or false"))?,
			None => false,
		};

		Ok(Car {
			id,
			make,
			model,
			year,
			price,
			mileage,
			color: required(self.color, "Color")?,
			fuel_type: required(self.fuel_type, "Fuel Type")?,
			transmission: required(self.transmission, "Transmission")?,
			body_type: required(self.body_type, "Body Type")?,
			seats,
			description,
			status,
			featured,
			images: Vec::new(),
			created_at: now,
			updated_at: now,
		})
	}
}

fn required(value: Option<String>, label: &str) -> AppResult<String> {
	value.filter(|v| !v.is_empty()).ok_or_else(|| AppError::bad_request(format!("{label} is required")))
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct AdminCarParams {
	search: Option<String>,
}

pub async fn list_cars(State(state): State<SharedState>, _admin: AdminUser, Query(params): Query<AdminCarParams>) -> AppResult<Json<Value>> {
	let search = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
	let cars = state.store.list_cars(search).await?;
	let cars: Vec<CarView> = cars.into_iter().map(|car| CarView::new(car, false)).collect();
	Ok(ok(cars))
}

pub async fn add_car(State(state): State<SharedState>, AdminUser(admin): AdminUser, MultipartForm(mut multipart): MultipartForm) -> AppResult<(StatusCode, Json<Value>)> {
	let mut form = CarForm::default();
	let mut uploads: Vec<Upload> = Vec::new();

	loop {
		match multipart.next_field().await {
			Ok(Some(field)) => {
				let name = field.name().unwrap_or_default().to_string();
				if field.file_name().is_some() || name == "images" {
					let content_type = field.content_type().map(str::to_owned);
					let data = field.bytes().await.map_err(|e| AppError::bad_request(format!("Failed to read image: {e}")))?;
					uploads.push(Upload { content_type, data });
				} else {
					let value = field.text().await.map_err(|e| AppError::bad_request(format!("Failed to read {name}: {e}")))?;
					if !form.set(&name, value) {
						warn!("Ignoring unknown car field {name}");
					}
				}
			}
			Ok(None) => break,
			Err(err) => return Err(AppError::bad_request(format!("Invalid upload: {err}"))),
		}
	}

	let mut car = form.into_car(Uuid::new_v4(), Utc::now())?;

	car.images = state.images.save_car_images(car.id, &uploads).await?;
	if car.images.is_empty() {
		return Err(AppError::bad_request("No valid images were uploaded"));
	}

	if let Err(err) = state.store.insert_car(&car).await {
		state.images.delete_car_images(car.id).await;
		return Err(err.into());
	}

	info!("{} added car {} ({} {} {})", admin.email, car.id, car.year, car.make, car.model);
	Ok((StatusCode::CREATED, ok(CarView::new(car, false))))
}

#[derive(serde::Deserialize, Debug)]
pub struct CarUpdate {
	status: Option<String>,
	featured: Option<bool>,
}

pub async fn update_car(
	State(state): State<SharedState>,
	_admin: AdminUser,
	Path(car_id): Path<Uuid>,
	JsonBody(update): JsonBody<CarUpdate>,
) -> AppResult<Json<Value>> {
	let status = match update.status {
		Some(raw) => Some(raw.parse::<CarStatus>().map_err(AppError::BadRequest)?),
		None => None,
	};
	let patch = CarPatch {
		status,
		featured: update.featured,
	};
	if patch == CarPatch::default() {
		return Err(AppError::bad_request("Nothing to update"));
	}

	let car = state
		.store
		.update_car(car_id, &patch)
		.await?
		.ok_or_else(|| AppError::not_found("Car not found"))?;

	Ok(ok(CarView::new(car, false)))
}

pub async fn delete_car(State(state): State<SharedState>, AdminUser(admin): AdminUser, Path(car_id): Path<Uuid>) -> AppResult<Json<Value>> {
	let car = state
		.store
		.delete_car(car_id)
		.await?
		.ok_or_else(|| AppError::not_found("Car not found"))?;

	state.images.delete_car_images(car.id).await;

	info!("{} deleted car {}", admin.email, car.id);
	Ok(message("Car deleted successfully"))
}

#[cfg(test)]
mod tests {
	use chrono::TimeZone;

	use super::*;

	fn filled_form() -> CarForm {
		let mut form = CarForm::default();
		for (name, value) in [
			("make", "Toyota"),
			("model", "Corolla"),
			("year", "2020"),
			("price", "15000.50"),
			("mileage", "42000"),
			("color", "Red"),
			("fuelType", "Petrol"),
			("transmission", "Automatic"),
			("bodyType", "Sedan"),
			("description", "One owner, full service history."),
		] {
			assert!(form.set(name, value.to_string()));
		}
		form
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
	}

	#[test]
	fn valid_form_defaults_status_and_featured() {
		let car = filled_form().into_car(Uuid::new_v4(), now()).unwrap();
		assert_eq!(car.status, CarStatus::Available);
		assert!(!car.featured);
		assert_eq!(car.seats, None);
		assert_eq!(car.price, 15000.50);
		assert!(car.images.is_empty());
	}

	#[test]
	fn quoted_values_are_unwrapped() {
		let mut form = filled_form();
		form.set("status", "\"SOLD\"".to_string());
		form.set("featured", "true".to_string());
		form.set("seats", "5".to_string());
		let car = form.into_car(Uuid::new_v4(), now()).unwrap();
		assert_eq!(car.status, CarStatus::Sold);
		assert!(car.featured);
		assert_eq!(car.seats, Some(5));
	}

	#[test]
	fn year_must_be_between_1900_and_next_year() {
		for year in ["1899", "2027", "abcd"] {
			let mut form = filled_form();
			form.set("year", year.to_string());
			let err = form.into_car(Uuid::new_v4(), now()).unwrap_err();
			assert_eq!(err.to_string(), "Year must be a valid year");
		}

		let mut form = filled_form();
		form.set("year", "2026".to_string());
		assert!(form.into_car(Uuid::new_v4(), now()).is_ok());
	}

	#[test]
	fn short_description_and_missing_fields_are_rejected() {
		let mut form = filled_form();
		form.set("description", "too short".to_string());
		assert_eq!(
			form.into_car(Uuid::new_v4(), now()).unwrap_err().to_string(),
			"Description must be at least 10 characters"
		);

		let mut form = filled_form();
		form.set("make", "  ".to_string());
		assert_eq!(form.into_car(Uuid::new_v4(), now()).unwrap_err().to_string(), "Make is required");
	}

	#[test]
	fn unknown_fields_are_reported() {
		let mut form = CarForm::default();
		assert!(!form.set("vin", "123".to_string()));
	}

	#[test]
	fn patch_touches_only_given_fields() {
		let mut car = filled_form().into_car(Uuid::new_v4(), now()).unwrap();
		let later = now() + chrono::Duration::hours(1);
		CarPatch {
			status: None,
			featured: Some(true),
		}
		.apply(&mut car, later);
		assert_eq!(car.status, CarStatus::Available);
		assert!(car.featured);
		assert_eq!(car.updated_at, later);
	}

	#[test]
	fn view_flattens_car_fields() {
		let car = filled_form().into_car(Uuid::nil(), now()).unwrap();
		let json = serde_json::to_value(CarView::new(car, true)).unwrap();
		assert_eq!(json["fuelType"], "Petrol");
		assert_eq!(json["status"], "AVAILABLE");
		assert_eq!(json["wishlisted"], true);
	}
}
