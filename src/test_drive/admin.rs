use std::collections::HashMap;

use axum::{extract::State, Json};
use log::info;
use serde_json::Value;
use uuid::Uuid;

use super::booking::{BookingStatus, TestDriveBooking};
use crate::{
	auth::AdminUser,
	cars::{
		cars::{Car, CarView},
		query::contains_ignore_case,
	},
	error::{AppError, AppResult},
	extract::{JsonBody, Path, Query},
	response::ok,
	state::SharedState,
	users::{User, UserSummary},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookingFilter {
	pub search: Option<String>,
	pub status: Option<BookingStatus>,
}

impl BookingFilter {
	/// Status must match exactly; the search hits car make/model or user name/email.
	pub fn matches(&self, booking: &TestDriveBooking, car: Option<&Car>, user: Option<&User>) -> bool {
		if self.status.is_some_and(|status| status != booking.status) {
			return false;
		}

		let Some(search) = &self.search else {
			return true;
		};
		let car_hit = car.is_some_and(|car| contains_ignore_case(&car.make, search) || contains_ignore_case(&car.model, search));
		let user_hit = user.is_some_and(|user| {
			user.name.as_deref().is_some_and(|name| contains_ignore_case(name, search)) || contains_ignore_case(&user.email, search)
		});
		car_hit || user_hit
	}
}

#[derive(serde::Serialize, Debug)]
pub struct AdminBookingView {
	#[serde(flatten)]
	pub booking: TestDriveBooking,
	pub car: CarView,
	pub user: UserSummary,
}

#[derive(serde::Deserialize, Debug, Default)]
pub struct AdminBookingParams {
	search: Option<String>,
	status: Option<String>,
}

pub async fn list_test_drives(State(state): State<SharedState>, _admin: AdminUser, Query(params): Query<AdminBookingParams>) -> AppResult<Json<Value>> {
	let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
		Some(raw) => Some(raw.parse::<BookingStatus>().map_err(AppError::BadRequest)?),
		None => None,
	};
	let filter = BookingFilter {
		search: params.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
		status,
	};

	let bookings = state.store.admin_bookings(&filter).await?;

	let car_ids: Vec<Uuid> = bookings.iter().map(|b| b.car_id).collect();
	let user_ids: Vec<Uuid> = bookings.iter().map(|b| b.user_id).collect();
	let cars: HashMap<Uuid, Car> = state.store.find_cars(&car_ids).await?.into_iter().map(|c| (c.id, c)).collect();
	let users: HashMap<Uuid, User> = state.store.find_users(&user_ids).await?.into_iter().map(|u| (u.id, u)).collect();

	let views: Vec<AdminBookingView> = bookings
		.into_iter()
		.filter_map(|booking| {
			let car = cars.get(&booking.car_id)?.clone();
			let user = users.get(&booking.user_id)?.summary();
			Some(AdminBookingView {
				booking,
				car: CarView::new(car, false),
				user,
			})
		})
		.collect();

	Ok(ok(views))
}

#[derive(serde::Deserialize, Debug)]
pub struct StatusChange {
	status: String,
}

pub async fn update_test_drive_status(
	State(state): State<SharedState>,
	AdminUser(admin): AdminUser,
	Path(booking_id): Path<Uuid>,
	JsonBody(change): JsonBody<StatusChange>,
) -> AppResult<Json<Value>> {
	let status: BookingStatus = change.status.parse().map_err(AppError::BadRequest)?;

	let booking = state
		.store
		.set_booking_status(booking_id, status)
		.await?
		.ok_or_else(|| AppError::not_found("Booking not found"))?;

	info!("{} moved booking {} to {}", admin.email, booking.id, status);
	Ok(ok(booking))
}

#[cfg(test)]
mod tests {
	use chrono::{NaiveDate, Utc};

	use super::*;
	use crate::{cars::cars::CarStatus, users::Role};

	fn booking(status: BookingStatus) -> TestDriveBooking {
		TestDriveBooking {
			id: Uuid::new_v4(),
			car_id: Uuid::new_v4(),
			user_id: Uuid::new_v4(),
			booking_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
			start_time: "10:00".into(),
			end_time: "11:00".into(),
			status,
			notes: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	fn car() -> Car {
		Car {
			id: Uuid::new_v4(),
			make: "Mazda".into(),
			model: "CX-5".into(),
			year: 2022,
			price: 30000.0,
			mileage: 100,
			color: "White".into(),
			fuel_type: "Petrol".into(),
			transmission: "Automatic".into(),
			body_type: "SUV".into(),
			seats: None,
			description: "Demo vehicle".into(),
			status: CarStatus::Available,
			featured: false,
			images: vec![],
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	fn user() -> User {
		User {
			id: Uuid::new_v4(),
			subject: "user_1".into(),
			email: "ana@example.com".into(),
			name: Some("Ana Lima".into()),
			image_url: None,
			phone: None,
			role: Role::User,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		}
	}

	#[test]
	fn empty_filter_matches_everything() {
		assert!(BookingFilter::default().matches(&booking(BookingStatus::NoShow), None, None));
	}

	#[test]
	fn status_filter_is_exact() {
		let filter = BookingFilter {
			status: Some(BookingStatus::Pending),
			..Default::default()
		};
		assert!(filter.matches(&booking(BookingStatus::Pending), None, None));
		assert!(!filter.matches(&booking(BookingStatus::Confirmed), None, None));
	}

	#[test]
	fn search_covers_car_and_user() {
		let (car, user) = (car(), user());
		let search = |text: &str| BookingFilter {
			search: Some(text.into()),
			..Default::default()
		};
		let b = booking(BookingStatus::Pending);

		assert!(search("mazda").matches(&b, Some(&car), Some(&user)));
		assert!(search("cx-").matches(&b, Some(&car), Some(&user)));
		assert!(search("LIMA").matches(&b, Some(&car), Some(&user)));
		assert!(search("ana@").matches(&b, Some(&car), Some(&user)));
		assert!(!search("suv").matches(&b, Some(&car), Some(&user)));
	}
}
