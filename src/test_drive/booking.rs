use std::{collections::HashMap, fmt, str::FromStr};

use axum::{extract::State, Json};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use hyper::StatusCode;
use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::{
	auth::CurrentUser,
	cars::cars::{CarStatus, CarView},
	error::{AppError, AppResult},
	extract::{JsonBody, Path},
	response::{message, ok},
	settings::{format_clock, hours_for, parse_clock, WorkingHour},
	state::SharedState,
};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
	Pending,
	Confirmed,
	Completed,
	Cancelled,
	NoShow,
}

impl BookingStatus {
	pub const ALL: [BookingStatus; 5] = [
		BookingStatus::Pending,
		BookingStatus::Confirmed,
		BookingStatus::Completed,
		BookingStatus::Cancelled,
		BookingStatus::NoShow,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			BookingStatus::Pending => "PENDING",
			BookingStatus::Confirmed => "CONFIRMED",
			BookingStatus::Completed => "COMPLETED",
			BookingStatus::Cancelled => "CANCELLED",
			BookingStatus::NoShow => "NO_SHOW",
		}
	}

	/// Whether a booking in this status keeps its slot away from others.
	pub fn holds_slot(&self) -> bool {
		matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
	}
}

impl fmt::Display for BookingStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for BookingStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		BookingStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| "Invalid status".to_string())
	}
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestDriveBooking {
	pub id: Uuid,
	pub car_id: Uuid,
	pub user_id: Uuid,
	pub booking_date: NaiveDate,
	pub start_time: String,
	pub end_time: String,
	pub status: BookingStatus,
	pub notes: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl TestDriveBooking {
	/// Two bookings compete for the same slot.
	pub fn same_slot(&self, other: &TestDriveBooking) -> bool {
		self.car_id == other.car_id && self.booking_date == other.booking_date && self.start_time == other.start_time
	}
}

/// The caller's own booking, shown on the car page.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTestDrive {
	pub id: Uuid,
	pub status: BookingStatus,
	pub booking_date: NaiveDate,
}

impl From<TestDriveBooking> for UserTestDrive {
	fn from(booking: TestDriveBooking) -> Self {
		Self {
			id: booking.id,
			status: booking.status,
			booking_date: booking.booking_date,
		}
	}
}

#[derive(serde::Serialize, Debug)]
pub struct BookingWithCar {
	#[serde(flatten)]
	pub booking: TestDriveBooking,
	pub car: CarView,
}

#[derive(serde::Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
	car_id: Uuid,
	booking_date: String,
	start_time: String,
	end_time: String,
	notes: Option<String>,
}

/// Accepts `2025-06-02` or a full RFC 3339 timestamp.
pub fn parse_booking_date(raw: &str) -> Option<NaiveDate> {
	let raw = raw.trim();
	NaiveDate::parse_from_str(raw, "%Y-%m-%d")
		.ok()
		.or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Checks a requested slot against the calendar and the day's working hours.
pub fn validate_slot(date: NaiveDate, start: NaiveTime, end: NaiveTime, today: NaiveDate, hours: &WorkingHour) -> Result<(), String> {
	if date < today {
		return Err("Booking date cannot be in the past".to_string());
	}
	if end <= start {
		return Err("End time must be after start time".to_string());
	}

	let day = hours.day_of_week;
	let Some((open, close)) = hours.window() else {
		return Err(format!("The dealership is closed on {day}"));
	};
	if start < open || end > close {
		return Err(format!(
			"Test drives on {day} must be between {} and {}",
			format_clock(open),
			format_clock(close)
		));
	}
	Ok(())
}

pub async fn book_test_drive(
	State(state): State<SharedState>,
	CurrentUser(user): CurrentUser,
	JsonBody(request): JsonBody<BookingRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
	let car = state
		.store
		.find_car(request.car_id)
		.await?
		.filter(|car| car.status == CarStatus::Available)
		.ok_or_else(|| AppError::bad_request("Car not available for test drive"))?;

	let date = parse_booking_date(&request.booking_date).ok_or_else(|| AppError::bad_request("Invalid booking date"))?;
	let start = parse_clock(&request.start_time).ok_or_else(|| AppError::bad_request("Invalid start time"))?;
	let end = parse_clock(&request.end_time).ok_or_else(|| AppError::bad_request("Invalid end time"))?;

	let dealership = state.store.dealership().await?;
	let hours = hours_for(dealership.as_ref(), date.weekday().into());
	validate_slot(date, start, end, Utc::now().date_naive(), &hours).map_err(AppError::BadRequest)?;

	let now = Utc::now();
	let booking = TestDriveBooking {
		id: Uuid::new_v4(),
		car_id: car.id,
		user_id: user.id,
		booking_date: date,
		start_time: format_clock(start),
		end_time: format_clock(end),
		status: BookingStatus::Pending,
		notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
		created_at: now,
		updated_at: now,
	};

	state.store.create_booking(&booking).await?;

	info!("{} booked car {} on {} at {}", user.email, car.id, booking.booking_date, booking.start_time);
	Ok((StatusCode::CREATED, ok(booking)))
}

pub async fn user_test_drives(State(state): State<SharedState>, CurrentUser(user): CurrentUser) -> AppResult<Json<Value>> {
	let bookings = state.store.user_bookings(user.id).await?;

	let car_ids: Vec<Uuid> = bookings.iter().map(|b| b.car_id).collect();
	let cars: HashMap<Uuid, _> = state.store.find_cars(&car_ids).await?.into_iter().map(|car| (car.id, car)).collect();

	let bookings: Vec<BookingWithCar> = bookings
		.into_iter()
		.filter_map(|booking| {
			let car = cars.get(&booking.car_id)?.clone();
			Some(BookingWithCar {
				booking,
				car: CarView::new(car, false),
			})
		})
		.collect();

	Ok(ok(bookings))
}

pub async fn cancel_test_drive(State(state): State<SharedState>, CurrentUser(user): CurrentUser, Path(booking_id): Path<Uuid>) -> AppResult<Json<Value>> {
	let booking = state
		.store
		.find_booking(booking_id)
		.await?
		.ok_or_else(|| AppError::not_found("Booking not found"))?;

	if booking.user_id != user.id && !user.is_admin() {
		return Err(AppError::Forbidden("You are not authorized to cancel this booking".to_string()));
	}

	match booking.status {
		BookingStatus::Cancelled => return Err(AppError::bad_request("This booking is already cancelled")),
		BookingStatus::Completed => return Err(AppError::bad_request("This booking is already completed")),
		_ => {}
	}

	state.store.set_booking_status(booking.id, BookingStatus::Cancelled).await?;

	info!("{} cancelled booking {}", user.email, booking.id);
	Ok(message("Test drive booking cancelled successfully"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::settings::DayOfWeek;

	fn monday_hours() -> WorkingHour {
		WorkingHour {
			day_of_week: DayOfWeek::Monday,
			open_time: "09:00".into(),
			close_time: "18:00".into(),
			is_open: true,
		}
	}

	fn t(raw: &str) -> NaiveTime {
		parse_clock(raw).unwrap()
	}

	fn d(raw: &str) -> NaiveDate {
		parse_booking_date(raw).unwrap()
	}

	#[test]
	fn statuses_use_their_upper_case_names() {
		assert_eq!("NO_SHOW".parse::<BookingStatus>(), Ok(BookingStatus::NoShow));
		assert_eq!(serde_json::to_value(BookingStatus::NoShow).unwrap(), "NO_SHOW");
		assert_eq!("DONE".parse::<BookingStatus>().unwrap_err(), "Invalid status");
	}

	#[test]
	fn only_pending_and_confirmed_hold_a_slot() {
		let holding: Vec<_> = BookingStatus::ALL.into_iter().filter(BookingStatus::holds_slot).collect();
		assert_eq!(holding, vec![BookingStatus::Pending, BookingStatus::Confirmed]);
	}

	#[test]
	fn booking_dates_accept_plain_and_timestamp_forms() {
		assert_eq!(d("2025-06-02"), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
		assert_eq!(d("2025-06-02T00:00:00.000Z"), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
		assert!(parse_booking_date("02/06/2025").is_none());
	}

	#[test]
	fn slot_inside_working_hours_is_accepted() {
		let hours = monday_hours();
		assert_eq!(validate_slot(d("2025-06-02"), t("09:00"), t("10:00"), d("2025-06-01"), &hours), Ok(()));
		assert_eq!(validate_slot(d("2025-06-02"), t("17:00"), t("18:00"), d("2025-06-02"), &hours), Ok(()));
	}

	#[test]
	fn slot_outside_working_hours_is_rejected() {
		let hours = monday_hours();
		let err = validate_slot(d("2025-06-02"), t("17:30"), t("18:30"), d("2025-06-01"), &hours).unwrap_err();
		assert_eq!(err, "Test drives on MONDAY must be between 09:00 and 18:00");

		let closed = WorkingHour { is_open: false, ..hours };
		let err = validate_slot(d("2025-06-02"), t("10:00"), t("11:00"), d("2025-06-01"), &closed).unwrap_err();
		assert_eq!(err, "The dealership is closed on MONDAY");
	}

	#[test]
	fn past_dates_and_inverted_times_are_rejected() {
		let hours = monday_hours();
		assert_eq!(
			validate_slot(d("2025-06-02"), t("10:00"), t("11:00"), d("2025-06-03"), &hours).unwrap_err(),
			"Booking date cannot be in the past"
		);
		assert_eq!(
			validate_slot(d("2025-06-02"), t("11:00"), t("11:00"), d("2025-06-01"), &hours).unwrap_err(),
			"End time must be after start time"
		);
	}
}
