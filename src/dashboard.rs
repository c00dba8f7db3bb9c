use std::collections::HashSet;

use axum::{extract::State, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
	auth::AdminUser,
	cars::cars::CarStatus,
	error::AppResult,
	response::ok,
	state::SharedState,
	test_drive::booking::BookingStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CarSummary {
	pub id: Uuid,
	pub status: CarStatus,
	pub featured: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSummary {
	pub id: Uuid,
	pub car_id: Uuid,
	pub status: BookingStatus,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Default)]
pub struct CarStats {
	pub total: usize,
	pub available: usize,
	pub sold: usize,
	pub unavailable: usize,
	pub featured: usize,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestDriveStats {
	pub total: usize,
	pub pending: usize,
	pub confirmed: usize,
	pub completed: usize,
	pub cancelled: usize,
	pub no_show: usize,
	pub conversion_rate: f64,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
	pub cars: CarStats,
	pub test_drives: TestDriveStats,
}

impl DashboardStats {
	pub fn compute(cars: &[CarSummary], bookings: &[BookingSummary]) -> Self {
		let count_cars = |status: CarStatus| cars.iter().filter(|c| c.status == status).count();
		let count_bookings = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();

		let completed = count_bookings(BookingStatus::Completed);
		let test_driven: HashSet<Uuid> = bookings
			.iter()
			.filter(|b| b.status == BookingStatus::Completed)
			.map(|b| b.car_id)
			.collect();
		let sold_after_drive = cars
			.iter()
			.filter(|c| c.status == CarStatus::Sold && test_driven.contains(&c.id))
			.count();

		let conversion_rate = if completed > 0 {
			let rate = sold_after_drive as f64 / completed as f64 * 100.0;
			(rate * 100.0).round() / 100.0
		} else {
			0.0
		};

		Self {
			cars: CarStats {
				total: cars.len(),
				available: count_cars(CarStatus::Available),
				sold: count_cars(CarStatus::Sold),
				unavailable: count_cars(CarStatus::Unavailable),
				featured: cars.iter().filter(|c| c.featured).count(),
			},
			test_drives: TestDriveStats {
				total: bookings.len(),
				pending: count_bookings(BookingStatus::Pending),
				confirmed: count_bookings(BookingStatus::Confirmed),
				completed,
				cancelled: count_bookings(BookingStatus::Cancelled),
				no_show: count_bookings(BookingStatus::NoShow),
				conversion_rate,
			},
		}
	}
}

pub async fn dashboard(State(state): State<SharedState>, _admin: AdminUser) -> AppResult<Json<Value>> {
	let (cars, bookings) = tokio::try_join!(state.store.car_summaries(), state.store.booking_summaries())?;
	Ok(ok(DashboardStats::compute(&cars, &bookings)))
}
