//! Persistence seam. `DbClient` talks to Postgres, `MemoryStore` keeps
//! everything in process for development and tests.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{
	cars::{
		cars::{Car, CarPatch},
		listing::CarFilters,
		query::CarQuery,
	},
	dashboard::{BookingSummary, CarSummary},
	settings::{Dealership, WorkingHour},
	test_drive::{
		admin::BookingFilter,
		booking::{BookingStatus, TestDriveBooking},
	},
	users::{Identity, Role, User},
};

pub mod memory;

pub use memory::MemoryStore;

pub const SLOT_TAKEN: &str = "This time slot is already booked. Please choose another time slot.";

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("{0}")]
	Conflict(String),

	#[error("database error: {0}")]
	Backend(#[from] tokio_postgres::Error),

	#[error("corrupt row: {0}")]
	Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of search results plus the unpaginated match count.
#[derive(Debug, Clone)]
pub struct CarPage {
	pub cars: Vec<Car>,
	pub total: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
	/// Creates the user on first sight. `role` only applies to new rows.
	async fn upsert_user(&self, identity: &Identity, role: Role) -> StoreResult<User>;
	async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
	async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>>;
	async fn list_users(&self) -> StoreResult<Vec<User>>;
	async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>>;

	async fn insert_car(&self, car: &Car) -> StoreResult<()>;
	async fn find_car(&self, id: Uuid) -> StoreResult<Option<Car>>;
	async fn find_cars(&self, ids: &[Uuid]) -> StoreResult<Vec<Car>>;
	async fn search_cars(&self, query: &CarQuery) -> StoreResult<CarPage>;
	async fn list_cars(&self, search: Option<&str>) -> StoreResult<Vec<Car>>;
	async fn featured_cars(&self, limit: i64) -> StoreResult<Vec<Car>>;
	async fn car_filters(&self) -> StoreResult<CarFilters>;
	/// Distinct (make, model) pairs of available cars.
	async fn listing_names(&self) -> StoreResult<Vec<(String, String)>>;
	async fn update_car(&self, id: Uuid, patch: &CarPatch) -> StoreResult<Option<Car>>;
	async fn delete_car(&self, id: Uuid) -> StoreResult<Option<Car>>;
	async fn car_summaries(&self) -> StoreResult<Vec<CarSummary>>;

	async fn saved_car_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>>;
	/// Flips the wishlist entry and returns whether the car is now saved.
	async fn toggle_saved_car(&self, user_id: Uuid, car_id: Uuid) -> StoreResult<bool>;
	async fn saved_cars(&self, user_id: Uuid) -> StoreResult<Vec<Car>>;

	/// Inserts a booking unless a PENDING or CONFIRMED booking already holds the
	/// same car, date and start time, in which case `StoreError::Conflict`.
	async fn create_booking(&self, booking: &TestDriveBooking) -> StoreResult<()>;
	async fn find_booking(&self, id: Uuid) -> StoreResult<Option<TestDriveBooking>>;
	async fn latest_user_booking(&self, car_id: Uuid, user_id: Uuid) -> StoreResult<Option<TestDriveBooking>>;
	async fn user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<TestDriveBooking>>;
	async fn admin_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<TestDriveBooking>>;
	/// Start times held by PENDING or CONFIRMED bookings of a car on a date.
	async fn taken_start_times(&self, car_id: Uuid, date: NaiveDate) -> StoreResult<Vec<String>>;
	async fn set_booking_status(&self, id: Uuid, status: BookingStatus) -> StoreResult<Option<TestDriveBooking>>;
	async fn booking_summaries(&self) -> StoreResult<Vec<BookingSummary>>;

	async fn dealership(&self) -> StoreResult<Option<Dealership>>;
	async fn insert_dealership(&self, dealership: &Dealership) -> StoreResult<()>;
	async fn save_working_hours(&self, dealership_id: Uuid, hours: &[WorkingHour]) -> StoreResult<Option<Dealership>>;
}
