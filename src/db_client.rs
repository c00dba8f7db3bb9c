use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use postgres_from_row::FromRow;
use tokio_postgres::{error::SqlState, types::ToSql, Client, NoTls, Row};
use uuid::Uuid;

use crate::{
	cars::{
		cars::{Car, CarPatch},
		listing::CarFilters,
		query::{like_pattern, CarQuery, SqlValue},
	},
	dashboard::{BookingSummary, CarSummary},
	settings::{DayOfWeek, Dealership, WorkingHour},
	store::{CarPage, Store, StoreError, StoreResult, SLOT_TAKEN},
	test_drive::{
		admin::BookingFilter,
		booking::{BookingStatus, TestDriveBooking},
	},
	users::{Identity, Role, User},
};

const MIGRATION: &str = include_str!("../migrations/0001_init.sql");

/// Statuses that hold a test-drive slot, as a SQL list.
const LIVE_STATUSES: &str = "('PENDING', 'CONFIRMED')";

pub struct DbClient(Client);

impl DbClient {
	pub async fn connect(url: &str) -> Result<Self, tokio_postgres::Error> {
		let (client, monitor) = tokio_postgres::connect(url, NoTls).await?;

		tokio::spawn(async move {
			if let Err(e) = monitor.await {
				error!("Connection error: {e}");
			}
		});

		Ok(Self(client))
	}

	pub async fn migrate(&self) -> Result<(), tokio_postgres::Error> {
		self.0.batch_execute(MIGRATION).await?;
		info!("Database schema is up to date");
		Ok(())
	}

	async fn booking_row(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> StoreResult<Option<TestDriveBooking>> {
		let row = self.0.query_opt(sql, params).await.map_err(slot_conflict)?;
		row.as_ref().map(convert::<BookingRow, _>).transpose()
	}

	async fn working_hours(&self, dealership_id: Uuid) -> StoreResult<Vec<WorkingHour>> {
		let rows = self
			.0
			.query("SELECT * FROM working_hours WHERE dealership_id = $1", &[&dealership_id])
			.await?;
		let mut hours: Vec<WorkingHour> = convert_all::<WorkingHourRow, _>(&rows)?;
		hours.sort_by_key(|h| h.day_of_week);
		Ok(hours)
	}

	async fn upsert_working_hours(&self, dealership_id: Uuid, hours: &[WorkingHour]) -> StoreResult<()> {
		let days: Vec<&str> = hours.iter().map(|h| h.day_of_week.as_str()).collect();
		let opens: Vec<&str> = hours.iter().map(|h| h.open_time.as_str()).collect();
		let closes: Vec<&str> = hours.iter().map(|h| h.close_time.as_str()).collect();
		let open_flags: Vec<bool> = hours.iter().map(|h| h.is_open).collect();

		self.0
			.execute(
				"INSERT INTO working_hours (dealership_id, day_of_week, open_time, close_time, is_open) \
				 SELECT $1::uuid, day, open_time, close_time, is_open \
				 FROM UNNEST($2::text[], $3::text[], $4::text[], $5::bool[]) AS h(day, open_time, close_time, is_open) \
				 ON CONFLICT (dealership_id, day_of_week) DO UPDATE \
				 SET open_time = EXCLUDED.open_time, close_time = EXCLUDED.close_time, is_open = EXCLUDED.is_open",
				&[&dealership_id, &days, &opens, &closes, &open_flags],
			)
			.await?;
		Ok(())
	}

	async fn distinct_available(&self, column: &str) -> StoreResult<Vec<String>> {
		let sql = format!("SELECT DISTINCT {column} FROM cars WHERE status = 'AVAILABLE' ORDER BY {column}");
		let rows = self.0.query(sql.as_str(), &[]).await?;
		rows.iter().map(|row| row.try_get(0).map_err(StoreError::from)).collect()
	}
}

/// A unique violation on the slot index means another booking won the race.
fn slot_conflict(err: tokio_postgres::Error) -> StoreError {
	if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
		StoreError::Conflict(SLOT_TAKEN.to_string())
	} else {
		StoreError::Backend(err)
	}
}

fn convert<R, T>(row: &Row) -> StoreResult<T>
where
	R: FromRow,
	T: TryFrom<R, Error = StoreError>,
{
	T::try_from(R::try_from_row(row)?)
}

fn convert_all<R, T>(rows: &[Row]) -> StoreResult<Vec<T>>
where
	R: FromRow,
	T: TryFrom<R, Error = StoreError>,
{
	rows.iter().map(convert::<R, T>).collect()
}

fn parse_column<T: std::str::FromStr<Err = String>>(raw: &str) -> StoreResult<T> {
	raw.parse().map_err(StoreError::Corrupt)
}

#[derive(FromRow)]
struct UserRow {
	id: Uuid,
	subject: String,
	email: String,
	name: Option<String>,
	image_url: Option<String>,
	phone: Option<String>,
	role: String,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
	type Error = StoreError;

	fn try_from(row: UserRow) -> StoreResult<Self> {
		Ok(User {
			id: row.id,
			subject: row.subject,
			email: row.email,
			name: row.name,
			image_url: row.image_url,
			phone: row.phone,
			role: parse_column(&row.role)?,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(FromRow)]
struct CarRow {
	id: Uuid,
	make: String,
	model: String,
	year: i32,
	price: f64,
	mileage: i32,
	color: String,
	fuel_type: String,
	transmission: String,
	body_type: String,
	seats: Option<i32>,
	description: String,
	status: String,
	featured: bool,
	images: Vec<String>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<CarRow> for Car {
	type Error = StoreError;

	fn try_from(row: CarRow) -> StoreResult<Self> {
		Ok(Car {
			id: row.id,
			make: row.make,
			model: row.model,
			year: row.year,
			price: row.price,
			mileage: row.mileage,
			color: row.color,
			fuel_type: row.fuel_type,
			transmission: row.transmission,
			body_type: row.body_type,
			seats: row.seats,
			description: row.description,
			status: parse_column(&row.status)?,
			featured: row.featured,
			images: row.images,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(FromRow)]
struct CarSummaryRow {
	id: Uuid,
	status: String,
	featured: bool,
}

impl TryFrom<CarSummaryRow> for CarSummary {
	type Error = StoreError;

	fn try_from(row: CarSummaryRow) -> StoreResult<Self> {
		Ok(CarSummary {
			id: row.id,
			status: parse_column(&row.status)?,
			featured: row.featured,
		})
	}
}

#[derive(FromRow)]
struct BookingRow {
	id: Uuid,
	car_id: Uuid,
	user_id: Uuid,
	booking_date: NaiveDate,
	start_time: String,
	end_time: String,
	status: String,
	notes: Option<String>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for TestDriveBooking {
	type Error = StoreError;

	fn try_from(row: BookingRow) -> StoreResult<Self> {
		Ok(TestDriveBooking {
			id: row.id,
			car_id: row.car_id,
			user_id: row.user_id,
			booking_date: row.booking_date,
			start_time: row.start_time,
			end_time: row.end_time,
			status: parse_column(&row.status)?,
			notes: row.notes,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(FromRow)]
struct BookingSummaryRow {
	id: Uuid,
	car_id: Uuid,
	status: String,
}

impl TryFrom<BookingSummaryRow> for BookingSummary {
	type Error = StoreError;

	fn try_from(row: BookingSummaryRow) -> StoreResult<Self> {
		Ok(BookingSummary {
			id: row.id,
			car_id: row.car_id,
			status: parse_column(&row.status)?,
		})
	}
}

#[derive(FromRow)]
struct DealershipRow {
	id: Uuid,
	name: String,
	address: String,
	phone: String,
	email: String,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl DealershipRow {
	fn with_hours(self, working_hours: Vec<WorkingHour>) -> Dealership {
		Dealership {
			id: self.id,
			name: self.name,
			address: self.address,
			phone: self.phone,
			email: self.email,
			working_hours,
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
	}
}

#[derive(FromRow)]
struct WorkingHourRow {
	day_of_week: String,
	open_time: String,
	close_time: String,
	is_open: bool,
}

impl TryFrom<WorkingHourRow> for WorkingHour {
	type Error = StoreError;

	fn try_from(row: WorkingHourRow) -> StoreResult<Self> {
		Ok(WorkingHour {
			day_of_week: parse_column::<DayOfWeek>(&row.day_of_week)?,
			open_time: row.open_time,
			close_time: row.close_time,
			is_open: row.is_open,
		})
	}
}

#[async_trait]
impl Store for DbClient {
	async fn upsert_user(&self, identity: &Identity, role: Role) -> StoreResult<User> {
		// the WHERE skips no-op writes; RETURNING is then empty
		let upserted = self
			.0
			.query_opt(
				"INSERT INTO users (id, subject, email, name, image_url, phone, role) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7) \
				 ON CONFLICT (subject) DO UPDATE SET \
				 email = EXCLUDED.email, \
				 name = COALESCE(EXCLUDED.name, users.name), \
				 image_url = COALESCE(EXCLUDED.image_url, users.image_url), \
				 phone = COALESCE(EXCLUDED.phone, users.phone), \
				 updated_at = NOW() \
				 WHERE (users.email, users.name, users.image_url, users.phone) IS DISTINCT FROM \
				 (EXCLUDED.email, COALESCE(EXCLUDED.name, users.name), COALESCE(EXCLUDED.image_url, users.image_url), COALESCE(EXCLUDED.phone, users.phone)) \
				 RETURNING *",
				&[
					&Uuid::new_v4(),
					&identity.subject,
					&identity.email,
					&identity.name,
					&identity.image_url,
					&identity.phone,
					&role.as_str(),
				],
			)
			.await?;

		let row = match upserted {
			Some(row) => row,
			None => self.0.query_one("SELECT * FROM users WHERE subject = $1", &[&identity.subject]).await?,
		};
		convert::<UserRow, _>(&row)
	}

	async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
		let row = self.0.query_opt("SELECT * FROM users WHERE id = $1", &[&id]).await?;
		row.as_ref().map(convert::<UserRow, _>).transpose()
	}

	async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
		let rows = self.0.query("SELECT * FROM users WHERE id = ANY($1)", &[&ids]).await?;
		convert_all::<UserRow, _>(&rows)
	}

	async fn list_users(&self) -> StoreResult<Vec<User>> {
		let rows = self.0.query("SELECT * FROM users ORDER BY created_at DESC, id", &[]).await?;
		convert_all::<UserRow, _>(&rows)
	}

	async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
		let row = self
			.0
			.query_opt("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *", &[&id, &role.as_str()])
			.await?;
		row.as_ref().map(convert::<UserRow, _>).transpose()
	}

	async fn insert_car(&self, car: &Car) -> StoreResult<()> {
		self.0
			.execute(
				"INSERT INTO cars (id, make, model, year, price, mileage, color, fuel_type, transmission, body_type, \
				 seats, description, status, featured, images, created_at, updated_at) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
				&[
					&car.id,
					&car.make,
					&car.model,
					&car.year,
					&car.price,
					&car.mileage,
					&car.color,
					&car.fuel_type,
					&car.transmission,
					&car.body_type,
					&car.seats,
					&car.description,
					&car.status.as_str(),
					&car.featured,
					&car.images,
					&car.created_at,
					&car.updated_at,
				],
			)
			.await?;
		Ok(())
	}

	async fn find_car(&self, id: Uuid) -> StoreResult<Option<Car>> {
		let row = self.0.query_opt("SELECT * FROM cars WHERE id = $1", &[&id]).await?;
		row.as_ref().map(convert::<CarRow, _>).transpose()
	}

	async fn find_cars(&self, ids: &[Uuid]) -> StoreResult<Vec<Car>> {
		let rows = self.0.query("SELECT * FROM cars WHERE id = ANY($1)", &[&ids]).await?;
		convert_all::<CarRow, _>(&rows)
	}

	async fn search_cars(&self, query: &CarQuery) -> StoreResult<CarPage> {
		let (count_sql, page_sql, filter) = query.to_sql();
		let params: Vec<&(dyn ToSql + Sync)> = filter.params.iter().map(SqlValue::as_sql).collect();
		// the last two parameters are LIMIT and OFFSET
		let filter_params = &params[..params.len().saturating_sub(2)];

		let (count, rows) = tokio::try_join!(self.0.query_one(count_sql.as_str(), filter_params), self.0.query(page_sql.as_str(), &params))?;

		Ok(CarPage {
			cars: convert_all::<CarRow, _>(&rows)?,
			total: count.try_get(0)?,
		})
	}

	async fn list_cars(&self, search: Option<&str>) -> StoreResult<Vec<Car>> {
		let rows = match search {
			Some(search) => {
				let pattern = like_pattern(search);
				self.0
					.query(
						"SELECT * FROM cars WHERE make ILIKE $1 OR model ILIKE $1 OR color ILIKE $1 ORDER BY created_at DESC, id",
						&[&pattern],
					)
					.await?
			}
			None => self.0.query("SELECT * FROM cars ORDER BY created_at DESC, id", &[]).await?,
		};
		convert_all::<CarRow, _>(&rows)
	}

	async fn featured_cars(&self, limit: i64) -> StoreResult<Vec<Car>> {
		let rows = self
			.0
			.query(
				"SELECT * FROM cars WHERE featured AND status = 'AVAILABLE' ORDER BY created_at DESC, id LIMIT $1",
				&[&limit],
			)
			.await?;
		convert_all::<CarRow, _>(&rows)
	}

	async fn car_filters(&self) -> StoreResult<CarFilters> {
		let (makes, body_types, fuel_types, transmissions) = tokio::try_join!(
			self.distinct_available("make"),
			self.distinct_available("body_type"),
			self.distinct_available("fuel_type"),
			self.distinct_available("transmission"),
		)?;

		let range = self
			.0
			.query_one("SELECT MIN(price), MAX(price) FROM cars WHERE status = 'AVAILABLE'", &[])
			.await?;

		Ok(CarFilters {
			makes,
			body_types,
			fuel_types,
			transmissions,
			price_range: CarFilters::price_range(range.try_get(0)?, range.try_get(1)?),
		})
	}

	async fn listing_names(&self) -> StoreResult<Vec<(String, String)>> {
		let rows = self
			.0
			.query("SELECT DISTINCT make, model FROM cars WHERE status = 'AVAILABLE' ORDER BY make, model", &[])
			.await?;
		rows.iter()
			.map(|row| -> StoreResult<(String, String)> { Ok((row.try_get("make")?, row.try_get("model")?)) })
			.collect()
	}

	async fn update_car(&self, id: Uuid, patch: &CarPatch) -> StoreResult<Option<Car>> {
		let status = patch.status.map(|s| s.as_str());
		let row = self
			.0
			.query_opt(
				"UPDATE cars SET status = COALESCE($2, status), featured = COALESCE($3, featured), updated_at = NOW() \
				 WHERE id = $1 RETURNING *",
				&[&id, &status, &patch.featured],
			)
			.await?;
		row.as_ref().map(convert::<CarRow, _>).transpose()
	}

	async fn delete_car(&self, id: Uuid) -> StoreResult<Option<Car>> {
		let row = self.0.query_opt("DELETE FROM cars WHERE id = $1 RETURNING *", &[&id]).await?;
		row.as_ref().map(convert::<CarRow, _>).transpose()
	}

	async fn car_summaries(&self) -> StoreResult<Vec<CarSummary>> {
		let rows = self.0.query("SELECT id, status, featured FROM cars", &[]).await?;
		convert_all::<CarSummaryRow, _>(&rows)
	}

	async fn saved_car_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
		let rows = self.0.query("SELECT car_id FROM saved_cars WHERE user_id = $1", &[&user_id]).await?;
		rows.iter().map(|row| row.try_get(0).map_err(StoreError::from)).collect()
	}

	async fn toggle_saved_car(&self, user_id: Uuid, car_id: Uuid) -> StoreResult<bool> {
		let removed = self
			.0
			.execute("DELETE FROM saved_cars WHERE user_id = $1 AND car_id = $2", &[&user_id, &car_id])
			.await?;
		if removed > 0 {
			return Ok(false);
		}

		self.0
			.execute(
				"INSERT INTO saved_cars (user_id, car_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
				&[&user_id, &car_id],
			)
			.await?;
		Ok(true)
	}

	async fn saved_cars(&self, user_id: Uuid) -> StoreResult<Vec<Car>> {
		let rows = self
			.0
			.query(
				"SELECT c.* FROM saved_cars s JOIN cars c ON c.id = s.car_id WHERE s.user_id = $1 ORDER BY s.saved_at DESC",
				&[&user_id],
			)
			.await?;
		convert_all::<CarRow, _>(&rows)
	}

	async fn create_booking(&self, booking: &TestDriveBooking) -> StoreResult<()> {
		let taken_sql = format!(
			"SELECT EXISTS (SELECT 1 FROM test_drive_bookings \
			 WHERE car_id = $1 AND booking_date = $2 AND start_time = $3 AND status IN {LIVE_STATUSES})"
		);
		let taken: bool = self
			.0
			.query_one(taken_sql.as_str(), &[&booking.car_id, &booking.booking_date, &booking.start_time])
			.await?
			.try_get(0)?;
		if taken && booking.status.holds_slot() {
			return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
		}

		// the partial unique index settles concurrent inserts
		self.0
			.execute(
				"INSERT INTO test_drive_bookings (id, car_id, user_id, booking_date, start_time, end_time, status, notes, created_at, updated_at) \
				 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
				&[
					&booking.id,
					&booking.car_id,
					&booking.user_id,
					&booking.booking_date,
					&booking.start_time,
					&booking.end_time,
					&booking.status.as_str(),
					&booking.notes,
					&booking.created_at,
					&booking.updated_at,
				],
			)
			.await
			.map_err(slot_conflict)?;
		Ok(())
	}

	async fn find_booking(&self, id: Uuid) -> StoreResult<Option<TestDriveBooking>> {
		self.booking_row("SELECT * FROM test_drive_bookings WHERE id = $1", &[&id]).await
	}

	async fn latest_user_booking(&self, car_id: Uuid, user_id: Uuid) -> StoreResult<Option<TestDriveBooking>> {
		self.booking_row(
			"SELECT * FROM test_drive_bookings WHERE car_id = $1 AND user_id = $2 \
			 AND status IN ('PENDING', 'CONFIRMED', 'COMPLETED') ORDER BY created_at DESC LIMIT 1",
			&[&car_id, &user_id],
		)
		.await
	}

	async fn user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<TestDriveBooking>> {
		let rows = self
			.0
			.query(
				"SELECT * FROM test_drive_bookings WHERE user_id = $1 ORDER BY booking_date DESC, start_time ASC",
				&[&user_id],
			)
			.await?;
		convert_all::<BookingRow, _>(&rows)
	}

	async fn admin_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<TestDriveBooking>> {
		let status = filter.status.map(|s| s.as_str());
		let pattern = filter.search.as_deref().map(like_pattern);
		let rows = self
			.0
			.query(
				"SELECT b.* FROM test_drive_bookings b \
				 JOIN cars c ON c.id = b.car_id \
				 JOIN users u ON u.id = b.user_id \
				 WHERE ($1::text IS NULL OR b.status = $1) \
				 AND ($2::text IS NULL OR c.make ILIKE $2 OR c.model ILIKE $2 OR u.name ILIKE $2 OR u.email ILIKE $2) \
				 ORDER BY b.booking_date DESC, b.start_time ASC",
				&[&status, &pattern],
			)
			.await?;
		convert_all::<BookingRow, _>(&rows)
	}

	async fn taken_start_times(&self, car_id: Uuid, date: NaiveDate) -> StoreResult<Vec<String>> {
		let sql = format!(
			"SELECT start_time FROM test_drive_bookings \
			 WHERE car_id = $1 AND booking_date = $2 AND status IN {LIVE_STATUSES} ORDER BY start_time"
		);
		let rows = self.0.query(sql.as_str(), &[&car_id, &date]).await?;
		rows.iter().map(|row| row.try_get(0).map_err(StoreError::from)).collect()
	}

	async fn set_booking_status(&self, id: Uuid, status: BookingStatus) -> StoreResult<Option<TestDriveBooking>> {
		if status.holds_slot() {
			let taken_sql = format!(
				"SELECT EXISTS (SELECT 1 FROM test_drive_bookings o JOIN test_drive_bookings b ON b.id = $1 \
				 WHERE o.id <> b.id AND o.car_id = b.car_id AND o.booking_date = b.booking_date \
				 AND o.start_time = b.start_time AND o.status IN {LIVE_STATUSES})"
			);
			let taken: bool = self.0.query_one(taken_sql.as_str(), &[&id]).await?.try_get(0)?;
			if taken {
				return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
			}
		}

		self.booking_row(
			"UPDATE test_drive_bookings SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
			&[&id, &status.as_str()],
		)
		.await
	}

	async fn booking_summaries(&self) -> StoreResult<Vec<BookingSummary>> {
		let rows = self.0.query("SELECT id, car_id, status FROM test_drive_bookings", &[]).await?;
		convert_all::<BookingSummaryRow, _>(&rows)
	}

	async fn dealership(&self) -> StoreResult<Option<Dealership>> {
		let Some(row) = self
			.0
			.query_opt("SELECT * FROM dealerships ORDER BY created_at, id LIMIT 1", &[])
			.await?
		else {
			return Ok(None);
		};

		let dealership = DealershipRow::try_from_row(&row)?;
		let hours = self.working_hours(dealership.id).await?;
		Ok(Some(dealership.with_hours(hours)))
	}

	async fn insert_dealership(&self, dealership: &Dealership) -> StoreResult<()> {
		self.0
			.execute(
				"INSERT INTO dealerships (id, name, address, phone, email, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
				&[
					&dealership.id,
					&dealership.name,
					&dealership.address,
					&dealership.phone,
					&dealership.email,
					&dealership.created_at,
					&dealership.updated_at,
				],
			)
			.await?;
		self.upsert_working_hours(dealership.id, &dealership.working_hours).await
	}

	async fn save_working_hours(&self, dealership_id: Uuid, hours: &[WorkingHour]) -> StoreResult<Option<Dealership>> {
		let Some(row) = self
			.0
			.query_opt("UPDATE dealerships SET updated_at = NOW() WHERE id = $1 RETURNING *", &[&dealership_id])
			.await?
		else {
			return Ok(None);
		};

		self.upsert_working_hours(dealership_id, hours).await?;
		let dealership = DealershipRow::try_from_row(&row)?;
		let hours = self.working_hours(dealership_id).await?;
		Ok(Some(dealership.with_hours(hours)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cars::cars::CarStatus;

	#[test]
	fn migration_declares_the_slot_index() {
		assert!(MIGRATION.contains("CREATE UNIQUE INDEX IF NOT EXISTS test_drive_bookings_slot_idx"));
		assert!(MIGRATION.contains("WHERE status IN ('PENDING', 'CONFIRMED')"));
	}

	#[test]
	fn corrupt_enum_columns_are_reported() {
		let err = parse_column::<CarStatus>("PARKED").unwrap_err();
		assert!(matches!(err, StoreError::Corrupt(ref msg) if msg == "Invalid car status: PARKED"));
		assert_eq!(parse_column::<BookingStatus>("NO_SHOW").unwrap(), BookingStatus::NoShow);
	}

	async fn connect_from_env() -> Option<DbClient> {
		let url = std::env::var("DATABASE_URL").ok()?;
		let db = DbClient::connect(&url).await.unwrap();
		db.migrate().await.unwrap();
		Some(db)
	}

	fn car(tag: &str) -> Car {
		let now = Utc::now();
		Car {
			id: Uuid::new_v4(),
			make: format!("Make{tag}"),
			model: "Estate".into(),
			year: 2020,
			price: 15000.0,
			mileage: 40000,
			color: "Grey".into(),
			fuel_type: "Diesel".into(),
			transmission: "Manual".into(),
			body_type: "Wagon".into(),
			seats: Some(5),
			description: "Used by the database round trip".into(),
			status: CarStatus::Available,
			featured: false,
			images: vec![],
			created_at: now,
			updated_at: now,
		}
	}

	// cargo test -- --ignored with DATABASE_URL pointing at a scratch database
	#[tokio::test]
	#[ignore]
	async fn postgres_store_round_trip() {
		let Some(db) = connect_from_env().await else {
			return;
		};
		let tag = Uuid::new_v4().simple().to_string();

		let identity = Identity {
			subject: format!("sub_{tag}"),
			email: format!("{tag}@example.com"),
			name: Some(format!("Tester {tag}")),
			image_url: None,
			phone: None,
		};
		let created = db.upsert_user(&identity, Role::Admin).await.unwrap();
		assert_eq!(created.role, Role::Admin);

		// unchanged identity hits the IS DISTINCT FROM guard and falls back to the SELECT
		let same = db.upsert_user(&identity, Role::User).await.unwrap();
		assert_eq!(same.id, created.id);
		assert_eq!(same.role, Role::Admin);

		let renamed = Identity {
			name: None,
			phone: Some("555-0100".into()),
			..identity.clone()
		};
		let updated = db.upsert_user(&renamed, Role::User).await.unwrap();
		assert_eq!(updated.role, Role::Admin);
		assert_eq!(updated.name, identity.name);
		assert_eq!(updated.phone.as_deref(), Some("555-0100"));

		let listed = car(&tag);
		db.insert_car(&listed).await.unwrap();

		let booking = TestDriveBooking {
			id: Uuid::new_v4(),
			car_id: listed.id,
			user_id: created.id,
			booking_date: NaiveDate::from_ymd_opt(2031, 3, 4).unwrap(),
			start_time: "10:00".into(),
			end_time: "11:00".into(),
			status: BookingStatus::Pending,
			notes: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		db.create_booking(&booking).await.unwrap();
		let clash = TestDriveBooking {
			id: Uuid::new_v4(),
			..booking.clone()
		};
		assert!(matches!(db.create_booking(&clash).await, Err(StoreError::Conflict(ref msg)) if msg == SLOT_TAKEN));

		let by_user = BookingFilter {
			search: Some(tag.to_uppercase()),
			status: Some(BookingStatus::Pending),
		};
		let found = db.admin_bookings(&by_user).await.unwrap();
		assert_eq!(found.iter().map(|b| b.id).collect::<Vec<_>>(), vec![booking.id]);

		let by_car = BookingFilter {
			search: Some(format!("make{tag}")),
			status: Some(BookingStatus::Cancelled),
		};
		assert!(db.admin_bookings(&by_car).await.unwrap().is_empty());

		let dealership = Dealership::new_default(Utc::now());
		db.insert_dealership(&dealership).await.unwrap();
		let sunday = WorkingHour {
			day_of_week: DayOfWeek::Sunday,
			open_time: "10:00".into(),
			close_time: "14:00".into(),
			is_open: true,
		};
		let saved = db.save_working_hours(dealership.id, &[sunday.clone()]).await.unwrap().unwrap();
		assert_eq!(saved.working_hours.len(), 7);
		assert_eq!(saved.hours_on(DayOfWeek::Sunday), Some(&sunday));
		assert!(saved.hours_on(DayOfWeek::Monday).is_some_and(|h| h.is_open));

		assert!(db.delete_car(listed.id).await.unwrap().is_some());
		assert!(db.find_booking(booking.id).await.unwrap().is_none());
	}
}
