use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CarPage, Store, StoreError, StoreResult, SLOT_TAKEN};
use crate::{
	cars::{
		cars::{Car, CarPatch, CarStatus},
		listing::CarFilters,
		query::{contains_ignore_case, CarQuery},
	},
	dashboard::{BookingSummary, CarSummary},
	settings::{Dealership, WorkingHour},
	test_drive::{
		admin::BookingFilter,
		booking::{BookingStatus, TestDriveBooking},
	},
	users::{Identity, Role, User},
};

#[derive(Debug, Clone)]
struct SavedCar {
	user_id: Uuid,
	car_id: Uuid,
	saved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
	users: HashMap<Uuid, User>,
	cars: HashMap<Uuid, Car>,
	saved: Vec<SavedCar>,
	bookings: HashMap<Uuid, TestDriveBooking>,
	dealership: Option<Dealership>,
}

impl Tables {
	/// Another live booking already holds `booking`'s slot.
	fn slot_taken(&self, booking: &TestDriveBooking) -> bool {
		self.bookings
			.values()
			.any(|other| other.id != booking.id && other.status.holds_slot() && other.same_slot(booking))
	}

	fn available_cars(&self) -> impl Iterator<Item = &Car> {
		self.cars.values().filter(|car| car.status == CarStatus::Available)
	}
}

fn newest_first(cars: &mut [Car]) {
	cars.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Keeps everything in process memory. A single lock over all tables makes
/// every operation atomic, including the booking conflict check.
#[derive(Debug, Default)]
pub struct MemoryStore {
	tables: RwLock<Tables>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn upsert_user(&self, identity: &Identity, role: Role) -> StoreResult<User> {
		let mut tables = self.tables.write().await;
		let now = Utc::now();

		if let Some(user) = tables.users.values_mut().find(|u| u.subject == identity.subject) {
			let profile_changed = user.email != identity.email
				|| (identity.name.is_some() && user.name != identity.name)
				|| (identity.image_url.is_some() && user.image_url != identity.image_url)
				|| (identity.phone.is_some() && user.phone != identity.phone);
			if profile_changed {
				user.email = identity.email.clone();
				user.name = identity.name.clone().or(user.name.take());
				user.image_url = identity.image_url.clone().or(user.image_url.take());
				user.phone = identity.phone.clone().or(user.phone.take());
				user.updated_at = now;
			}
			return Ok(user.clone());
		}

		let user = User {
			id: Uuid::new_v4(),
			subject: identity.subject.clone(),
			email: identity.email.clone(),
			name: identity.name.clone(),
			image_url: identity.image_url.clone(),
			phone: identity.phone.clone(),
			role,
			created_at: now,
			updated_at: now,
		};
		tables.users.insert(user.id, user.clone());
		Ok(user)
	}

	async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
		Ok(self.tables.read().await.users.get(&id).cloned())
	}

	async fn find_users(&self, ids: &[Uuid]) -> StoreResult<Vec<User>> {
		let tables = self.tables.read().await;
		let ids: HashSet<&Uuid> = ids.iter().collect();
		Ok(ids.into_iter().filter_map(|id| tables.users.get(id).cloned()).collect())
	}

	async fn list_users(&self) -> StoreResult<Vec<User>> {
		let mut users: Vec<User> = self.tables.read().await.users.values().cloned().collect();
		users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
		Ok(users)
	}

	async fn set_user_role(&self, id: Uuid, role: Role) -> StoreResult<Option<User>> {
		let mut tables = self.tables.write().await;
		Ok(tables.users.get_mut(&id).map(|user| {
			user.role = role;
			user.updated_at = Utc::now();
			user.clone()
		}))
	}

	async fn insert_car(&self, car: &Car) -> StoreResult<()> {
		self.tables.write().await.cars.insert(car.id, car.clone());
		Ok(())
	}

	async fn find_car(&self, id: Uuid) -> StoreResult<Option<Car>> {
		Ok(self.tables.read().await.cars.get(&id).cloned())
	}

	async fn find_cars(&self, ids: &[Uuid]) -> StoreResult<Vec<Car>> {
		let tables = self.tables.read().await;
		let ids: HashSet<&Uuid> = ids.iter().collect();
		Ok(ids.into_iter().filter_map(|id| tables.cars.get(id).cloned()).collect())
	}

	async fn search_cars(&self, query: &CarQuery) -> StoreResult<CarPage> {
		let tables = self.tables.read().await;
		let mut matches: Vec<&Car> = tables.cars.values().filter(|car| query.matches(car)).collect();
		matches.sort_by(|a, b| query.sort.compare(a, b));

		let total = matches.len() as i64;
		let cars = matches
			.into_iter()
			.skip(usize::try_from(query.offset()).unwrap_or(0))
			.take(usize::try_from(query.limit).unwrap_or(0))
			.cloned()
			.collect();

		Ok(CarPage { cars, total })
	}

	async fn list_cars(&self, search: Option<&str>) -> StoreResult<Vec<Car>> {
		let tables = self.tables.read().await;
		let mut cars: Vec<Car> = tables
			.cars
			.values()
			.filter(|car| {
				search.map_or(true, |s| {
					contains_ignore_case(&car.make, s) || contains_ignore_case(&car.model, s) || contains_ignore_case(&car.color, s)
				})
			})
			.cloned()
			.collect();
		newest_first(&mut cars);
		Ok(cars)
	}

	async fn featured_cars(&self, limit: i64) -> StoreResult<Vec<Car>> {
		let tables = self.tables.read().await;
		let mut cars: Vec<Car> = tables.available_cars().filter(|car| car.featured).cloned().collect();
		newest_first(&mut cars);
		cars.truncate(usize::try_from(limit).unwrap_or(0));
		Ok(cars)
	}

	async fn car_filters(&self) -> StoreResult<CarFilters> {
		let tables = self.tables.read().await;
		let distinct = |field: fn(&Car) -> &String| -> Vec<String> {
			tables.available_cars().map(|car| field(car).clone()).collect::<BTreeSet<_>>().into_iter().collect()
		};

		let prices: Vec<f64> = tables.available_cars().map(|car| car.price).collect();
		let min = prices.iter().copied().reduce(f64::min);
		let max = prices.iter().copied().reduce(f64::max);

		Ok(CarFilters {
			makes: distinct(|car| &car.make),
			body_types: distinct(|car| &car.body_type),
			fuel_types: distinct(|car| &car.fuel_type),
			transmissions: distinct(|car| &car.transmission),
			price_range: CarFilters::price_range(min, max),
		})
	}

	async fn listing_names(&self) -> StoreResult<Vec<(String, String)>> {
		let tables = self.tables.read().await;
		let names: BTreeSet<(String, String)> = tables.available_cars().map(|car| (car.make.clone(), car.model.clone())).collect();
		Ok(names.into_iter().collect())
	}

	async fn update_car(&self, id: Uuid, patch: &CarPatch) -> StoreResult<Option<Car>> {
		let mut tables = self.tables.write().await;
		Ok(tables.cars.get_mut(&id).map(|car| {
			patch.apply(car, Utc::now());
			car.clone()
		}))
	}

	async fn delete_car(&self, id: Uuid) -> StoreResult<Option<Car>> {
		let mut tables = self.tables.write().await;
		let Some(car) = tables.cars.remove(&id) else {
			return Ok(None);
		};
		tables.saved.retain(|saved| saved.car_id != id);
		tables.bookings.retain(|_, booking| booking.car_id != id);
		Ok(Some(car))
	}

	async fn car_summaries(&self) -> StoreResult<Vec<CarSummary>> {
		let tables = self.tables.read().await;
		Ok(tables
			.cars
			.values()
			.map(|car| CarSummary {
				id: car.id,
				status: car.status,
				featured: car.featured,
			})
			.collect())
	}

	async fn saved_car_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
		let tables = self.tables.read().await;
		Ok(tables.saved.iter().filter(|s| s.user_id == user_id).map(|s| s.car_id).collect())
	}

	async fn toggle_saved_car(&self, user_id: Uuid, car_id: Uuid) -> StoreResult<bool> {
		let mut tables = self.tables.write().await;
		let before = tables.saved.len();
		tables.saved.retain(|s| !(s.user_id == user_id && s.car_id == car_id));
		if tables.saved.len() < before {
			return Ok(false);
		}

		tables.saved.push(SavedCar {
			user_id,
			car_id,
			saved_at: Utc::now(),
		});
		Ok(true)
	}

	async fn saved_cars(&self, user_id: Uuid) -> StoreResult<Vec<Car>> {
		let tables = self.tables.read().await;
		let mut saved: Vec<&SavedCar> = tables.saved.iter().filter(|s| s.user_id == user_id).collect();
		// pushes are chronological; reverse keeps ties newest first too
		saved.reverse();
		saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
		Ok(saved.into_iter().filter_map(|s| tables.cars.get(&s.car_id).cloned()).collect())
	}

	async fn create_booking(&self, booking: &TestDriveBooking) -> StoreResult<()> {
		let mut tables = self.tables.write().await;
		if booking.status.holds_slot() && tables.slot_taken(booking) {
			return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
		}
		tables.bookings.insert(booking.id, booking.clone());
		Ok(())
	}

	async fn find_booking(&self, id: Uuid) -> StoreResult<Option<TestDriveBooking>> {
		Ok(self.tables.read().await.bookings.get(&id).cloned())
	}

	async fn latest_user_booking(&self, car_id: Uuid, user_id: Uuid) -> StoreResult<Option<TestDriveBooking>> {
		let tables = self.tables.read().await;
		Ok(tables
			.bookings
			.values()
			.filter(|b| b.car_id == car_id && b.user_id == user_id)
			.filter(|b| matches!(b.status, BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Completed))
			.max_by_key(|b| b.created_at)
			.cloned())
	}

	async fn user_bookings(&self, user_id: Uuid) -> StoreResult<Vec<TestDriveBooking>> {
		let tables = self.tables.read().await;
		let mut bookings: Vec<TestDriveBooking> = tables.bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
		bookings.sort_by(|a, b| b.booking_date.cmp(&a.booking_date).then_with(|| a.start_time.cmp(&b.start_time)));
		Ok(bookings)
	}

	async fn admin_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<TestDriveBooking>> {
		let tables = self.tables.read().await;
		let mut bookings: Vec<TestDriveBooking> = tables
			.bookings
			.values()
			.filter(|b| filter.matches(b, tables.cars.get(&b.car_id), tables.users.get(&b.user_id)))
			.cloned()
			.collect();
		bookings.sort_by(|a, b| b.booking_date.cmp(&a.booking_date).then_with(|| a.start_time.cmp(&b.start_time)));
		Ok(bookings)
	}

	async fn taken_start_times(&self, car_id: Uuid, date: NaiveDate) -> StoreResult<Vec<String>> {
		let tables = self.tables.read().await;
		let mut times: Vec<String> = tables
			.bookings
			.values()
			.filter(|b| b.car_id == car_id && b.booking_date == date && b.status.holds_slot())
			.map(|b| b.start_time.clone())
			.collect();
		times.sort();
		Ok(times)
	}

	async fn set_booking_status(&self, id: Uuid, status: BookingStatus) -> StoreResult<Option<TestDriveBooking>> {
		let mut tables = self.tables.write().await;
		let Some(current) = tables.bookings.get(&id).cloned() else {
			return Ok(None);
		};
		if status.holds_slot() && tables.slot_taken(&current) {
			return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
		}

		Ok(tables.bookings.get_mut(&id).map(|booking| {
			booking.status = status;
			booking.updated_at = Utc::now();
			booking.clone()
		}))
	}

	async fn booking_summaries(&self) -> StoreResult<Vec<BookingSummary>> {
		let tables = self.tables.read().await;
		Ok(tables
			.bookings
			.values()
			.map(|b| BookingSummary {
				id: b.id,
				car_id: b.car_id,
				status: b.status,
			})
			.collect())
	}

	async fn dealership(&self) -> StoreResult<Option<Dealership>> {
		Ok(self.tables.read().await.dealership.clone())
	}

	async fn insert_dealership(&self, dealership: &Dealership) -> StoreResult<()> {
		let mut tables = self.tables.write().await;
		// first one wins if two requests race to create it
		tables.dealership.get_or_insert_with(|| dealership.clone());
		Ok(())
	}

	async fn save_working_hours(&self, dealership_id: Uuid, hours: &[WorkingHour]) -> StoreResult<Option<Dealership>> {
		let mut tables = self.tables.write().await;
		let Some(dealership) = tables.dealership.as_mut().filter(|d| d.id == dealership_id) else {
			return Ok(None);
		};

		for hour in hours {
			match dealership.working_hours.iter_mut().find(|h| h.day_of_week == hour.day_of_week) {
				Some(existing) => *existing = hour.clone(),
				None => dealership.working_hours.push(hour.clone()),
			}
		}
		dealership.working_hours.sort_by_key(|h| h.day_of_week);
		dealership.updated_at = Utc::now();
		Ok(Some(dealership.clone()))
	}
}
