use std::{collections::HashSet, fmt, str::FromStr};

use axum::{extract::State, Json};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use log::info;
use serde_json::Value;
use uuid::Uuid;

use crate::{
	auth::AdminUser,
	error::{AppError, AppResult},
	extract::JsonBody,
	response::ok,
	state::SharedState,
	store::Store,
};

pub const DEFAULT_OPEN: &str = "09:00";
pub const DEFAULT_CLOSE: &str = "18:00";

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
	Monday,
	Tuesday,
	Wednesday,
	Thursday,
	Friday,
	Saturday,
	Sunday,
}

impl DayOfWeek {
	pub const ALL: [DayOfWeek; 7] = [
		DayOfWeek::Monday,
		DayOfWeek::Tuesday,
		DayOfWeek::Wednesday,
		DayOfWeek::Thursday,
		DayOfWeek::Friday,
		DayOfWeek::Saturday,
		DayOfWeek::Sunday,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			DayOfWeek::Monday => "MONDAY",
			DayOfWeek::Tuesday => "TUESDAY",
			DayOfWeek::Wednesday => "WEDNESDAY",
			DayOfWeek::Thursday => "THURSDAY",
			DayOfWeek::Friday => "FRIDAY",
			DayOfWeek::Saturday => "SATURDAY",
			DayOfWeek::Sunday => "SUNDAY",
		}
	}
}

impl From<Weekday> for DayOfWeek {
	fn from(day: Weekday) -> Self {
		match day {
			Weekday::Mon => DayOfWeek::Monday,
			Weekday::Tue => DayOfWeek::Tuesday,
			Weekday::Wed => DayOfWeek::Wednesday,
			Weekday::Thu => DayOfWeek::Thursday,
			Weekday::Fri => DayOfWeek::Friday,
			Weekday::Sat => DayOfWeek::Saturday,
			Weekday::Sun => DayOfWeek::Sunday,
		}
	}
}

impl fmt::Display for DayOfWeek {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DayOfWeek {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		DayOfWeek::ALL
			.into_iter()
			.find(|day| day.as_str() == s)
			.ok_or_else(|| format!("Invalid day of week: {s}"))
	}
}

/// Parses a wall-clock time like `9:00` or `09:00`.
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
	NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

pub fn format_clock(time: NaiveTime) -> String {
	time.format("%H:%M").to_string()
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHour {
	pub day_of_week: DayOfWeek,
	pub open_time: String,
	pub close_time: String,
	pub is_open: bool,
}

impl WorkingHour {
	/// Monday to Saturday 09:00-18:00, closed on Sunday.
	pub fn default_week() -> Vec<WorkingHour> {
		DayOfWeek::ALL
			.into_iter()
			.map(|day| WorkingHour {
				day_of_week: day,
				open_time: DEFAULT_OPEN.to_string(),
				close_time: DEFAULT_CLOSE.to_string(),
				is_open: day != DayOfWeek::Sunday,
			})
			.collect()
	}

	/// Open and close times, or `None` when the day is closed or malformed.
	pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
		if !self.is_open {
			return None;
		}
		let open = parse_clock(&self.open_time)?;
		let close = parse_clock(&self.close_time)?;
		(open < close).then_some((open, close))
	}

	/// Normalizes times to `HH:MM` and checks that open days open before they close.
	pub fn validated(self) -> Result<WorkingHour, String> {
		let day = self.day_of_week;
		let open = parse_clock(&self.open_time).ok_or_else(|| format!("Invalid open time for {day}"))?;
		let close = parse_clock(&self.close_time).ok_or_else(|| format!("Invalid close time for {day}"))?;
		if self.is_open && open >= close {
			return Err(format!("Opening time must be before closing time for {day}"));
		}
		Ok(WorkingHour {
			day_of_week: day,
			open_time: format_clock(open),
			close_time: format_clock(close),
			is_open: self.is_open,
		})
	}
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dealership {
	pub id: Uuid,
	pub name: String,
	pub address: String,
	pub phone: String,
	pub email: String,
	pub working_hours: Vec<WorkingHour>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Dealership {
	pub fn new_default(now: DateTime<Utc>) -> Self {
		Self {
			id: Uuid::new_v4(),
			name: "Vahaan Motors".to_string(),
			address: "69 Car Street, Autoville, CA 69420".to_string(),
			phone: "+1 (555) 123-4567".to_string(),
			email: "contact@vahaan.com".to_string(),
			working_hours: WorkingHour::default_week(),
			created_at: now,
			updated_at: now,
		}
	}

	pub fn hours_on(&self, day: DayOfWeek) -> Option<&WorkingHour> {
		self.working_hours.iter().find(|h| h.day_of_week == day)
	}
}

/// The configured hours for `day`, falling back to the default week.
pub fn hours_for(dealership: Option<&Dealership>, day: DayOfWeek) -> WorkingHour {
	dealership
		.and_then(|d| d.hours_on(day).cloned())
		.or_else(|| WorkingHour::default_week().into_iter().find(|h| h.day_of_week == day))
		.unwrap_or(WorkingHour {
			day_of_week: day,
			open_time: DEFAULT_OPEN.to_string(),
			close_time: DEFAULT_CLOSE.to_string(),
			is_open: false,
		})
}

/// Loads the dealership, creating the default one on first use.
pub async fn ensure_dealership(store: &dyn Store) -> AppResult<Dealership> {
	if let Some(dealership) = store.dealership().await? {
		return Ok(dealership);
	}

	let dealership = Dealership::new_default(Utc::now());
	store.insert_dealership(&dealership).await?;
	info!("Created default dealership {}", dealership.id);

	// a concurrent first access may have inserted too; the oldest row wins
	Ok(store.dealership().await?.unwrap_or(dealership))
}

pub async fn get_dealership(State(state): State<SharedState>, _admin: AdminUser) -> AppResult<Json<Value>> {
	let dealership = ensure_dealership(state.store.as_ref()).await?;
	Ok(ok(dealership))
}

pub async fn save_working_hours(
	State(state): State<SharedState>,
	AdminUser(admin): AdminUser,
	JsonBody(hours): JsonBody<Vec<WorkingHour>>,
) -> AppResult<Json<Value>> {
	let mut seen = HashSet::new();
	let mut validated = Vec::with_capacity(hours.len());
	for hour in hours {
		if !seen.insert(hour.day_of_week) {
			return Err(AppError::bad_request(format!("{} listed more than once", hour.day_of_week)));
		}
		validated.push(hour.validated().map_err(AppError::BadRequest)?);
	}

	let dealership = ensure_dealership(state.store.as_ref()).await?;
	let dealership = state
		.store
		.save_working_hours(dealership.id, &validated)
		.await?
		.ok_or_else(|| AppError::not_found("Dealership not found"))?;

	info!("{} updated working hours", admin.email);
	Ok(ok(dealership))
}

#[cfg(test)]
mod tests {
	use chrono::NaiveDate;

	use super::*;

	#[test]
	fn default_week_closes_on_sunday() {
		let week = WorkingHour::default_week();
		assert_eq!(week.len(), 7);
		assert!(week.iter().filter(|h| h.is_open).all(|h| h.day_of_week != DayOfWeek::Sunday));
		assert_eq!(week[0].window(), Some((parse_clock("09:00").unwrap(), parse_clock("18:00").unwrap())));
		assert_eq!(week[6].window(), None);
	}

	#[test]
	fn validation_normalizes_and_rejects_inverted_hours() {
		let hour = WorkingHour {
			day_of_week: DayOfWeek::Friday,
			open_time: "8:30".into(),
			close_time: "17:00".into(),
			is_open: true,
		};
		assert_eq!(hour.validated().unwrap().open_time, "08:30");

		let inverted = WorkingHour {
			day_of_week: DayOfWeek::Friday,
			open_time: "18:00".into(),
			close_time: "09:00".into(),
			is_open: true,
		};
		assert_eq!(inverted.clone().validated().unwrap_err(), "Opening time must be before closing time for FRIDAY");

		let closed = WorkingHour { is_open: false, ..inverted };
		assert!(closed.validated().is_ok());
	}

	#[test]
	fn weekday_mapping_follows_the_calendar() {
		let monday = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
		assert_eq!(DayOfWeek::from(chrono::Datelike::weekday(&monday)), DayOfWeek::Monday);
		assert_eq!("SUNDAY".parse::<DayOfWeek>(), Ok(DayOfWeek::Sunday));
		assert!("Sunday".parse::<DayOfWeek>().is_err());
	}

	#[test]
	fn missing_days_fall_back_to_the_default_week() {
		let mut dealership = Dealership::new_default(Utc::now());
		dealership.working_hours.retain(|h| h.day_of_week != DayOfWeek::Tuesday);
		dealership.working_hours[0].open_time = "10:00".into();

		assert_eq!(hours_for(Some(&dealership), DayOfWeek::Monday).open_time, "10:00");
		assert_eq!(hours_for(Some(&dealership), DayOfWeek::Tuesday).open_time, DEFAULT_OPEN);
		assert!(!hours_for(None, DayOfWeek::Sunday).is_open);
	}
}
