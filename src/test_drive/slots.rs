use axum::{extract::State, Json};
use chrono::{Datelike, Duration, NaiveTime};
use serde_json::Value;
use uuid::Uuid;

use super::booking::parse_booking_date;
use crate::{
	error::{AppError, AppResult},
	extract::{Path, Query},
	response::ok,
	settings::{format_clock, hours_for, DayOfWeek, WorkingHour},
	state::SharedState,
};

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
	pub start_time: String,
	pub end_time: String,
	pub available: bool,
}

/// One-hour windows from opening until the last one that ends by closing.
pub fn hourly_windows(hours: &WorkingHour) -> Vec<(NaiveTime, NaiveTime)> {
	let Some((open, close)) = hours.window() else {
		return Vec::new();
	};

	let mut windows = Vec::new();
	let mut start = open;
	loop {
		let (end, wrapped) = start.overflowing_add_signed(Duration::hours(1));
		if wrapped != 0 || end > close {
			break;
		}
		windows.push((start, end));
		start = end;
	}
	windows
}

pub fn day_slots(hours: &WorkingHour, taken: &[String]) -> Vec<Slot> {
	hourly_windows(hours)
		.into_iter()
		.map(|(start, end)| {
			let start_time = format_clock(start);
			let available = !taken.contains(&start_time);
			Slot {
				start_time,
				end_time: format_clock(end),
				available,
			}
		})
		.collect()
}

#[derive(serde::Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DaySchedule {
	date: chrono::NaiveDate,
	day_of_week: DayOfWeek,
	is_open: bool,
	slots: Vec<Slot>,
}

#[derive(serde::Deserialize, Debug)]
pub struct SlotParams {
	date: String,
}

pub async fn test_drive_slots(State(state): State<SharedState>, Path(car_id): Path<Uuid>, Query(params): Query<SlotParams>) -> AppResult<Json<Value>> {
	let date = parse_booking_date(&params.date).ok_or_else(|| AppError::bad_request("Invalid date"))?;

	if state.store.find_car(car_id).await?.is_none() {
		return Err(AppError::not_found("Car not found"));
	}

	let dealership = state.store.dealership().await?;
	let day = DayOfWeek::from(date.weekday());
	let hours = hours_for(dealership.as_ref(), day);
	let taken = state.store.taken_start_times(car_id, date).await?;

	Ok(ok(DaySchedule {
		date,
		day_of_week: day,
		is_open: hours.window().is_some(),
		slots: day_slots(&hours, &taken),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hours(open: &str, close: &str) -> WorkingHour {
		WorkingHour {
			day_of_week: DayOfWeek::Wednesday,
			open_time: open.into(),
			close_time: close.into(),
			is_open: true,
		}
	}

	#[test]
	fn full_day_has_one_slot_per_hour() {
		let slots = day_slots(&hours("09:00", "18:00"), &[]);
		assert_eq!(slots.len(), 9);
		assert_eq!(slots[0].start_time, "09:00");
		assert_eq!(slots[8].end_time, "18:00");
		assert!(slots.iter().all(|s| s.available));
	}

	#[test]
	fn partial_hour_at_closing_is_dropped() {
		let slots = day_slots(&hours("09:30", "12:00"), &[]);
		let starts: Vec<_> = slots.iter().map(|s| s.start_time.as_str()).collect();
		assert_eq!(starts, ["09:30", "10:30"]);
	}

	#[test]
	fn taken_slots_are_marked_unavailable() {
		let slots = day_slots(&hours("09:00", "12:00"), &["10:00".to_string()]);
		let available: Vec<_> = slots.iter().map(|s| s.available).collect();
		assert_eq!(available, [true, false, true]);
	}

	#[test]
	fn late_hours_do_not_wrap_past_midnight() {
		assert_eq!(hourly_windows(&hours("22:30", "23:59")).len(), 1);
		assert!(hourly_windows(&hours("23:30", "23:59")).is_empty());
	}

	#[test]
	fn closed_day_has_no_slots() {
		let closed = WorkingHour {
			is_open: false,
			..hours("09:00", "18:00")
		};
		assert!(day_slots(&closed, &[]).is_empty());
	}
}
