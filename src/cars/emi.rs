use axum::{extract::State, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
	error::{AppError, AppResult},
	extract::{Path, Query},
	response::ok,
	state::SharedState,
};

pub const MIN_DOWN_PAYMENT_RATIO: f64 = 0.15;
pub const DEFAULT_ANNUAL_RATE: f64 = 5.0;
pub const MAX_TENURE_YEARS: u32 = 20;

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmiQuote {
	pub emi: f64,
	pub total_interest: f64,
	pub total_payment: f64,
	pub loan_principal: f64,
	pub down_payment: f64,
	pub down_payment_percent: f64,
	pub annual_rate: f64,
	pub years: u32,
}

fn round2(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

impl EmiQuote {
	/// Monthly instalment for financing `price`. The down payment is held
	/// between 15% of the price and the full price, tenure between 1 and 20 years.
	pub fn calculate(price: f64, down_payment: Option<f64>, annual_rate: f64, years: u32) -> Result<Self, String> {
		if !price.is_finite() || price <= 0.0 {
			return Err("Loan amount cannot be zero or negative".to_string());
		}
		if !annual_rate.is_finite() || annual_rate < 0.0 {
			return Err("Interest rate cannot be negative".to_string());
		}

		let min_down = price * MIN_DOWN_PAYMENT_RATIO;
		let down = down_payment.filter(|d| d.is_finite()).unwrap_or(min_down).clamp(min_down, price);
		let years = years.clamp(1, MAX_TENURE_YEARS);

		let principal = price - down;
		if principal <= 0.0 {
			return Err("Loan amount cannot be zero or negative".to_string());
		}

		let months = f64::from(years * 12);
		let monthly_rate = annual_rate / 100.0 / 12.0;
		let emi = if monthly_rate == 0.0 {
			principal / months
		} else {
			let growth = (1.0 + monthly_rate).powf(months);
			principal * monthly_rate * growth / (growth - 1.0)
		};
		let total_payment = emi * months;

		Ok(Self {
			emi: round2(emi),
			total_interest: round2(total_payment - principal),
			total_payment: round2(total_payment),
			loan_principal: round2(principal),
			down_payment: round2(down),
			down_payment_percent: round2(down / price * 100.0),
			annual_rate,
			years,
		})
	}
}

#[derive(serde::Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmiParams {
	down_payment: Option<f64>,
	years: Option<u32>,
	rate: Option<f64>,
}

pub async fn car_emi(State(state): State<SharedState>, Path(car_id): Path<Uuid>, Query(params): Query<EmiParams>) -> AppResult<Json<Value>> {
	let car = state
		.store
		.find_car(car_id)
		.await?
		.ok_or_else(|| AppError::not_found("Car not found"))?;

	let quote = EmiQuote::calculate(
		car.price,
		params.down_payment,
		params.rate.unwrap_or(DEFAULT_ANNUAL_RATE),
		params.years.unwrap_or(1),
	)
	.map_err(AppError::BadRequest)?;

	Ok(ok(quote))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn standard_quote_uses_minimum_down_payment() {
		let quote = EmiQuote::calculate(100_000.0, None, 5.0, 1).unwrap();
		assert_eq!(quote.down_payment, 15_000.0);
		assert_eq!(quote.loan_principal, 85_000.0);
		assert_eq!(quote.down_payment_percent, 15.0);
		// 85k over 12 months at 5% p.a.
		assert!(quote.emi > 7276.0 && quote.emi < 7277.0, "emi was {}", quote.emi);
		assert!((quote.total_payment - quote.emi * 12.0).abs() < 0.1);
		assert!((quote.total_interest - (quote.total_payment - 85_000.0)).abs() < 0.011);
	}

	#[test]
	fn down_payment_and_tenure_are_clamped() {
		let quote = EmiQuote::calculate(10_000.0, Some(100.0), 5.0, 50).unwrap();
		assert_eq!(quote.down_payment, 1_500.0);
		assert_eq!(quote.years, 20);

		let quote = EmiQuote::calculate(10_000.0, Some(5_000.0), 5.0, 0).unwrap();
		assert_eq!(quote.down_payment, 5_000.0);
		assert_eq!(quote.years, 1);
	}

	#[test]
	fn paying_everything_up_front_leaves_no_loan() {
		let err = EmiQuote::calculate(10_000.0, Some(20_000.0), 5.0, 3).unwrap_err();
		assert_eq!(err, "Loan amount cannot be zero or negative");
		assert!(EmiQuote::calculate(0.0, None, 5.0, 3).is_err());
	}

	#[test]
	fn zero_rate_splits_principal_evenly() {
		let quote = EmiQuote::calculate(12_000.0, Some(0.0), 0.0, 1).unwrap();
		assert_eq!(quote.loan_principal, 10_200.0);
		assert_eq!(quote.emi, 850.0);
		assert_eq!(quote.total_interest, 0.0);
	}
}
