use axum::{extract::State, Json};
use log::{info, warn};
use serde_json::{Map, Value};

use super::gemini::GeminiClient;
use crate::{
	auth::{AdminUser, ClientIp},
	error::{AppError, AppResult},
	extract::MultipartForm,
	images::read_image_field,
	rate_limit::Decision,
	response::ok,
	state::SharedState,
};

pub const CAR_DETAILS_PROMPT: &str = r#"Analyze this car image and extract the following information:
1. Make (manufacturer)
2. Model
3. Year (approximately)
4. Color
5. Body type (e.g. sedan, SUV, coupe)
6. Mileage
7. Fuel type (e.g. gasoline, electric)
8. Transmission (e.g. automatic, manual)
9. Price (estimated)
10. Short description as to be added to a car listing

Format your response as a clean JSON object with these fields:
{
  "make": "",
  "model": "",
  "year": "0000",
  "color": "",
  "bodyType": "",
  "mileage": "",
  "fuelType": "",
  "transmission": "",
  "price": "",
  "description": "",
  "confidence": 0.0
}

For confidence, provide a value between 0.0 and 1.0 indicating how confident you are in the extracted information.
Only respond with the JSON object and nothing else."#;

pub const SEARCH_PROMPT: &str = r#"Analyze this car image and extract the following information for a search query:
1. Make (manufacturer)
2. Body type (e.g. sedan, SUV, coupe)
3. Color

Format your response as a clean JSON object with these fields:
{
  "make": "",
  "bodyType": "",
  "color": "",
  "confidence": 0.0
}

For confidence, provide a value between 0.0 and 1.0 indicating how confident you are in the extracted information.
Only respond with the JSON object and nothing else."#;

const CAR_DETAILS_FIELDS: [&str; 11] = [
	"make",
	"model",
	"year",
	"color",
	"bodyType",
	"mileage",
	"fuelType",
	"transmission",
	"price",
	"description",
	"confidence",
];

/// Listing fields read off a photo, ready to prefill the add-car form.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CarDetails {
	pub make: String,
	pub model: String,
	pub year: String,
	pub color: String,
	pub body_type: String,
	pub mileage: String,
	pub fuel_type: String,
	pub transmission: String,
	pub price: String,
	pub description: String,
	pub confidence: f64,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHints {
	pub make: String,
	pub body_type: String,
	pub color: String,
	pub confidence: f64,
}

/// Drops Markdown code fences (with an optional `json` tag) from a model reply.
pub fn clean_reply(text: &str) -> String {
	let mut cleaned = String::with_capacity(text.len());
	let mut rest = text;
	while let Some(at) = rest.find("```") {
		cleaned.push_str(&rest[..at]);
		rest = &rest[at + 3..];
		rest = rest.strip_prefix("json").unwrap_or(rest);
		rest = rest.strip_prefix('\n').unwrap_or(rest);
	}
	cleaned.push_str(rest);
	cleaned.trim().to_string()
}

fn reply_object(text: &str) -> AppResult<Map<String, Value>> {
	serde_json::from_str(&clean_reply(text)).map_err(|e| {
		warn!("Failed to parse AI response: {e}");
		AppError::Upstream("Failed to parse AI response".to_string())
	})
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
	match object.get(key) {
		Some(Value::String(s)) => s.trim().to_string(),
		Some(Value::Null) | None => String::new(),
		Some(other) => other.to_string(),
	}
}

fn confidence(object: &Map<String, Value>) -> f64 {
	let raw = match object.get("confidence") {
		Some(Value::Number(n)) => n.as_f64(),
		Some(Value::String(s)) => s.trim().parse().ok(),
		_ => None,
	};
	raw.filter(|c: &f64| c.is_finite()).unwrap_or(0.0).clamp(0.0, 1.0)
}

pub fn parse_car_details(text: &str) -> AppResult<CarDetails> {
	let object = reply_object(text)?;

	let missing: Vec<&str> = CAR_DETAILS_FIELDS.into_iter().filter(|field| !object.contains_key(*field)).collect();
	if !missing.is_empty() {
		return Err(AppError::Upstream(format!("Missing fields in response: {}", missing.join(", "))));
	}

	Ok(CarDetails {
		make: text_field(&object, "make"),
		model: text_field(&object, "model"),
		year: text_field(&object, "year"),
		color: text_field(&object, "color"),
		body_type: text_field(&object, "bodyType"),
		mileage: text_field(&object, "mileage"),
		fuel_type: text_field(&object, "fuelType"),
		transmission: text_field(&object, "transmission"),
		price: text_field(&object, "price"),
		description: text_field(&object, "description"),
		confidence: confidence(&object),
	})
}

pub fn parse_search_hints(text: &str) -> AppResult<SearchHints> {
	let object = reply_object(text)?;
	Ok(SearchHints {
		make: text_field(&object, "make"),
		body_type: text_field(&object, "bodyType"),
		color: text_field(&object, "color"),
		confidence: confidence(&object),
	})
}

fn vision(state: &SharedState) -> AppResult<&GeminiClient> {
	state
		.vision
		.as_ref()
		.ok_or_else(|| AppError::Unavailable("Gemini API key not available".to_string()))
}

pub async fn ai_extract(State(state): State<SharedState>, AdminUser(admin): AdminUser, MultipartForm(mut multipart): MultipartForm) -> AppResult<Json<Value>> {
	let client = vision(&state)?;
	let image = read_image_field(&mut multipart).await?;

	let reply = client.generate(CAR_DETAILS_PROMPT, &image).await?;
	let details = parse_car_details(&reply)?;

	info!("{} extracted {} {} from a photo", admin.email, details.make, details.model);
	Ok(ok(details))
}

pub async fn image_search(State(state): State<SharedState>, ClientIp(ip): ClientIp, MultipartForm(mut multipart): MultipartForm) -> AppResult<Json<Value>> {
	if let Decision::Denied { remaining, reset } = state.limiter.check(ip, 1) {
		warn!("RATE_LIMIT_EXCEEDED for {ip}: remaining {remaining}, reset in {}s", reset.as_secs());
		return Err(AppError::RateLimited {
			retry_after_secs: reset.as_secs_f64().ceil() as u64,
		});
	}

	let client = vision(&state)?;
	let image = read_image_field(&mut multipart).await?;

	let reply = client.generate(SEARCH_PROMPT, &image).await?;
	Ok(ok(parse_search_hints(&reply)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	const FULL_REPLY: &str = r#"{"make":"Toyota","model":"Corolla","year":2019,"color":"White","bodyType":"Sedan","mileage":"45000","fuelType":"Petrol","transmission":"Automatic","price":"15000","description":"Tidy sedan.","confidence":0.87}"#;

	#[test]
	fn fences_are_removed() {
		assert_eq!(clean_reply("```json\n{\"a\":1}\n```"), "{\"a\":1}");
		assert_eq!(clean_reply("```\n{}\n```  "), "{}");
		assert_eq!(clean_reply("  {\"a\":\"x\"} "), "{\"a\":\"x\"}");
	}

	#[test]
	fn complete_reply_is_parsed() {
		let details = parse_car_details(&format!("```json\n{FULL_REPLY}\n```")).unwrap();
		assert_eq!(details.make, "Toyota");
		assert_eq!(details.year, "2019");
		assert_eq!(details.body_type, "Sedan");
		assert_eq!(details.confidence, 0.87);
	}

	#[test]
	fn missing_fields_are_listed_in_order() {
		let err = parse_car_details(r#"{"make":"Toyota","year":"2019","color":"","bodyType":"","mileage":"","fuelType":"","transmission":"","description":"","confidence":1}"#).unwrap_err();
		assert_eq!(err.to_string(), "Missing fields in response: model, price");
		assert!(matches!(err, AppError::Upstream(_)));
	}

	#[test]
	fn prose_reply_is_a_parse_failure() {
		let err = parse_search_hints("Sorry, I can't see a car here.").unwrap_err();
		assert_eq!(err.to_string(), "Failed to parse AI response");
	}

	#[test]
	fn search_hints_tolerate_loose_values() {
		let hints = parse_search_hints(r#"{"make":" Honda ","bodyType":"SUV","confidence":"1.7"}"#).unwrap();
		assert_eq!(
			hints,
			SearchHints {
				make: "Honda".into(),
				body_type: "SUV".into(),
				color: String::new(),
				confidence: 1.0,
			}
		);
	}
}
