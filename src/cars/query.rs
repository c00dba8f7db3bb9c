//! Listing search: the filter predicate, sort order and pagination.
//!
//! The same `CarQuery` renders to a SQL `WHERE` clause for Postgres and
//! evaluates directly against a `Car` for the in-memory store, so both
//! backends agree on what matches.

use std::cmp::Ordering;

use tokio_postgres::types::ToSql;

use super::cars::{Car, CarStatus};

pub const DEFAULT_LIMIT: i64 = 6;
pub const MAX_LIMIT: i64 = 100;
/// Highest page whose offset still fits in an `i64`.
pub const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;
/// Largest integer a JSON client can send exactly; treated as "no upper bound".
pub const MAX_SAFE_PRICE: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
	PriceAsc,
	PriceDesc,
	#[default]
	Newest,
}

impl SortOrder {
	/// Unknown values fall back to newest first.
	pub fn parse(raw: &str) -> Self {
		match raw {
			"priceAsc" => SortOrder::PriceAsc,
			"priceDesc" => SortOrder::PriceDesc,
			_ => SortOrder::Newest,
		}
	}

	fn sql(&self) -> &'static str {
		match self {
			SortOrder::PriceAsc => "price ASC, created_at DESC, id ASC",
			SortOrder::PriceDesc => "price DESC, created_at DESC, id ASC",
			SortOrder::Newest => "created_at DESC, id ASC",
		}
	}

	pub fn compare(&self, a: &Car, b: &Car) -> Ordering {
		let newest = b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id));
		match self {
			SortOrder::PriceAsc => a.price.total_cmp(&b.price).then(newest),
			SortOrder::PriceDesc => b.price.total_cmp(&a.price).then(newest),
			SortOrder::Newest => newest,
		}
	}
}

/// Raw query-string parameters of `GET /cars`.
#[derive(serde::Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ListingParams {
	pub search: Option<String>,
	pub make: Option<String>,
	pub body_type: Option<String>,
	pub fuel_type: Option<String>,
	pub transmission: Option<String>,
	pub min_price: Option<f64>,
	pub max_price: Option<f64>,
	pub page: Option<i64>,
	pub limit: Option<i64>,
	pub sort_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarQuery {
	pub search: Option<String>,
	pub make: Option<String>,
	pub body_type: Option<String>,
	pub fuel_type: Option<String>,
	pub transmission: Option<String>,
	pub min_price: f64,
	pub max_price: Option<f64>,
	pub sort: SortOrder,
	pub page: i64,
	pub limit: i64,
}

impl Default for CarQuery {
	fn default() -> Self {
		Self {
			search: None,
			make: None,
			body_type: None,
			fuel_type: None,
			transmission: None,
			min_price: 0.0,
			max_price: None,
			sort: SortOrder::Newest,
			page: 1,
			limit: DEFAULT_LIMIT,
		}
	}
}

impl From<ListingParams> for CarQuery {
	fn from(params: ListingParams) -> Self {
		let min_price = params.min_price.filter(|p| p.is_finite() && *p > 0.0).unwrap_or(0.0);
		// zero means unset; a negative bound is kept and simply matches nothing
		let max_price = params.max_price.filter(|p| p.is_finite() && *p != 0.0 && *p < MAX_SAFE_PRICE);

		Self {
			search: non_empty(params.search),
			make: non_empty(params.make),
			body_type: non_empty(params.body_type),
			fuel_type: non_empty(params.fuel_type),
			transmission: non_empty(params.transmission),
			min_price,
			max_price,
			sort: params.sort_by.as_deref().map(SortOrder::parse).unwrap_or_default(),
			page: params.page.unwrap_or(1).clamp(1, MAX_PAGE),
			limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
		}
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
	Text(String),
	Float(f64),
	Int(i64),
}

impl SqlValue {
	pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
		match self {
			SqlValue::Text(v) => v,
			SqlValue::Float(v) => v,
			SqlValue::Int(v) => v,
		}
	}
}

/// A `WHERE` clause with `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFilter {
	pub clause: String,
	pub params: Vec<SqlValue>,
}

impl SqlFilter {
	fn push(&mut self, value: SqlValue) -> String {
		self.params.push(value);
		format!("${}", self.params.len())
	}
}

/// Escapes `%`, `_` and `\` so user text is matched literally by `ILIKE`.
pub fn like_pattern(text: &str) -> String {
	let mut escaped = String::with_capacity(text.len() + 2);
	escaped.push('%');
	for c in text.chars() {
		if matches!(c, '%' | '_' | '\\') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped.push('%');
	escaped
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
	haystack.to_lowercase().contains(&needle.to_lowercase())
}

pub fn eq_ignore_case(a: &str, b: &str) -> bool {
	a.to_lowercase() == b.to_lowercase()
}

impl CarQuery {
	pub fn offset(&self) -> i64 {
		(self.page - 1).saturating_mul(self.limit)
	}

	pub fn filter_sql(&self) -> SqlFilter {
		let mut filter = SqlFilter::default();
		let mut conditions = vec![format!("status = '{}'", CarStatus::Available.as_str())];

		if let Some(search) = &self.search {
			let p = filter.push(SqlValue::Text(like_pattern(search)));
			conditions.push(format!("(make ILIKE {p} OR model ILIKE {p} OR description ILIKE {p})"));
		}

		for (column, value) in [
			("make", &self.make),
			("body_type", &self.body_type),
			("fuel_type", &self.fuel_type),
			("transmission", &self.transmission),
		] {
			if let Some(value) = value {
				let p = filter.push(SqlValue::Text(value.clone()));
				conditions.push(format!("LOWER({column}) = LOWER({p})"));
			}
		}

		let p = filter.push(SqlValue::Float(self.min_price));
		conditions.push(format!("price >= {p}"));

		if let Some(max) = self.max_price {
			let p = filter.push(SqlValue::Float(max));
			conditions.push(format!("price <= {p}"));
		}

		filter.clause = conditions.join(" AND ");
		filter
	}

	/// `(count query, page query, params)`; the page query binds two extra
	/// trailing parameters for `LIMIT`/`OFFSET`.
	pub fn to_sql(&self) -> (String, String, SqlFilter) {
		let mut filter = self.filter_sql();
		let count = format!("SELECT COUNT(*) FROM cars WHERE {}", filter.clause);

		let limit = filter.push(SqlValue::Int(self.limit));
		let offset = filter.push(SqlValue::Int(self.offset()));
		let page = format!(
			"SELECT * FROM cars WHERE {} ORDER BY {} LIMIT {limit} OFFSET {offset}",
			filter.clause,
			self.sort.sql()
		);

		(count, page, filter)
	}

	pub fn matches(&self, car: &Car) -> bool {
		if car.status != CarStatus::Available {
			return false;
		}

		if let Some(search) = &self.search {
			let hit = contains_ignore_case(&car.make, search)
				|| contains_ignore_case(&car.model, search)
				|| contains_ignore_case(&car.description, search);
			if !hit {
				return false;
			}
		}

		let exact = [
			(&car.make, &self.make),
			(&car.body_type, &self.body_type),
			(&car.fuel_type, &self.fuel_type),
			(&car.transmission, &self.transmission),
		];
		if exact.iter().any(|(field, wanted)| wanted.as_ref().is_some_and(|w| !eq_ignore_case(field, w))) {
			return false;
		}

		car.price >= self.min_price && self.max_price.map_or(true, |max| car.price <= max)
	}
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Pagination {
	pub total: i64,
	pub page: i64,
	pub limit: i64,
	pub pages: i64,
}

impl Pagination {
	pub fn new(total: i64, page: i64, limit: i64) -> Self {
		let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
		Self { total, page, limit, pages }
	}
}
