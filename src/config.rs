use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context};
use log::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
	pub port: u16,
	pub database_url: Option<String>,
	pub jwt_secret: String,
	pub admin_emails: Vec<String>,
	pub image_dir: PathBuf,
	pub public_base_url: String,
	pub gemini: GeminiConfig,
	pub rate_limit: RateLimitConfig,
	pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
	pub api_key: Option<String>,
	pub model: String,
	pub base_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
	pub capacity: u32,
	pub refill: u32,
	pub interval: Duration,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			capacity: 10,
			refill: 10,
			interval: Duration::from_secs(3600),
		}
	}
}

impl Config {
	pub fn load() -> anyhow::Result<Self> {
		if dotenvy::dotenv().is_ok() {
			info!("Loaded environment from .env");
		}

		let port: u16 = try_load("PORT", "4000")?;
		let jwt_secret = var("AUTH_JWT_SECRET").ok_or_else(|| anyhow!("AUTH_JWT_SECRET must be set"))?;

		let database_url = var("DATABASE_URL");
		if database_url.is_none() {
			warn!("DATABASE_URL not set, data will only live in memory");
		}

		let admin_emails = var("ADMIN_EMAILS").map(|list| parse_email_list(&list)).unwrap_or_default();

		let public_base_url = var("PUBLIC_BASE_URL")
			.unwrap_or_else(|| format!("http://localhost:{port}"))
			.trim_end_matches('/')
			.to_string();

		let gemini_api_key = var("GEMINI_API_KEY");
		if gemini_api_key.is_none() {
			warn!("GEMINI_API_KEY not set, AI features are disabled");
		}

		Ok(Self {
			port,
			database_url,
			jwt_secret,
			admin_emails,
			image_dir: try_load("IMAGE_DIR", "images")?,
			public_base_url,
			gemini: GeminiConfig {
				api_key: gemini_api_key,
				model: try_load("GEMINI_MODEL", "gemini-1.5-flash")?,
				base_url: try_load("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com")?,
			},
			rate_limit: RateLimitConfig {
				capacity: try_load("RATE_LIMIT_CAPACITY", "10")?,
				refill: try_load("RATE_LIMIT_REFILL", "10")?,
				interval: Duration::from_secs(try_load("RATE_LIMIT_INTERVAL_SECS", "3600")?),
			},
			max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "20971520")?,
		})
	}

	pub fn is_admin_email(&self, email: &str) -> bool {
		self.admin_emails.iter().any(|admin| admin.eq_ignore_ascii_case(email.trim()))
	}
}

fn var(key: &str) -> Option<String> {
	env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
	T::Err: Display,
{
	let raw = var(key).unwrap_or_else(|| {
		info!("{key} not set, using default: {default}");
		default.to_string()
	});

	raw.trim()
		.parse()
		.map_err(|e| anyhow!("{e}"))
		.with_context(|| format!("Invalid {key} value: {raw}"))
}

fn parse_email_list(list: &str) -> Vec<String> {
	list.split(',')
		.map(|email| email.trim().to_lowercase())
		.filter(|email| !email.is_empty())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admin_list_is_trimmed_and_case_insensitive() {
		let emails = parse_email_list(" Boss@Example.com, ,ops@example.com ");
		assert_eq!(emails, vec!["boss@example.com", "ops@example.com"]);

		let config = Config {
			port: 4000,
			database_url: None,
			jwt_secret: "secret".into(),
			admin_emails: emails,
			image_dir: PathBuf::from("images"),
			public_base_url: "http://localhost:4000".into(),
			gemini: GeminiConfig {
				api_key: None,
				model: "gemini-1.5-flash".into(),
				base_url: "http://localhost".into(),
			},
			rate_limit: RateLimitConfig::default(),
			max_upload_bytes: 1024,
		};
		assert!(config.is_admin_email("BOSS@example.com"));
		assert!(!config.is_admin_email("guest@example.com"));
	}
}
