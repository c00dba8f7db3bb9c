use std::sync::Arc;

use log::info;

use crate::{
	ai::gemini::GeminiClient,
	config::Config,
	db_client::DbClient,
	images::ImageStore,
	rate_limit::RateLimiter,
	store::{MemoryStore, Store},
};

pub struct AppState {
	pub config: Config,
	pub store: Arc<dyn Store>,
	pub images: ImageStore,
	pub vision: Option<GeminiClient>,
	pub limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;

impl AppState {
	/// Connects to Postgres when `DATABASE_URL` is set, otherwise keeps data in memory.
	pub async fn new(config: Config) -> anyhow::Result<SharedState> {
		let store: Arc<dyn Store> = match &config.database_url {
			Some(url) => {
				let db = DbClient::connect(url).await?;
				db.migrate().await?;
				info!("Connected to Postgres");
				Arc::new(db)
			}
			None => Arc::new(MemoryStore::new()),
		};

		Ok(Self::with_store(config, store))
	}

	pub fn with_store(config: Config, store: Arc<dyn Store>) -> SharedState {
		let images = ImageStore::new(config.image_dir.clone(), &config.public_base_url);
		let vision = GeminiClient::from_config(&config.gemini);
		let limiter = RateLimiter::new(config.rate_limit);

		Arc::new(Self {
			config,
			store,
			images,
			vision,
			limiter,
		})
	}
}
