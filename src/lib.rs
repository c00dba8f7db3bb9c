//! Car marketplace backend: listings with search and a wishlist, test-drive
//! booking against the dealership's working hours, an admin area for
//! inventory, bookings and users, and photo-based listing extraction.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
	extract::DefaultBodyLimit,
	routing::{get, patch, post, put},
	Router,
};
use log::{debug, error, info};
use tokio::{
	net::TcpListener,
	signal::{
		ctrl_c,
		unix::{signal, SignalKind},
	},
};
use tower_http::cors::CorsLayer;

pub mod ai;
pub mod auth;
pub mod cars;
pub mod config;
pub mod dashboard;
pub mod db_client;
pub mod error;
pub mod extract;
pub mod file_server;
pub mod images;
pub mod rate_limit;
pub mod response;
pub mod settings;
pub mod state;
pub mod store;
pub mod test_drive;
pub mod users;

use ai::extract::{ai_extract, image_search};
use cars::{
	cars::{add_car, delete_car, list_cars, update_car},
	emi::car_emi,
	listing::{car_filters, featured_cars, get_car, get_cars, suggest},
	saved::{saved_cars, toggle_saved_car},
};
use config::Config;
use dashboard::dashboard;
use error::AppError;
use file_server::file_handler;
use settings::{get_dealership, save_working_hours};
use state::{AppState, SharedState};
use test_drive::{
	admin::{list_test_drives, update_test_drive_status},
	booking::{book_test_drive, cancel_test_drive, user_test_drives},
	slots::test_drive_slots,
};
use users::{list_users, me, update_user_role};

pub fn router(state: SharedState) -> Router {
	let body_limit = state.config.max_upload_bytes;

	Router::new()
		.route("/me", get(me))
		.route("/cars", get(get_cars))
		.route("/cars/filters", get(car_filters))
		.route("/cars/featured", get(featured_cars))
		.route("/cars/suggest", get(suggest))
		.route("/cars/image-search", post(image_search))
		.route("/cars/:id", get(get_car))
		.route("/cars/:id/emi", get(car_emi))
		.route("/cars/:id/save", post(toggle_saved_car))
		.route("/cars/:id/test-drive-slots", get(test_drive_slots))
		.route("/saved-cars", get(saved_cars))
		.route("/test-drives", get(user_test_drives).post(book_test_drive))
		.route("/test-drives/:id/cancel", post(cancel_test_drive))
		.route("/admin/dashboard", get(dashboard))
		.route("/admin/cars", get(list_cars).post(add_car))
		.route("/admin/cars/ai-extract", post(ai_extract))
		.route("/admin/cars/:id", patch(update_car).delete(delete_car))
		.route("/admin/test-drives", get(list_test_drives))
		.route("/admin/test-drives/:id", patch(update_test_drive_status))
		.route("/admin/users", get(list_users))
		.route("/admin/users/:id/role", patch(update_user_role))
		.route("/admin/settings/dealership", get(get_dealership))
		.route("/admin/settings/working-hours", put(save_working_hours))
		.route("/images/*path", get(file_handler))
		.fallback(route_not_found)
		.layer(DefaultBodyLimit::max(body_limit))
		.layer(CorsLayer::permissive())
		.with_state(state)
}

async fn route_not_found() -> AppError {
	AppError::not_found("Route not found")
}

pub async fn start_server() -> anyhow::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let config = Config::load()?;
	tokio::fs::create_dir_all(&config.image_dir)
		.await
		.with_context(|| format!("failed to create image directory {}", config.image_dir.display()))?;

	info!("Initializing state...");
	let state = AppState::new(config).await?;
	spawn_limiter_sweep(state.clone());

	let address = format!("0.0.0.0:{}", state.config.port);
	let listener = TcpListener::bind(&address)
		.await
		.with_context(|| format!("failed to bind {address}"))?;
	info!("Server running on {address}");

	axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	info!("Server shut down");
	Ok(())
}

fn spawn_limiter_sweep(state: SharedState) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(rate_limit::SWEEP_INTERVAL);
		loop {
			ticker.tick().await;
			let evicted = state.limiter.evict_idle();
			if evicted > 0 {
				debug!("Evicted {evicted} idle rate limit buckets");
			}
		}
	});
}

async fn shutdown_signal() {
	let ctrl_c = async {
		match ctrl_c().await {
			Ok(()) => info!("Received Ctrl+C, shutting down"),
			Err(e) => {
				error!("Failed to install Ctrl+C handler: {e}");
				std::future::pending::<()>().await;
			}
		}
	};

	let terminate = async {
		match signal(SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
				info!("Received terminate signal, shutting down");
			}
			Err(e) => {
				error!("Failed to install signal handler: {e}");
				std::future::pending::<()>().await;
			}
		}
	};

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
