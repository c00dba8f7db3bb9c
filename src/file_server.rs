use axum::{
	body::Body,
	extract::State,
	http::header::{CACHE_CONTROL, CONTENT_TYPE},
	response::{IntoResponse, Response},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::{
	error::{AppError, AppResult},
	extract::Path,
	images::content_type_for,
	state::SharedState,
};

/// `GET /images/*path`, streamed from the image directory.
pub async fn file_handler(State(state): State<SharedState>, Path(path): Path<String>) -> AppResult<Response> {
	let full_path = state.images.resolve(&path).ok_or_else(|| AppError::bad_request("Invalid image path"))?;

	let stream = read_file_stream(&full_path)
		.await
		.ok_or_else(|| AppError::not_found("Image not found"))?;

	Ok((
		[(CONTENT_TYPE, content_type_for(&full_path)), (CACHE_CONTROL, "public, max-age=86400")],
		Body::from_stream(stream),
	)
		.into_response())
}

pub async fn read_file_stream(path: &std::path::Path) -> Option<ReaderStream<File>> {
	let file = File::open(path).await.ok()?;
	let metadata = file.metadata().await.ok()?;
	metadata.is_file().then(|| ReaderStream::new(file))
}
