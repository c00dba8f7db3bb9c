//! Request extractors that reject with the `{success:false,error}` envelope
//! instead of axum's plain-text bodies.

use axum::{
	async_trait,
	extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
	http::request::Parts,
	Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub struct Path<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Path<T>
where
	T: DeserializeOwned + Send,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		let axum::extract::Path(value) = axum::extract::Path::<T>::from_request_parts(parts, state)
			.await
			.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
		Ok(Path(value))
	}
}

pub struct Query<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Query<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		let axum::extract::Query(value) = axum::extract::Query::<T>::from_request_parts(parts, state)
			.await
			.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
		Ok(Query(value))
	}
}

/// A JSON request body. Responses keep using `axum::Json`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
	Json<T>: FromRequest<S, Rejection = JsonRejection>,
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let Json(value) = Json::<T>::from_request(req, state).await.map_err(json_error)?;
		Ok(JsonBody(value))
	}
}

fn json_error(rejection: JsonRejection) -> AppError {
	match rejection {
		JsonRejection::MissingJsonContentType(_) => AppError::bad_request("Expected a JSON request body"),
		other => AppError::BadRequest(other.body_text()),
	}
}

pub struct MultipartForm(pub axum::extract::Multipart);

#[async_trait]
impl<S> FromRequest<S> for MultipartForm
where
	S: Send + Sync,
{
	type Rejection = AppError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		axum::extract::Multipart::from_request(req, state)
			.await
			.map(MultipartForm)
			.map_err(|rejection| AppError::BadRequest(rejection.body_text()))
	}
}

#[cfg(test)]
mod tests {
	use axum::{
		body::Body,
		http::{self, header::CONTENT_TYPE},
	};

	use super::*;

	#[derive(serde::Deserialize, Debug)]
	struct Change {
		#[allow(dead_code)]
		status: String,
	}

	#[tokio::test]
	async fn malformed_json_is_a_bad_request() {
		let req = http::Request::builder()
			.header(CONTENT_TYPE, "application/json")
			.body(Body::from("{\"status\":"))
			.unwrap();
		let err = JsonBody::<Change>::from_request(req, &()).await.err().unwrap();
		assert!(matches!(err, AppError::BadRequest(_)));
	}

	#[tokio::test]
	async fn missing_content_type_is_a_bad_request() {
		let req = http::Request::builder().body(Body::from("{\"status\":\"SOLD\"}")).unwrap();
		let err = JsonBody::<Change>::from_request(req, &()).await.err().unwrap();
		assert_eq!(err.to_string(), "Expected a JSON request body");
	}

	#[tokio::test]
	async fn bad_query_values_are_a_bad_request() {
		#[derive(serde::Deserialize, Debug)]
		struct Page {
			#[allow(dead_code)]
			page: i64,
		}

		let (mut parts, _) = http::Request::builder().uri("/cars?page=abc").body(()).unwrap().into_parts();
		let err = Query::<Page>::from_request_parts(&mut parts, &()).await.err().unwrap();
		assert!(matches!(err, AppError::BadRequest(_)));

		let (mut parts, _) = http::Request::builder().uri("/cars?page=2").body(()).unwrap().into_parts();
		let Query(page) = Query::<Page>::from_request_parts(&mut parts, &()).await.unwrap();
		assert_eq!(page.page, 2);
	}
}
