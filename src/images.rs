use std::path::{Component, Path, PathBuf};

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::Utc;
use image::ImageFormat;
use log::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// An uploaded file part.
#[derive(Debug, Clone)]
pub struct Upload {
	pub content_type: Option<String>,
	pub data: Bytes,
}

impl Upload {
	/// The part's mime type if it declares an image, else sniffed from the bytes.
	pub fn mime_type(&self) -> String {
		match self.content_type.as_deref().filter(|ct| ct.starts_with("image/")) {
			Some(ct) => ct.to_string(),
			None => image::guess_format(&self.data)
				.map(|format| format.to_mime_type().to_string())
				.unwrap_or_else(|_| "image/jpeg".to_string()),
		}
	}

	pub fn extension(&self) -> String {
		let mime = self.mime_type();
		let ext = mime.trim_start_matches("image/");
		let ext: String = ext.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
		if ext.is_empty() {
			"jpeg".to_string()
		} else {
			ext
		}
	}

	pub fn is_image(&self) -> bool {
		image::load_from_memory(&self.data).is_ok()
	}
}

/// Car photos on local disk, served back under `/images/`.
#[derive(Debug, Clone)]
pub struct ImageStore {
	root: PathBuf,
	public_base_url: String,
}

impl ImageStore {
	pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
		Self {
			root: root.into(),
			public_base_url: public_base_url.trim_end_matches('/').to_string(),
		}
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn public_url(&self, relative: &str) -> String {
		format!("{}/images/{}", self.public_base_url, relative)
	}

	/// Resolves a request path under the root, refusing anything that escapes it.
	pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
		let relative = Path::new(relative);
		if relative.as_os_str().is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
			return None;
		}
		Some(self.root.join(relative))
	}

	fn car_dir(&self, car_id: Uuid) -> PathBuf {
		self.root.join("cars").join(car_id.to_string())
	}

	/// Writes every decodable upload to `cars/<car id>/` and returns their
	/// public URLs in upload order. Parts that are not images are skipped.
	pub async fn save_car_images(&self, car_id: Uuid, uploads: &[Upload]) -> AppResult<Vec<String>> {
		let dir = self.car_dir(car_id);
		let mut urls = Vec::with_capacity(uploads.len());

		for (index, upload) in uploads.iter().enumerate() {
			if upload.data.is_empty() || !upload.is_image() {
				warn!("Skipping invalid image data for car {car_id} (part {index})");
				continue;
			}

			if urls.is_empty() {
				tokio::fs::create_dir_all(&dir)
					.await
					.map_err(|e| anyhow::anyhow!("failed to create {}: {e}", dir.display()))?;
			}

			let file_name = format!("image-{}-{}.{}", Utc::now().timestamp_millis(), index, upload.extension());
			let path = dir.join(&file_name);
			if let Err(e) = tokio::fs::write(&path, &upload.data).await {
				self.delete_car_images(car_id).await;
				return Err(AppError::Internal(anyhow::anyhow!("Failed to upload image: {e}")));
			}

			urls.push(self.public_url(&format!("cars/{car_id}/{file_name}")));
		}

		if !urls.is_empty() {
			info!("Stored {} image(s) for car {car_id}", urls.len());
		}
		Ok(urls)
	}

	pub async fn delete_car_images(&self, car_id: Uuid) {
		let dir = self.car_dir(car_id);
		match tokio::fs::remove_dir_all(&dir).await {
			Ok(()) => {}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
			Err(e) => warn!("Failed to remove {}: {e}", dir.display()),
		}
	}
}

/// Pulls the `image` part (or the first file part) out of a multipart body.
pub async fn read_image_field(multipart: &mut Multipart) -> AppResult<Upload> {
	loop {
		let field = multipart
			.next_field()
			.await
			.map_err(|e| AppError::bad_request(format!("Invalid upload: {e}")))?
			.ok_or_else(|| AppError::bad_request("An image file is required"))?;

		if field.name() != Some("image") && field.file_name().is_none() {
			continue;
		}

		let content_type = field.content_type().map(str::to_owned);
		let data = field.bytes().await.map_err(|e| AppError::bad_request(format!("Failed to read image: {e}")))?;
		let upload = Upload { content_type, data };

		if !upload.is_image() {
			return Err(AppError::bad_request("The uploaded file is not a valid image"));
		}
		return Ok(upload);
	}
}

pub fn content_type_for(path: &Path) -> &'static str {
	path.extension()
		.and_then(|ext| ext.to_str())
		.and_then(ImageFormat::from_extension)
		.map(|format| format.to_mime_type())
		.unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use image::{DynamicImage, RgbImage};

	use super::*;

	fn png() -> Bytes {
		let mut buf = Cursor::new(Vec::new());
		DynamicImage::ImageRgb8(RgbImage::new(2, 2)).write_to(&mut buf, ImageFormat::Png).unwrap();
		Bytes::from(buf.into_inner())
	}

	#[test]
	fn extension_prefers_declared_type_then_sniffing() {
		let declared = Upload {
			content_type: Some("image/webp".into()),
			data: png(),
		};
		assert_eq!(declared.extension(), "webp");

		let sniffed = Upload {
			content_type: Some("application/octet-stream".into()),
			data: png(),
		};
		assert_eq!(sniffed.extension(), "png");

		let svg = Upload {
			content_type: Some("image/svg+xml".into()),
			data: Bytes::from_static(b"<svg/>"),
		};
		assert_eq!(svg.extension(), "svg");
	}

	#[test]
	fn resolve_refuses_escaping_paths() {
		let store = ImageStore::new("/srv/images", "http://cdn/");
		assert_eq!(store.resolve("cars/a/b.png"), Some(PathBuf::from("/srv/images/cars/a/b.png")));
		assert_eq!(store.resolve("../etc/passwd"), None);
		assert_eq!(store.resolve("/etc/passwd"), None);
		assert_eq!(store.resolve("cars/./a.png"), Some(PathBuf::from("/srv/images/cars/a.png")));
		assert_eq!(store.resolve(""), None);
		assert_eq!(store.public_url("cars/a/b.png"), "http://cdn/images/cars/a/b.png");
	}

	#[tokio::test]
	async fn only_decodable_uploads_are_written() {
		let dir = tempfile::tempdir().unwrap();
		let store = ImageStore::new(dir.path(), "http://localhost:4000");
		let car_id = Uuid::new_v4();

		let uploads = vec![
			Upload {
				content_type: Some("image/png".into()),
				data: png(),
			},
			Upload {
				content_type: Some("image/png".into()),
				data: Bytes::from_static(b"definitely not a png"),
			},
		];
		let urls = store.save_car_images(car_id, &uploads).await.unwrap();
		assert_eq!(urls.len(), 1);
		assert!(urls[0].starts_with(&format!("http://localhost:4000/images/cars/{car_id}/image-")));
		assert!(urls[0].ends_with("-0.png"));

		let files: Vec<_> = std::fs::read_dir(dir.path().join("cars").join(car_id.to_string())).unwrap().collect();
		assert_eq!(files.len(), 1);

		store.delete_car_images(car_id).await;
		assert!(!dir.path().join("cars").join(car_id.to_string()).exists());
		// deleting twice is fine
		store.delete_car_images(car_id).await;
	}

	#[test]
	fn served_files_get_an_image_content_type() {
		assert_eq!(content_type_for(Path::new("a/b.png")), "image/png");
		assert_eq!(content_type_for(Path::new("a/b.JPG")), "image/jpeg");
		assert_eq!(content_type_for(Path::new("a/b.txt")), "application/octet-stream");
	}
}
