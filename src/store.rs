use std::path::{Path, PathBuf};
use std::time::Duration;

use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::error::{FetchError, StoreError};
use crate::model::{Collection, Cursor};

// ── Gateway ─────────────────────────────────────────────────────────────────

/// Backing store for a session's collection.
pub trait PersistenceGateway {
    fn load_collection(&self) -> Result<Collection, StoreError>;

    /// Write `collection`, optionally save the image of the candidate at
    /// `fetch_image`, and return the collection as re-read from the store.
    /// Image failures never fail the call.
    fn persist(
        &self,
        collection: &Collection,
        fetch_image: Option<Cursor>,
    ) -> Result<Collection, StoreError>;
}

pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

/// `{stem}_{seed}_{candidate}.jpg`, where `stem` is the store file name
/// without its extension.
pub fn image_file_name(store_path: &Path, cursor: Cursor) -> String {
    let stem = store_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();
    format!("{stem}_{}_{}.jpg", cursor.seed, cursor.candidate)
}

/// Read and parse a JSON store without a gateway around it.
pub fn read_collection(path: &Path) -> Result<Collection, StoreError> {
    let data = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Re-encode to JPEG unless the payload already is one.
fn to_jpeg(bytes: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    if matches!(image::guess_format(&bytes), Ok(ImageFormat::Jpeg)) {
        return Ok(bytes);
    }
    let decoded = image::load_from_memory(&bytes)?;
    let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
    let mut out = std::io::Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

// ── JSON file store ─────────────────────────────────────────────────────────

/// Collection stored as a single JSON array, images saved next to each other
/// in `image_dir`. Writes overwrite the whole file in place.
pub struct JsonFileStore<F> {
    path: PathBuf,
    image_dir: PathBuf,
    fetcher: F,
}

impl<F: ImageFetcher> JsonFileStore<F> {
    pub fn new(path: impl Into<PathBuf>, image_dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            path: path.into(),
            image_dir: image_dir.into(),
            fetcher,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image_path(&self, cursor: Cursor) -> PathBuf {
        self.image_dir.join(image_file_name(&self.path, cursor))
    }

    fn store_image(&self, collection: &Collection, cursor: Cursor) -> Result<PathBuf, FetchError> {
        let candidate = collection
            .get(cursor.seed)
            .and_then(|seed| seed.candidates().get(cursor.candidate))
            .ok_or(FetchError::MissingCandidate {
                seed: cursor.seed,
                candidate: cursor.candidate,
            })?;
        let url = candidate
            .extracted_image_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(FetchError::MissingUrl)?;

        debug!(url, "fetching image");
        let bytes = to_jpeg(self.fetcher.fetch(url)?)?;
        let path = self.image_path(cursor);
        std::fs::write(&path, bytes).map_err(|source| FetchError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl<F: ImageFetcher> PersistenceGateway for JsonFileStore<F> {
    fn load_collection(&self) -> Result<Collection, StoreError> {
        let collection = read_collection(&self.path)?;
        info!(path = %self.path.display(), seeds = collection.len(), "store loaded");
        Ok(collection)
    }

    fn persist(
        &self,
        collection: &Collection,
        fetch_image: Option<Cursor>,
    ) -> Result<Collection, StoreError> {
        let data = serde_json::to_string(collection).map_err(StoreError::Encode)?;
        std::fs::write(&self.path, data).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let reloaded = read_collection(&self.path)?;

        if let Some(cursor) = fetch_image {
            match self.store_image(collection, cursor) {
                Ok(path) => info!(path = %path.display(), "image saved"),
                Err(err) => warn!(
                    seed = cursor.seed,
                    candidate = cursor.candidate,
                    "image not saved: {err}"
                ),
            }
        }
        Ok(reloaded)
    }
}
