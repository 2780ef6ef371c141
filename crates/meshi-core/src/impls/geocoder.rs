//! Geocoder の実装
//!
//! - `GoogleGeocoder`: Geocoding API の `results[0].geometry.location`
//! - `CachingGeocoder`: 住所をキーに結果を blob store に残し、2 回目以降は API を呼ばない

use std::sync::Arc;

use async_trait::async_trait;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use serde::Deserialize;
use url::Url;

use crate::domain::errors::GeocodeError;
use crate::geo::LatLng;
use crate::impls::blob::child_path;
use crate::ports::{Geocoder, SecretSource};

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

pub struct GoogleGeocoder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Arc<dyn SecretSource>,
}

impl GoogleGeocoder {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, api_key: Arc<dyn SecretSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<LatLng, GeocodeError> {
        let key = self.api_key.fetch().await?;
        let url = Url::parse_with_params(&self.endpoint, &[("address", address), ("key", key.as_str())])
            .map_err(|e| GeocodeError::Http(Box::new(e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeocodeError::Http(Box::new(e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::Http(Box::new(e)))?;

        body.results
            .into_iter()
            .next()
            .map(|r| r.geometry.location)
            .ok_or_else(|| GeocodeError::NoResult(address.to_string()))
    }
}

/// 住所 -> 座標のキャッシュ
///
/// キャッシュの読み書きに失敗しても geocode 自体は続ける（ログだけ残す）。
pub struct CachingGeocoder {
    inner: Arc<dyn Geocoder>,
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl CachingGeocoder {
    pub fn new(inner: Arc<dyn Geocoder>, store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            store,
            prefix: prefix.into(),
        }
    }

    fn path(&self, address: &str) -> Path {
        child_path(&self.prefix, &[&format!("{address}.json")])
    }

    async fn cached(&self, path: &Path) -> Result<Option<LatLng>, GeocodeError> {
        match self.store.get(path).await {
            Ok(result) => {
                let bytes = result
                    .bytes()
                    .await
                    .map_err(|e| GeocodeError::Cache(Box::new(e)))?;
                let latlng =
                    serde_json::from_slice(&bytes).map_err(|e| GeocodeError::Cache(Box::new(e)))?;
                Ok(Some(latlng))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(GeocodeError::Cache(Box::new(e))),
        }
    }

    async fn remember(&self, path: &Path, latlng: LatLng) -> Result<(), GeocodeError> {
        let body = serde_json::to_vec(&latlng).map_err(|e| GeocodeError::Cache(Box::new(e)))?;
        self.store
            .put(path, PutPayload::from(body))
            .await
            .map_err(|e| GeocodeError::Cache(Box::new(e)))?;
        Ok(())
    }
}

#[async_trait]
impl Geocoder for CachingGeocoder {
    async fn geocode(&self, address: &str) -> Result<LatLng, GeocodeError> {
        let path = self.path(address);
        match self.cached(&path).await {
            Ok(Some(latlng)) => return Ok(latlng),
            Ok(None) => {}
            Err(e) => tracing::warn!(address, error = %e, "geocode cache read failed"),
        }
        let latlng = self.inner.geocode(address).await?;
        if let Err(e) = self.remember(&path, latlng).await {
            tracing::warn!(address, error = %e, "geocode cache write failed");
        }
        Ok(latlng)
    }
}
