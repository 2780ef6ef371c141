//! Geocoder port - 住所から座標へ

use async_trait::async_trait;

use crate::domain::errors::GeocodeError;
use crate::geo::LatLng;

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<LatLng, GeocodeError>;
}
