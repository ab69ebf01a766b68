use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    Coordinates, Result,
    cache::{Cache, CacheBackend},
    providers::{BaseProvider, BaseProviderBuilder, ProviderInfo},
};

/// 地名解析
#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Resolve a place name to coordinates.
    ///
    /// `Ok(None)` means the geocoder answered without a match. A geocoder
    /// that cannot be reached or answers garbage is an `Err`.
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>>;
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

/// Nominatim 兼容的地理编码服务（OpenStreetMap / LocationIQ）
pub struct NominatimResolver {
    base: BaseProvider,
    base_url: String,
    api_key: Option<String>,
}

impl NominatimResolver {
    pub const DEFAULT_BASE_URL: &'static str = "https://nominatim.openstreetmap.org";

    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let base = BaseProviderBuilder::new_with_timeout(
            ProviderInfo {
                name: "nominatim".to_string(),
            },
            timeout_secs,
        )
        .build()?;

        Ok(Self {
            base,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl LocationResolver for NominatimResolver {
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>> {
        let place = place.trim();
        if place.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/search", self.base_url);
        let mut request = self
            .base
            .client
            .get(&url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")]);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(BaseProvider::request_error)?;

        if !response.status().is_success() {
            tracing::warn!(
                "Geocoding '{}' returned HTTP {}",
                place,
                response.status()
            );
            return Ok(None);
        }

        let body = response.text().await.map_err(BaseProvider::request_error)?;
        let hits: Vec<SearchHit> = serde_json::from_str(&body)
            .map_err(|e| self.base.custom_error(format!("bad geocoding body: {}", e)))?;

        let Some(hit) = hits.into_iter().next() else {
            tracing::info!("No geocoding match for '{}'", place);
            return Ok(None);
        };

        let (Ok(latitude), Ok(longitude)) = (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) else {
            return Err(self.base.custom_error(format!(
                "unparseable coordinates for '{}': {} {}",
                place, hit.lat, hit.lon
            )));
        };

        Ok(Some(Coordinates {
            latitude,
            longitude,
        }))
    }
}

/// 带缓存的地名解析
///
/// 只缓存成功解析的坐标，未匹配的结果每次都会重新查询。
pub struct CachedResolver<C: CacheBackend> {
    inner: Arc<dyn LocationResolver>,
    cache: C,
    ttl: Duration,
}

impl<C: CacheBackend> CachedResolver<C> {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

    pub fn new(inner: Arc<dyn LocationResolver>, cache: C) -> Self {
        Self {
            inner,
            cache,
            ttl: Self::DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn cache_key(place: &str) -> String {
        format!("geo:{}", place.trim().to_lowercase())
    }
}

#[async_trait]
impl<C: CacheBackend> LocationResolver for CachedResolver<C> {
    async fn resolve(&self, place: &str) -> Result<Option<Coordinates>> {
        let key = Self::cache_key(place);

        match self.cache.get::<Coordinates>(&key).await {
            Ok(Some(coordinates)) => {
                tracing::debug!("命中地理编码缓存: {}", key);
                return Ok(Some(coordinates));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Geocoding cache read failed: {}", e),
        }

        let resolved = self.inner.resolve(place).await?;
        if let Some(ref coordinates) = resolved {
            if let Err(e) = self.cache.set(&key, coordinates, self.ttl).await {
                tracing::warn!("Geocoding cache write failed: {}", e);
            }
        }

        Ok(resolved)
    }
}
