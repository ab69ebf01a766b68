use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prayer_ics_core::prelude::*;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::cache::RedisCache;

/// 存储模式下产物的访问路径
pub const CALENDARS_ROUTE: &str = PUBLIC_ROUTE;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: CalendarService,
}

/// 健康检查响应
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// 错误响应
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// 日历请求参数，POST 请求体与 GET 查询共用
///
/// 同时给出 `latitude` 与 `longitude` 时跳过地名解析。
#[derive(Deserialize)]
struct PrayerTimesParams {
    #[serde(default)]
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    year: Option<i32>,
    method: Option<u32>,
}

impl TryFrom<PrayerTimesParams> for CalendarRequest {
    type Error = prayer_ics_core::Error;

    fn try_from(params: PrayerTimesParams) -> Result<Self, Self::Error> {
        let coordinates = match (params.latitude, params.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            (None, None) => None,
            _ => {
                return Err(prayer_ics_core::Error::Config(
                    "latitude and longitude must be given together".to_string(),
                ));
            }
        };

        Ok(CalendarRequest::new(params.location)
            .coordinates(coordinates)
            .year(params.year)
            .method(params.method))
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum PrayerTimesResponse {
    Inline {
        #[serde(rename = "iCalFile")]
        ical_file: String,
        message: String,
    },
    Stored {
        url: String,
        message: String,
    },
}

impl From<CalendarArtifact> for PrayerTimesResponse {
    fn from(artifact: CalendarArtifact) -> Self {
        match artifact {
            CalendarArtifact::Inline { content, message } => Self::Inline {
                ical_file: content,
                message,
            },
            CalendarArtifact::Stored {
                locator, message, ..
            } => Self::Stored {
                url: locator,
                message,
            },
        }
    }
}

pub async fn create_app(
    config: AppConfig,
    redis_url: Option<&str>,
) -> Result<Router, prayer_ics_core::Error> {
    let nominatim = Arc::new(NominatimResolver::new(
        config.geocoder.base_url.clone(),
        config.geocoder.api_key.clone(),
        config.geocoder.timeout,
    )?);

    let resolver: Arc<dyn LocationResolver> = match redis_url {
        Some(url) => {
            tracing::info!("Caching geocoding results in Redis: {}", url);
            let cache = RedisCache::new(url, None).await?;
            Arc::new(CachedResolver::new(nominatim, cache))
        }
        None => nominatim,
    };

    let service = CalendarService::with_resolver(config, resolver)?;
    Ok(router(AppState { service }))
}

pub fn router(state: AppState) -> Router {
    let artifact_dir = match state.service.config().delivery {
        DeliveryMode::Stored { ref dir, .. } => Some(dir.clone()),
        DeliveryMode::Inline => None,
    };

    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/api/prayer-times",
            get(download_calendar_handler).post(create_calendar_handler),
        )
        .route("/api/methods", get(list_methods_handler));

    if let Some(dir) = artifact_dir {
        router = router.nest_service(CALENDARS_ROUTE, ServeDir::new(dir));
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// 根路径处理器
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Prayer Times ICS Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Generate a yearly prayer-times calendar for any place",
        "endpoints": {
            "health": "/health",
            "prayer_times": "/api/prayer-times",
            "methods": "/api/methods",
            "calendars": CALENDARS_ROUTE
        }
    }))
}

/// 健康检查处理器
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// 列出计算方法
async fn list_methods_handler(State(state): State<AppState>) -> impl IntoResponse {
    let default_method = state.service.config().method;
    let methods: Vec<_> = CALCULATION_METHODS
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "name": m.name,
                "default": m.id == default_method
            })
        })
        .collect();

    Json(serde_json::json!({ "methods": methods }))
}

/// 生成日历，按配置直接返回内容或返回下载链接
async fn create_calendar_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<PrayerTimesParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = CalendarRequest::try_from(body)?;
    tracing::info!("生成日历: location={}, year={:?}", request.label(), request.year);

    let base_url = public_base_url(&headers, &uri);
    let artifact = state
        .service
        .generate(&request, base_url.as_deref())
        .await?;

    Ok(Json(PrayerTimesResponse::from(artifact)))
}

/// 直接下载ICS文件
async fn download_calendar_handler(
    State(state): State<AppState>,
    Query(params): Query<PrayerTimesParams>,
) -> Result<impl IntoResponse, AppError> {
    let request = CalendarRequest::try_from(params)?;
    let artifact = state
        .service
        .generate_with_mode(&request, DeliveryMode::Inline, None)
        .await?;

    let CalendarArtifact::Inline { content, .. } = artifact else {
        return Err(AppError(prayer_ics_core::Error::Internal(
            "inline delivery produced a stored artifact".to_string(),
        )));
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"prayer-times.ics\"".to_string(),
            ),
        ],
        content,
    ))
}

/// 由请求推导产物的公开地址，HTTP/2 请求没有 Host 头时使用 URI 中的 authority
fn public_base_url(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    Some(format!("{}://{}{}", scheme, host, CALENDARS_ROUTE))
}

/// 应用错误类型
#[derive(Debug)]
pub struct AppError(prayer_ics_core::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use prayer_ics_core::Error;

        let (status, error_message) = match &self.0 {
            Error::LocationNotFound(_) => (StatusCode::NOT_FOUND, "location not found"),
            Error::Config(_) => (StatusCode::BAD_REQUEST, "invalid request"),
            Error::Provider { .. } | Error::PartialFailure(_) | Error::Http(_) => {
                (StatusCode::BAD_GATEWAY, "upstream provider error")
            }
            Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "upstream timeout"),
            Error::IcsGeneration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "calendar generation failed")
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "error fetching prayer times or generating iCal file",
            ),
        };

        if status.is_server_error() {
            tracing::error!("{}: {}", error_message, self.0);
        }

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<prayer_ics_core::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
