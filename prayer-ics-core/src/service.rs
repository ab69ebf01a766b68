use std::sync::Arc;

use chrono::{Datelike, Local};

use crate::{
    AggregationResult, CalendarArtifact, Coordinates, Error, Result,
    aggregator::ScheduleAggregator,
    artifact::{ArtifactBuilder, DeliveryMode},
    config::AppConfig,
    location::{LocationResolver, NominatimResolver},
    normalize::DateNormalizer,
    providers::{ScheduleSource, aladhan::AladhanProvider, find_method},
};

/// 日历生成请求
#[derive(Debug, Clone)]
pub struct CalendarRequest {
    /// 地名
    pub location: String,
    /// 目标年份，默认当前年份
    pub year: Option<i32>,
    /// 计算方法，默认使用配置值
    pub method: Option<u32>,
    /// 直接给定坐标时跳过地名解析
    pub coordinates: Option<Coordinates>,
}

impl CalendarRequest {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            year: None,
            method: None,
            coordinates: None,
        }
    }

    /// 按坐标请求，地名可为空
    pub fn at(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            ..Self::new("")
        }
    }

    pub fn year(mut self, year: Option<i32>) -> Self {
        self.year = year;
        self
    }

    pub fn method(mut self, method: Option<u32>) -> Self {
        self.method = method;
        self
    }

    pub fn coordinates(mut self, coordinates: Option<Coordinates>) -> Self {
        self.coordinates = coordinates;
        self
    }

    /// 用于事件描述与日历名称的地点文本
    pub fn label(&self) -> String {
        match (self.location.trim(), self.coordinates) {
            ("", Some(c)) => format!("{:.4}, {:.4}", c.latitude, c.longitude),
            (location, _) => location.to_string(),
        }
    }
}

/// 地名 -> 全年礼拜时间 -> 日历产物
#[derive(Clone)]
pub struct CalendarService {
    config: Arc<AppConfig>,
    aggregator: ScheduleAggregator,
}

impl CalendarService {
    /// 使用配置中的 Nominatim 与 Aladhan 服务
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let resolver = NominatimResolver::new(
            config.geocoder.base_url.clone(),
            config.geocoder.api_key.clone(),
            config.geocoder.timeout,
        )?;
        Self::with_resolver(config, Arc::new(resolver))
    }

    /// 自定义地名解析（例如带缓存的解析器）
    pub fn with_resolver(config: AppConfig, resolver: Arc<dyn LocationResolver>) -> Result<Self> {
        let source =
            AladhanProvider::new(config.schedule.base_url.clone(), config.schedule.timeout)?;
        Ok(Self::new(config, resolver, Arc::new(source)))
    }

    pub fn new(
        config: AppConfig,
        resolver: Arc<dyn LocationResolver>,
        source: Arc<dyn ScheduleSource>,
    ) -> Self {
        let aggregator = ScheduleAggregator::new(
            resolver,
            source,
            DateNormalizer::new(config.date_order),
            config.method,
        )
        .with_policy(config.policy);

        Self {
            config: Arc::new(config),
            aggregator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 只做聚合，不生成产物
    pub async fn aggregate(&self, request: &CalendarRequest) -> Result<AggregationResult> {
        if let Some(c) = request.coordinates {
            if !(-90.0..=90.0).contains(&c.latitude) || !(-180.0..=180.0).contains(&c.longitude) {
                return Err(Error::Config(format!(
                    "coordinates out of range: {}, {}",
                    c.latitude, c.longitude
                )));
            }
        } else if request.location.trim().is_empty() {
            return Err(Error::Config("location must not be empty".to_string()));
        }

        let year = request.year.unwrap_or_else(|| Local::now().year());
        if !(1..=9999).contains(&year) {
            return Err(Error::Config(format!("invalid year: {}", year)));
        }

        let method = request.method.unwrap_or(self.config.method);
        if find_method(method).is_none() {
            tracing::warn!("Unknown calculation method {}, passing it through", method);
        }

        let aggregator = self.aggregator.clone().with_method(method);
        match request.coordinates {
            Some(coordinates) => {
                aggregator
                    .aggregate_at(coordinates, &request.label(), year)
                    .await
            }
            None => aggregator.aggregate(request.location.trim(), year).await,
        }
    }

    /// 生成日历产物，交付方式来自配置
    pub async fn generate(
        &self,
        request: &CalendarRequest,
        fallback_base_url: Option<&str>,
    ) -> Result<CalendarArtifact> {
        self.generate_with_mode(request, self.config.delivery.clone(), fallback_base_url)
            .await
    }

    /// 生成日历产物并指定交付方式
    pub async fn generate_with_mode(
        &self,
        request: &CalendarRequest,
        mode: DeliveryMode,
        fallback_base_url: Option<&str>,
    ) -> Result<CalendarArtifact> {
        let result = self.aggregate(request).await?;
        if !result.is_complete() {
            tracing::warn!(
                "Calendar for '{}' is incomplete: months {:?} failed, {} days rejected",
                request.label(),
                result
                    .failed_months
                    .iter()
                    .map(|f| f.month)
                    .collect::<Vec<_>>(),
                result.rejected_days
            );
        }

        let year = request.year.unwrap_or_else(|| Local::now().year());
        let calendar_name = format!("Prayer Times - {} {}", request.label(), year);
        let mut builder = ArtifactBuilder::new(mode, self.config.ics_options(Some(calendar_name)));
        if let Some(base) = fallback_base_url {
            builder = builder.with_fallback_base_url(base);
        }

        builder.build(&result.events).await
    }
}
