use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Error, IcsOptions, Result,
    aggregator::PartialFailurePolicy,
    artifact::{DeliveryKind, DeliveryMode},
    location::NominatimResolver,
    normalize::DateOrder,
    providers::aladhan::AladhanProvider,
};

pub const DEFAULT_METHOD: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ARTIFACT_DIR: &str = "public/calendars";

/// 上游服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// 基础URL
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: u64,
}

/// 应用配置，进程启动时构建一次，之后只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// 礼拜时间 provider
    pub schedule: ProviderConfig,
    /// 地理编码服务
    pub geocoder: ProviderConfig,
    /// 默认计算方法
    pub method: u32,
    pub date_order: DateOrder,
    pub delivery: DeliveryMode,
    pub policy: PartialFailurePolicy,
    /// 事件时长（分钟）
    pub event_duration_minutes: u32,
    pub reminder_minutes: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schedule: ProviderConfig {
                base_url: AladhanProvider::DEFAULT_BASE_URL.to_string(),
                api_key: None,
                timeout: DEFAULT_TIMEOUT_SECS,
            },
            geocoder: ProviderConfig {
                base_url: NominatimResolver::DEFAULT_BASE_URL.to_string(),
                api_key: None,
                timeout: DEFAULT_TIMEOUT_SECS,
            },
            method: DEFAULT_METHOD,
            date_order: DateOrder::default(),
            delivery: DeliveryMode::default(),
            policy: PartialFailurePolicy::default(),
            event_duration_minutes: IcsOptions::default().event_duration_minutes,
            reminder_minutes: None,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取配置，空值视为未设置
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        let timeout = parse_or(get("REQUEST_TIMEOUT_SECS"), "REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        config.schedule.timeout = timeout;
        if let Some(url) = get("ALADHAN_BASE_URL") {
            config.schedule.base_url = url;
        }

        config.geocoder.timeout = timeout;
        if let Some(url) = get("GEOCODER_BASE_URL") {
            config.geocoder.base_url = url;
        }
        config.geocoder.api_key = get("GEOCODER_API_KEY");

        config.method = parse_or(get("CALCULATION_METHOD"), "CALCULATION_METHOD", DEFAULT_METHOD)?;
        config.date_order = parse_or(get("DATE_ORDER"), "DATE_ORDER", DateOrder::default())?;
        config.policy = parse_or(
            get("PARTIAL_FAILURE_POLICY"),
            "PARTIAL_FAILURE_POLICY",
            PartialFailurePolicy::default(),
        )?;
        config.event_duration_minutes = parse_or(
            get("EVENT_DURATION_MINUTES"),
            "EVENT_DURATION_MINUTES",
            config.event_duration_minutes,
        )?;
        config.reminder_minutes = get("REMINDER_MINUTES")
            .map(|v| parse_value(&v, "REMINDER_MINUTES"))
            .transpose()?;

        config.delivery = match parse_or(get("DELIVERY_MODE"), "DELIVERY_MODE", DeliveryKind::Inline)? {
            DeliveryKind::Inline => DeliveryMode::Inline,
            DeliveryKind::Stored => DeliveryMode::Stored {
                dir: PathBuf::from(
                    get("ARTIFACT_DIR").unwrap_or_else(|| DEFAULT_ARTIFACT_DIR.to_string()),
                ),
                public_base_url: get("PUBLIC_BASE_URL"),
            },
        };

        Ok(config)
    }

    /// 由配置生成ICS选项
    pub fn ics_options(&self, calendar_name: Option<String>) -> IcsOptions {
        IcsOptions {
            calendar_name,
            event_duration_minutes: self.event_duration_minutes,
            reminder_minutes: self.reminder_minutes,
            ..IcsOptions::default()
        }
    }
}

fn parse_value<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, value, e)))
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse_value(&v, key))
}
