use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor},
};

use crate::{
    Coordinates, RawDailySchedule, Result,
    providers::{BaseProvider, BaseProviderBuilder, FetchFailure, ProviderInfo, ScheduleSource},
};

/// Aladhan 响应外层，只读取状态码
#[derive(Debug, Deserialize)]
struct AladhanEnvelope {
    code: u16,
}

/// 成功响应，`data` 直接从原文反序列化以保留键顺序
#[derive(Debug, Deserialize)]
struct AladhanCalendar {
    data: Vec<AladhanDay>,
}

/// 失败响应，`data` 通常是错误信息字符串
#[derive(Debug, Deserialize)]
struct AladhanError {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AladhanDay {
    timings: OrderedTimings,
    date: AladhanDate,
}

#[derive(Debug, Deserialize)]
struct AladhanDate {
    gregorian: GregorianDate,
}

#[derive(Debug, Deserialize)]
struct GregorianDate {
    /// DD-MM-YYYY
    date: String,
}

/// 保持JSON对象键顺序的时间表
#[derive(Debug, Default)]
struct OrderedTimings(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedTimings {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TimingsVisitor;

        impl<'de> Visitor<'de> for TimingsVisitor {
            type Value = OrderedTimings;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of prayer names to time strings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(11));
                while let Some((name, time)) = map.next_entry::<String, String>()? {
                    entries.push((name, time));
                }
                Ok(OrderedTimings(entries))
            }
        }

        deserializer.deserialize_map(TimingsVisitor)
    }
}

impl From<AladhanDay> for RawDailySchedule {
    fn from(day: AladhanDay) -> Self {
        Self {
            date: day.date.gregorian.date,
            timings: day.timings.0,
        }
    }
}

/// Aladhan 月度日历 provider
pub struct AladhanProvider {
    base: BaseProvider,
    base_url: String,
}

impl AladhanProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.aladhan.com";

    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let base = BaseProviderBuilder::new_with_timeout(
            ProviderInfo {
                name: "aladhan".to_string(),
            },
            timeout_secs,
        )
        .build()?;

        Ok(Self {
            base,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn calendar_url(&self, month: u32, year: i32) -> String {
        format!("{}/v1/calendar/{}/{}", self.base_url, year, month)
    }

    fn parse_body(&self, body: &str) -> std::result::Result<Vec<RawDailySchedule>, FetchFailure> {
        let envelope: AladhanEnvelope =
            serde_json::from_str(body).map_err(|e| FetchFailure::Malformed(e.to_string()))?;

        if envelope.code != 200 {
            let status = StatusCode::from_u16(envelope.code).unwrap_or(StatusCode::BAD_GATEWAY);
            let data = serde_json::from_str::<AladhanError>(body)
                .map(|e| e.data)
                .unwrap_or_default();
            let message = data
                .as_str()
                .map_or_else(|| data.to_string(), str::to_string);
            return Err(self.base.classify_status(status, &message));
        }

        let calendar: AladhanCalendar =
            serde_json::from_str(body).map_err(|e| FetchFailure::Malformed(e.to_string()))?;

        Ok(calendar.data.into_iter().map(RawDailySchedule::from).collect())
    }
}

#[async_trait]
impl ScheduleSource for AladhanProvider {
    fn name(&self) -> &str {
        &self.base.info.name
    }

    async fn fetch_month(
        &self,
        coordinates: &Coordinates,
        method: u32,
        month: u32,
        year: i32,
    ) -> std::result::Result<Vec<RawDailySchedule>, FetchFailure> {
        let url = self.calendar_url(month, year);
        tracing::debug!("Fetching {}-{:02} from {}", year, month, url);

        let response = self
            .base
            .client
            .get(&url)
            .query(&[
                ("latitude", coordinates.latitude.to_string()),
                ("longitude", coordinates.longitude.to_string()),
                ("method", method.to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.base.classify_request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.base.classify_request_error(&e))?;

        if !status.is_success() {
            return Err(self.base.classify_status(status, &body));
        }

        self.parse_body(&body)
    }
}
