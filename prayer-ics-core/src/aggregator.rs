use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    AggregationResult, Coordinates, Error, MonthFailure, PrayerEvent, RawDailySchedule, Result,
    location::LocationResolver,
    normalize::DateNormalizer,
    providers::{FetchFailure, ScheduleSource},
};

/// 部分失败的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialFailurePolicy {
    /// 跳过失败的月份/日期，继续聚合
    #[default]
    Tolerate,
    /// 任一月份或日期失败即终止
    Abort,
}

impl FromStr for PartialFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tolerate" | "fail-open" => Ok(Self::Tolerate),
            "abort" | "fail-closed" => Ok(Self::Abort),
            other => Err(format!(
                "unknown partial failure policy '{}', expected tolerate or abort",
                other
            )),
        }
    }
}

impl fmt::Display for PartialFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tolerate => f.write_str("tolerate"),
            Self::Abort => f.write_str("abort"),
        }
    }
}

/// 单月获取结果
#[derive(Debug)]
pub enum MonthOutcome {
    Fetched(Vec<RawDailySchedule>),
    Skipped(FetchFailure),
}

impl From<std::result::Result<Vec<RawDailySchedule>, FetchFailure>> for MonthOutcome {
    fn from(result: std::result::Result<Vec<RawDailySchedule>, FetchFailure>) -> Self {
        match result {
            Ok(days) => Self::Fetched(days),
            Err(failure) => Self::Skipped(failure),
        }
    }
}

/// 全年时间表聚合器
#[derive(Clone)]
pub struct ScheduleAggregator {
    resolver: Arc<dyn LocationResolver>,
    source: Arc<dyn ScheduleSource>,
    normalizer: DateNormalizer,
    method: u32,
    policy: PartialFailurePolicy,
}

impl ScheduleAggregator {
    pub fn new(
        resolver: Arc<dyn LocationResolver>,
        source: Arc<dyn ScheduleSource>,
        normalizer: DateNormalizer,
        method: u32,
    ) -> Self {
        Self {
            resolver,
            source,
            normalizer,
            method,
            policy: PartialFailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PartialFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_method(mut self, method: u32) -> Self {
        self.method = method;
        self
    }

    pub const fn method(&self) -> u32 {
        self.method
    }

    /// 聚合指定地点全年的礼拜时间
    ///
    /// 地点无法解析时立即返回 [`Error::LocationNotFound`]，不会发出任何月度请求。
    /// 之后按 1 到 12 月依次获取，失败的月份与日期按 [`PartialFailurePolicy`] 处理。
    pub async fn aggregate(&self, location: &str, year: i32) -> Result<AggregationResult> {
        let coordinates = self
            .resolver
            .resolve(location)
            .await?
            .ok_or_else(|| Error::LocationNotFound(location.to_string()))?;

        self.aggregate_at(coordinates, location, year).await
    }

    /// 跳过地名解析，直接按坐标聚合，`location` 只用于事件描述
    pub async fn aggregate_at(
        &self,
        coordinates: Coordinates,
        location: &str,
        year: i32,
    ) -> Result<AggregationResult> {
        tracing::info!(
            "开始聚合 {} ({:.4}, {:.4}) {}年, method={}, source={}",
            location,
            coordinates.latitude,
            coordinates.longitude,
            year,
            self.method,
            self.source.name()
        );

        let mut result = AggregationResult::default();

        for month in 1..=12 {
            let outcome: MonthOutcome = self
                .source
                .fetch_month(&coordinates, self.method, month, year)
                .await
                .into();

            match outcome {
                MonthOutcome::Skipped(failure) => {
                    tracing::warn!(
                        month,
                        kind = ?failure.kind(),
                        "Skipping {}-{:02}: {}",
                        year,
                        month,
                        failure
                    );
                    if self.policy == PartialFailurePolicy::Abort {
                        return Err(Error::PartialFailure(format!(
                            "month {} failed: {}",
                            month, failure
                        )));
                    }
                    result.failed_months.push(MonthFailure { month, failure });
                }
                MonthOutcome::Fetched(days) => {
                    let before = result.events.len();
                    for day in &days {
                        match self.day_events(day, location) {
                            Some(events) => result.events.extend(events),
                            None if self.policy == PartialFailurePolicy::Abort => {
                                return Err(Error::PartialFailure(format!(
                                    "invalid day '{}' in month {}",
                                    day.date, month
                                )));
                            }
                            None => result.rejected_days += 1,
                        }
                    }
                    tracing::debug!(
                        "{}-{:02}: {} days, {} events",
                        year,
                        month,
                        days.len(),
                        result.events.len() - before
                    );
                }
            }
        }

        tracing::info!(
            "聚合完成: {} events, {} failed months, {} rejected days",
            result.events.len(),
            result.failed_months.len(),
            result.rejected_days
        );

        Ok(result)
    }

    /// 将一天的记录转换为事件，任一字段校验失败则整天被丢弃
    fn day_events(&self, day: &RawDailySchedule, location: &str) -> Option<Vec<PrayerEvent>> {
        day.timings
            .iter()
            .map(|(prayer, time)| {
                let moment = self.normalizer.normalize(&day.date, time).ok()?;
                Some(PrayerEvent {
                    title: prayer.clone(),
                    moment,
                    description: format!("{} prayer time for {}", prayer, location),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex};

    use async_trait::async_trait;
    use tokio_test::assert_ok;

    use super::*;
    use crate::normalize::DateOrder;

    const PRAYERS: [&str; 5] = ["Fajr", "Dhuhr", "Asr", "Maghrib", "Isha"];

    struct FixedResolver(Option<Coordinates>);

    #[async_trait]
    impl LocationResolver for FixedResolver {
        async fn resolve(&self, _place: &str) -> Result<Option<Coordinates>> {
            Ok(self.0)
        }
    }

    fn resolver() -> Arc<dyn LocationResolver> {
        Arc::new(FixedResolver(Some(Coordinates {
            latitude: 30.0444,
            longitude: 31.2357,
        })))
    }

    /// 按月生成固定天数的假数据，可指定失败月份与坏日期
    struct FakeSource {
        days_per_month: u32,
        failing_months: HashSet<u32>,
        bad_dates: HashSet<String>,
        calls: Mutex<Vec<u32>>,
    }

    impl FakeSource {
        fn new(days_per_month: u32) -> Self {
            Self {
                days_per_month,
                failing_months: HashSet::new(),
                bad_dates: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, months: impl IntoIterator<Item = u32>) -> Self {
            self.failing_months.extend(months);
            self
        }

        fn with_bad_date(mut self, date: &str) -> Self {
            self.bad_dates.insert(date.to_string());
            self
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ScheduleSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_month(
            &self,
            _coordinates: &Coordinates,
            _method: u32,
            month: u32,
            year: i32,
        ) -> std::result::Result<Vec<RawDailySchedule>, FetchFailure> {
            self.calls.lock().unwrap().push(month);
            if self.failing_months.contains(&month) {
                return Err(if month % 2 == 0 {
                    FetchFailure::RateLimited { status: 429 }
                } else {
                    FetchFailure::Transport("connection reset".to_string())
                });
            }

            Ok((1..=self.days_per_month)
                .map(|day| {
                    let date = format!("{:02}-{:02}-{}", day, month, year);
                    let date = if self.bad_dates.contains(&date) {
                        format!("{:02}-{:02}-{}", 30, 2, year)
                    } else {
                        date
                    };
                    RawDailySchedule {
                        date,
                        timings: PRAYERS
                            .iter()
                            .enumerate()
                            .map(|(i, p)| (p.to_string(), format!("{:02}:{:02} (UTC)", 4 + i * 3, day)))
                            .collect(),
                    }
                })
                .collect())
        }
    }

    fn aggregator(source: Arc<FakeSource>) -> ScheduleAggregator {
        ScheduleAggregator::new(resolver(), source, DateNormalizer::new(DateOrder::Dmy), 5)
    }

    #[tokio::test]
    async fn full_year_produces_every_event_in_order() {
        let source = Arc::new(FakeSource::new(3));
        let result = assert_ok!(aggregator(source.clone()).aggregate("Cairo", 2025).await);

        assert_eq!(result.events.len(), 12 * 3 * PRAYERS.len());
        assert!(result.is_complete());
        assert_eq!(source.calls(), (1..=12).collect::<Vec<_>>());

        let keys: Vec<_> = result
            .events
            .iter()
            .map(|e| (e.moment.month, e.moment.day, e.moment.hour))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);

        let first_day: Vec<_> = result.events[..PRAYERS.len()]
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(first_day, PRAYERS);
        assert_eq!(result.events[0].description, "Fajr prayer time for Cairo");
    }

    #[tokio::test]
    async fn one_failing_month_contributes_nothing() {
        let (k, p) = (4, PRAYERS.len());
        let source = Arc::new(FakeSource::new(4).failing([7]));
        let result = assert_ok!(aggregator(source.clone()).aggregate("Cairo", 2025).await);

        assert_eq!(result.events.len(), 11 * k * p);
        assert!(result.events.iter().all(|e| e.moment.month != 7));
        assert_eq!(result.failed_months.len(), 1);
        assert_eq!(result.failed_months[0].month, 7);
        assert_eq!(source.calls().len(), 12);
    }

    #[tokio::test]
    async fn all_months_failing_is_empty_but_ok() {
        let source = Arc::new(FakeSource::new(2).failing(1..=12));
        let result = assert_ok!(aggregator(source).aggregate("Cairo", 2025).await);

        assert!(result.events.is_empty());
        assert_eq!(result.failed_months.len(), 12);
        assert!(
            result
                .failed_months
                .iter()
                .any(|f| f.failure.kind() == crate::providers::FailureKind::RateLimit)
        );
    }

    #[tokio::test]
    async fn invalid_day_skips_only_that_day() {
        let source = Arc::new(FakeSource::new(3).with_bad_date("02-05-2025"));
        let result = assert_ok!(aggregator(source).aggregate("Cairo", 2025).await);

        assert_eq!(result.rejected_days, 1);
        assert_eq!(result.events.len(), (12 * 3 - 1) * PRAYERS.len());
        let may_days: HashSet<_> = result
            .events
            .iter()
            .filter(|e| e.moment.month == 5)
            .map(|e| e.moment.day)
            .collect();
        assert_eq!(may_days, HashSet::from([1, 3]));
    }

    #[tokio::test]
    async fn unresolvable_location_short_circuits() {
        let source = Arc::new(FakeSource::new(3));
        let aggregator = ScheduleAggregator::new(
            Arc::new(FixedResolver(None)),
            source.clone(),
            DateNormalizer::default(),
            5,
        );

        let err = aggregator.aggregate("Atlantis", 2025).await.unwrap_err();
        assert!(matches!(err, Error::LocationNotFound(ref place) if place == "Atlantis"));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn explicit_coordinates_skip_the_resolver() {
        let source = Arc::new(FakeSource::new(1));
        let aggregator = ScheduleAggregator::new(
            Arc::new(FixedResolver(None)),
            source.clone(),
            DateNormalizer::default(),
            5,
        );

        let at = Coordinates {
            latitude: 41.0082,
            longitude: 28.9784,
        };
        let result = assert_ok!(aggregator.aggregate_at(at, "41.0082, 28.9784", 2025).await);
        assert_eq!(result.events.len(), 12 * PRAYERS.len());
        assert_eq!(source.calls().len(), 12);
        assert_eq!(
            result.events[0].description,
            "Fajr prayer time for 41.0082, 28.9784"
        );
    }

    #[tokio::test]
    async fn abort_policy_turns_month_failure_into_error() {
        let source = Arc::new(FakeSource::new(1).failing([3]));
        let aggregator = aggregator(source.clone()).with_policy(PartialFailurePolicy::Abort);

        let err = aggregator.aggregate("Cairo", 2025).await.unwrap_err();
        assert!(matches!(err, Error::PartialFailure(_)));
        assert_eq!(source.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn provider_entry_order_survives_aggregation() {
        use axum::{Router, extract::Path, http::header, response::IntoResponse, routing::get};

        use crate::providers::aladhan::AladhanProvider;

        // 顺序既不是字母序也不是时间序
        async fn month(Path((year, month)): Path<(i32, u32)>) -> impl IntoResponse {
            let body = format!(
                r#"{{"code":200,"status":"OK","data":[{{
                    "timings":{{"Maghrib":"17:45","Fajr":"04:58","Isha":"19:03","Dhuhr":"12:05"}},
                    "date":{{"gregorian":{{"date":"01-{month:02}-{year}"}}}}
                }}]}}"#
            );
            ([(header::CONTENT_TYPE, "application/json")], body)
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let router = Router::new().route("/v1/calendar/{year}/{month}", get(month));
            axum::serve(listener, router).await.unwrap();
        });

        let source = Arc::new(AladhanProvider::new(format!("http://{}", addr), 5).unwrap());
        let aggregator =
            ScheduleAggregator::new(resolver(), source, DateNormalizer::new(DateOrder::Dmy), 5);
        let result = assert_ok!(aggregator.aggregate("Cairo", 2025).await);

        assert_eq!(result.events.len(), 12 * 4);
        for (month, day) in result.events.chunks(4).enumerate() {
            let titles: Vec<_> = day.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(titles, ["Maghrib", "Fajr", "Isha", "Dhuhr"]);
            assert!(day.iter().all(|e| e.moment.month as usize == month + 1));
        }
        assert_eq!(result.events[1].moment.hour, 4);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!("abort".parse::<PartialFailurePolicy>(), Ok(PartialFailurePolicy::Abort));
        assert_eq!("Fail-Open".parse::<PartialFailurePolicy>(), Ok(PartialFailurePolicy::Tolerate));
        assert!("sometimes".parse::<PartialFailurePolicy>().is_err());
    }
}
