use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::NormalizedMoment;

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,4})-(\d{1,2})-(\d{1,4})$").unwrap());

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").unwrap());

/// provider日期字段的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateOrder {
    /// `DD-MM-YYYY`，Aladhan `date.gregorian.date` 使用的格式
    #[default]
    Dmy,
    /// `YYYY-MM-DD`
    Ymd,
}

impl FromStr for DateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dmy" | "dd-mm-yyyy" => Ok(Self::Dmy),
            "ymd" | "yyyy-mm-dd" => Ok(Self::Ymd),
            other => Err(format!("unknown date order '{}', expected dmy or ymd", other)),
        }
    }
}

impl fmt::Display for DateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dmy => f.write_str("dmy"),
            Self::Ymd => f.write_str("ymd"),
        }
    }
}

/// 单日记录被拒绝的原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRejection {
    #[error("malformed date '{0}'")]
    MalformedDate(String),

    #[error("date '{0}' does not exist in the calendar")]
    NonexistentDate(String),

    #[error("malformed time '{0}'")]
    MalformedTime(String),
}

/// 日期与时间的校验器
#[derive(Debug, Clone, Copy, Default)]
pub struct DateNormalizer {
    order: DateOrder,
}

impl DateNormalizer {
    pub const fn new(order: DateOrder) -> Self {
        Self { order }
    }

    pub const fn order(&self) -> DateOrder {
        self.order
    }

    /// 解析日期与时间，得到校验后的时刻
    ///
    /// 日期必须是真实存在的日历日期（考虑月份天数与闰年），否则整条记录被拒绝，
    /// 不做任何修正。时间只取 `HH:MM` 部分，后缀（如 ` (EET)`）被忽略，时分不做范围检查。
    pub fn normalize(
        &self,
        date_str: &str,
        time_str: &str,
    ) -> Result<NormalizedMoment, DateRejection> {
        let result = self.parse(date_str, time_str);
        if let Err(ref rejection) = result {
            tracing::warn!(
                date = date_str,
                time = time_str,
                "Rejected provider record: {}",
                rejection
            );
        }
        result
    }

    /// 仅校验日期部分，返回 `(year, month, day)`
    pub fn parse_date(&self, date_str: &str) -> Result<(i32, u32, u32), DateRejection> {
        let malformed = || DateRejection::MalformedDate(date_str.to_string());

        let captures = DATE_PATTERN.captures(date_str.trim()).ok_or_else(malformed)?;
        let (first, second, third) = (&captures[1], &captures[2], &captures[3]);

        let (year, month, day) = match self.order {
            DateOrder::Dmy => (third, second, first),
            DateOrder::Ymd => (first, second, third),
        };

        let year: i32 = year.parse().map_err(|_| malformed())?;
        let month: u32 = month.parse().map_err(|_| malformed())?;
        let day: u32 = day.parse().map_err(|_| malformed())?;

        let reconstructed = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| DateRejection::NonexistentDate(date_str.to_string()))?;

        if (reconstructed.year(), reconstructed.month(), reconstructed.day()) != (year, month, day) {
            return Err(DateRejection::NonexistentDate(date_str.to_string()));
        }

        Ok((year, month, day))
    }

    /// 取出 `HH:MM` 前缀，返回 `(hour, minute)`
    pub fn parse_time(&self, time_str: &str) -> Result<(u32, u32), DateRejection> {
        let malformed = || DateRejection::MalformedTime(time_str.to_string());

        let clock = time_str.split_whitespace().next().ok_or_else(malformed)?;
        let captures = TIME_PATTERN.captures(clock).ok_or_else(malformed)?;

        let hour: u32 = captures[1].parse().map_err(|_| malformed())?;
        let minute: u32 = captures[2].parse().map_err(|_| malformed())?;

        Ok((hour, minute))
    }

    fn parse(&self, date_str: &str, time_str: &str) -> Result<NormalizedMoment, DateRejection> {
        let (year, month, day) = self.parse_date(date_str)?;
        let (hour, minute) = self.parse_time(time_str)?;

        Ok(NormalizedMoment {
            year,
            month,
            day,
            hour,
            minute,
        })
    }
}
