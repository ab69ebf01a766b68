use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::providers::FetchFailure;

/// 地理坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// 纬度
    pub latitude: f64,
    /// 经度
    pub longitude: f64,
}

/// provider返回的单日原始时间表
///
/// 日期与时间均为未经校验的原始字符串，`timings` 保持provider给出的顺序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDailySchedule {
    /// 日期字符串，格式由 [`crate::normalize::DateOrder`] 约定
    pub date: String,
    /// (礼拜名称, 时间字符串) 列表，如 ("Fajr", "05:12 (EET)")
    pub timings: Vec<(String, String)>,
}

/// 校验后的时刻
///
/// `(year, month, day)` 一定是真实存在的日历日期；`hour`/`minute` 原样取自provider。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMoment {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl NormalizedMoment {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// 组合为本地浮动时间，时分越界时返回 `None`
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        self.date()?.and_hms_opt(self.hour, self.minute, 0)
    }
}

/// 单个礼拜事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerEvent {
    /// 礼拜名称
    pub title: String,
    pub moment: NormalizedMoment,
    /// 事件描述
    pub description: String,
}

/// 某个月份获取失败的记录
#[derive(Debug, Clone)]
pub struct MonthFailure {
    pub month: u32,
    pub failure: FetchFailure,
}

/// 全年聚合结果
#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    /// 按 月 -> 日 -> provider条目顺序 排列的事件
    pub events: Vec<PrayerEvent>,
    /// 获取失败的月份，仅用于诊断
    pub failed_months: Vec<MonthFailure>,
    /// 因日期校验失败被跳过的天数
    pub rejected_days: usize,
}

impl AggregationResult {
    pub fn is_complete(&self) -> bool {
        self.failed_months.is_empty() && self.rejected_days == 0
    }
}

/// 生成的日历产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarArtifact {
    /// 直接返回的ICS内容
    Inline { content: String, message: String },
    /// 已写入存储的ICS文件
    Stored {
        locator: String,
        path: PathBuf,
        message: String,
    },
}

impl CalendarArtifact {
    pub fn message(&self) -> &str {
        match self {
            Self::Inline { message, .. } | Self::Stored { message, .. } => message,
        }
    }
}

/// ICS生成选项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcsOptions {
    /// 日历名称
    pub calendar_name: Option<String>,
    /// 是否包含事件描述
    pub include_description: bool,
    /// 事件时长（分钟）
    pub event_duration_minutes: u32,
    pub reminder_minutes: Option<u32>,
}

impl Default for IcsOptions {
    fn default() -> Self {
        Self {
            calendar_name: Some("Prayer Times".to_string()),
            include_description: true,
            event_duration_minutes: 15,
            reminder_minutes: None,
        }
    }
}
