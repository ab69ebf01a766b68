use std::{fs, io::Write, path::Path};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use prayer_ics_core::prelude::*;

/// 生成日历命令参数
pub struct GenerateParams {
    pub location: String,
    pub year: Option<i32>,
    pub method: Option<u32>,
    pub date_order: Option<DateOrder>,
    pub output: Option<String>,
    pub calendar_name: Option<String>,
    pub reminder_minutes: Option<u32>,
    pub force: bool,
}

/// 生成日历命令
pub async fn generate_command(params: GenerateParams) -> Result<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(order) = params.date_order {
        config.date_order = order;
    }
    if params.reminder_minutes.is_some() {
        config.reminder_minutes = params.reminder_minutes;
    }

    let year = params.year.unwrap_or_else(|| Local::now().year());
    let method = params.method.unwrap_or(config.method);

    tracing::info!(
        "开始生成日历: 地点={}, 年份={}, 计算方法={}",
        params.location,
        year,
        method
    );

    let service = CalendarService::from_config(config)?;
    let request = CalendarRequest::new(params.location.clone())
        .year(Some(year))
        .method(Some(method));

    println!("解析地点并获取 {} 年的礼拜时间...", year);
    let result = service.aggregate(&request).await?;
    println!("✓ 成功获取 {} 个礼拜事件", result.events.len());

    if !result.failed_months.is_empty() {
        println!("⚠ 以下月份获取失败，日历中将缺少这些月份:");
        for failed in &result.failed_months {
            println!("  {}月 ({:?}): {}", failed.month, failed.failure.kind(), failed.failure);
        }
    }
    if result.rejected_days > 0 {
        println!("⚠ {} 天的日期无效，已跳过", result.rejected_days);
    }

    // 生成ICS文件
    println!("生成ICS日历文件...");
    let calendar_name = params
        .calendar_name
        .unwrap_or_else(|| format!("Prayer Times - {} {}", params.location.trim(), year));
    let generator = IcsGenerator::new(service.config().ics_options(Some(calendar_name)));
    let ics_content = generator.generate(&result.events)?;

    // 确定输出文件名
    let output_file = params
        .output
        .unwrap_or_else(|| default_output_name(&params.location, year));

    // 写入文件
    write_output(Path::new(&output_file), &ics_content, params.force)?;
    println!("✓ ICS文件已保存到: {}", output_file);

    Ok(())
}

/// 解析地名命令
pub async fn resolve_command(location: String) -> Result<()> {
    let config = AppConfig::from_env()?;
    let resolver = NominatimResolver::new(
        config.geocoder.base_url,
        config.geocoder.api_key,
        config.geocoder.timeout,
    )?;

    match resolver.resolve(&location).await? {
        Some(coordinates) => {
            println!("地点: {}", location);
            println!("  纬度: {:.6}", coordinates.latitude);
            println!("  经度: {:.6}", coordinates.longitude);
            Ok(())
        }
        None => Err(prayer_ics_core::Error::LocationNotFound(location).into()),
    }
}

/// 列出计算方法命令
pub async fn methods_command() -> Result<()> {
    let default_method = AppConfig::from_env()
        .map(|c| c.method)
        .unwrap_or(DEFAULT_METHOD);

    println!("可用的计算方法:");
    for method in CALCULATION_METHODS {
        let marker = if method.id == default_method { " (默认)" } else { "" };
        println!("  {:>2} - {}{}", method.id, method.name, marker);
    }

    Ok(())
}

/// 写入输出文件，未指定 `force` 时不覆盖已有文件
fn write_output(path: &Path, content: &str, force: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options.open(path).with_context(|| {
        if path.exists() && !force {
            format!("{} 已存在，使用 --force 覆盖", path.display())
        } else {
            format!("无法创建 {}", path.display())
        }
    })?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// 由地名和年份生成默认文件名
fn default_output_name(location: &str, year: i32) -> String {
    let slug: String = location
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        format!("prayer-times-{}.ics", year)
    } else {
        format!("prayer-times-{}-{}.ics", slug, year)
    }
}
