mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use prayer_ics_core::normalize::DateOrder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "prayer-ics")]
#[command(about = "礼拜时间日历导出工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 获取全年礼拜时间并生成ICS文件
    Generate {
        /// 地名，如 "Cairo, Egypt"
        #[arg(short, long)]
        location: String,

        /// 年份，默认为今年
        #[arg(short, long)]
        year: Option<i32>,

        /// 计算方法编号（见 methods 命令）
        #[arg(short, long)]
        method: Option<u32>,

        /// provider日期格式 (dmy, ymd)
        #[arg(long)]
        date_order: Option<DateOrder>,

        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,

        /// 日历名称
        #[arg(long)]
        calendar_name: Option<String>,

        /// 提醒时间（分钟）
        #[arg(long)]
        reminder_minutes: Option<u32>,

        /// 覆盖已存在的输出文件
        #[arg(short, long)]
        force: bool,
    },

    /// 解析地名对应的坐标
    Resolve {
        /// 地名
        location: String,
    },

    /// 列出可用的计算方法
    Methods,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("prayer_ics_cli={},prayer_ics_core={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Generate {
            location,
            year,
            method,
            date_order,
            output,
            calendar_name,
            reminder_minutes,
            force,
        } => {
            commands::generate_command(commands::GenerateParams {
                location,
                year,
                method,
                date_order,
                output,
                calendar_name,
                reminder_minutes,
                force,
            })
            .await
        }

        Commands::Resolve { location } => commands::resolve_command(location).await,

        Commands::Methods => commands::methods_command().await,
    }
}
