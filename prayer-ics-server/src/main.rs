mod cache;
mod handlers;
mod server;

use std::env;

use anyhow::Result;
use prayer_ics_core::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "prayer_ics_server=info,prayer_ics_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 配置只在启动时读取一次
    let config = AppConfig::from_env()?;

    // Redis 可选，仅用于缓存地理编码结果
    let redis_url = env::var("REDIS_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    server::start_server(config, redis_url).await
}
