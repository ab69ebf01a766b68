use std::{env, net::SocketAddr};

use anyhow::Result;
use prayer_ics_core::config::AppConfig;
use tokio::net::TcpListener;

use crate::handlers::create_app;

pub async fn start_server(config: AppConfig, redis_url: Option<String>) -> Result<()> {
    tracing::info!(
        "Schedule provider: {}, geocoder: {}, delivery: {}, policy: {}",
        config.schedule.base_url,
        config.geocoder.base_url,
        config.delivery,
        config.policy
    );

    let app = create_app(config, redis_url.as_deref()).await?;

    // 从环境变量获取端口，默认为3000
    let port = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("Prayer ICS Server starting on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
