use std::time::Duration;

use reqwest::{Client, ClientBuilder, StatusCode};

use crate::{Error, Result, providers::FetchFailure};

/// 基础HTTP客户端构建器
pub struct BaseProviderBuilder {
    pub client_builder: ClientBuilder,
    pub info: ProviderInfo,
}

pub struct BaseProvider {
    pub client: Client,
    pub info: ProviderInfo,
}

pub struct ProviderInfo {
    pub name: String,
}

impl BaseProviderBuilder {
    pub fn new(info: ProviderInfo) -> Self {
        let client_builder = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("prayer-ics/", env!("CARGO_PKG_VERSION")))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            });

        Self {
            client_builder,
            info,
        }
    }

    pub fn new_with_timeout(info: ProviderInfo, timeout_secs: u64) -> Self {
        let mut s = Self::new(info);
        s.client_builder = s.client_builder.timeout(Duration::from_secs(timeout_secs));
        s
    }

    pub fn build(self) -> Result<BaseProvider> {
        let client = self
            .client_builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(BaseProvider {
            client,
            info: self.info,
        })
    }
}

impl BaseProvider {
    /// 通用的请求错误分类
    pub fn classify_request_error(&self, error: &reqwest::Error) -> FetchFailure {
        if error.is_timeout() {
            FetchFailure::Timeout
        } else if error.is_decode() {
            FetchFailure::Malformed(error.to_string())
        } else {
            FetchFailure::Transport(error.to_string())
        }
    }

    /// 按HTTP状态码分类上游错误
    pub fn classify_status(&self, status: StatusCode, body: &str) -> FetchFailure {
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            FetchFailure::RateLimited {
                status: status.as_u16(),
            }
        } else {
            FetchFailure::Upstream {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            }
        }
    }

    /// 直接返回给调用方的请求错误，超时单独区分
    pub fn request_error(error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(error)
        }
    }

    pub fn custom_error(&self, message: impl Into<String>) -> Error {
        Error::Provider {
            provider: self.info.name.clone(),
            message: message.into(),
        }
    }
}
