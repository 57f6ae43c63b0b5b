use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;

use crate::error::FetchError;
use crate::models::input::append_header;
use crate::models::{HeaderMap, LiveTarget};

/// 在线抓取时使用的 User-Agent
pub const USER_AGENT: &str = concat!("capture-scan/", env!("CARGO_PKG_VERSION"));

/// 一次抓取得到的响应
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// 在线抓取接口
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, target: &'a LiveTarget, timeout: Duration) -> BoxFuture<'a, Result<FetchedResponse, FetchError>>;
}

/// 基于 reqwest 的 GET 抓取器
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, target: &'a LiveTarget, timeout: Duration) -> BoxFuture<'a, Result<FetchedResponse, FetchError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(&target.url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    url: target.url.clone(),
                    source,
                })?;

            let mut headers = HeaderMap::new();
            for (name, value) in response.headers() {
                append_header(&mut headers, name.as_str(), String::from_utf8_lossy(value.as_bytes()));
            }

            // 正文读取失败不影响响应头的检测
            let body = match response.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => {
                    tracing::warn!("读取 {} 的响应正文失败: {}", target.url, err);
                    Vec::new()
                }
            };

            Ok(FetchedResponse { headers, body })
        })
    }
}
