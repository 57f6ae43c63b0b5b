use reqwest::Url;

use crate::error::TargetError;

/// 在线扫描目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTarget {
    /// 绝对 http/https URL
    pub url: String,

    /// 去掉 "www." 前缀后的主机名
    pub domain: String,
}

impl LiveTarget {
    /// 校验并规范化一行输入
    pub fn parse(input: &str) -> Result<Self, TargetError> {
        let input = input.trim();
        let url = Url::parse(input).map_err(|e| TargetError::InvalidUrl {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TargetError::UnsupportedScheme(input.to_string()));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TargetError::MissingHost(input.to_string()))?;
        let domain = host.strip_prefix("www.").unwrap_or(host).to_string();

        Ok(Self {
            url: input.to_string(),
            domain,
        })
    }
}
