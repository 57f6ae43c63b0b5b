use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 检测时使用的数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SourceHint {
    /// 同时使用响应头和正文
    #[default]
    Auto,
    /// 仅使用响应头
    HeadersOnly,
    /// 仅使用正文
    BodyOnly,
}

impl SourceHint {
    /// 写入检测结果的来源标记
    pub fn source_tag(&self) -> &'static str {
        match self {
            SourceHint::Auto => "fingerprint",
            SourceHint::HeadersOnly => "fingerprint-header",
            SourceHint::BodyOnly => "fingerprint-body",
        }
    }
}

/// 一条技术检测结果，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub domain: String,
    pub url: String,
    pub technology: String,
    pub source: String,
    pub path: String,
    pub evidence: String,
    pub confidence: String,
    pub timestamp: DateTime<Utc>,
}

/// 一个扫描单元完成后产出的结果批次
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionBatch {
    pub domain: String,
    pub url: String,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    /// 用单元的域名和 URL 补全每条结果
    pub fn enrich(domain: &str, url: &str, mut detections: Vec<Detection>) -> Self {
        for detection in &mut detections {
            detection.domain = domain.to_string();
            detection.url = url.to_string();
        }
        Self {
            domain: domain.to_string(),
            url: url.to_string(),
            detections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn technologies(&self) -> Vec<&str> {
        self.detections.iter().map(|d| d.technology.as_str()).collect()
    }
}
