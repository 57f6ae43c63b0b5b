//! 按域名聚合检测结果

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::mem;

use serde::{Deserialize, Serialize};

use super::ResultSink;
use crate::models::{Detection, DetectionBatch};

/// 一个域名下的全部检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDomain {
    pub domain: String,

    /// 去重并排序后的 URL（不含空 URL）
    pub urls: Vec<String>,

    /// 按到达顺序保留的检测结果
    pub detections: Vec<Detection>,
}

impl AggregatedDomain {
    /// 去重排序后的技术名称
    pub fn technologies(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self.detections.iter().map(|d| d.technology.as_str()).collect();
        names.into_iter().collect()
    }
}

/// 按域名分组，域名有序
pub fn aggregate_by_domain(detections: impl IntoIterator<Item = Detection>) -> Vec<AggregatedDomain> {
    let mut domains: BTreeMap<String, (BTreeSet<String>, Vec<Detection>)> = BTreeMap::new();
    for detection in detections {
        let (urls, grouped) = domains.entry(detection.domain.clone()).or_default();
        if !detection.url.is_empty() {
            urls.insert(detection.url.clone());
        }
        grouped.push(detection);
    }

    domains
        .into_iter()
        .map(|(domain, (urls, detections))| AggregatedDomain {
            domain,
            urls: urls.into_iter().collect(),
            detections,
        })
        .collect()
}

/// 缓存整次扫描的检测结果，关闭时聚合后交给内层写出端
pub struct DomainAggregateSink {
    inner: Box<dyn ResultSink>,
    detections: Vec<Detection>,
}

impl DomainAggregateSink {
    pub fn new(inner: Box<dyn ResultSink>) -> Self {
        Self {
            inner,
            detections: Vec::new(),
        }
    }
}

impl ResultSink for DomainAggregateSink {
    fn write(&mut self, batch: &DetectionBatch) -> io::Result<()> {
        self.detections.extend(batch.detections.iter().cloned());
        Ok(())
    }

    fn write_aggregated(&mut self, domains: &[AggregatedDomain]) -> io::Result<()> {
        self.inner.write_aggregated(domains)
    }

    fn close(&mut self) -> io::Result<()> {
        let domains = aggregate_by_domain(mem::take(&mut self.detections));
        tracing::debug!("按域名聚合: {} 个域名", domains.len());

        let written = self.inner.write_aggregated(&domains);
        let closed = self.inner.close();
        written.and(closed)
    }
}
