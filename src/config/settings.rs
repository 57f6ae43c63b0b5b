use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

use crate::config::defaults::DefaultConfig;
use crate::models::SourceHint;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 扫描配置
    pub scan: ScanConfig,

    /// 断点续扫配置
    pub checkpoint: CheckpointConfig,

    /// 检测规则配置
    pub detection: DetectionConfig,

    /// 输出配置
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 并发工作者数量
    pub workers: usize,

    /// 离线解析与发现阶段的并行度
    pub parallelism: usize,

    /// 在线抓取超时（秒）
    pub timeout_secs: u64,

    /// 检测时使用的数据来源
    pub source_hint: SourceHint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// 断点文件路径
    pub path: PathBuf,

    /// 是否启用断点续扫
    pub resume: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 自定义规则文件，未设置时使用内置规则
    pub rules_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 结果文件路径
    pub path: Option<PathBuf>,

    /// 输出格式
    pub format: OutputFormat,

    /// 按域名聚合后输出
    pub by_domain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 控制台输出
    #[default]
    Console,
    /// JSON Lines
    Jsonl,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: DefaultConfig::WORKERS,
            parallelism: DefaultConfig::parallelism(),
            timeout_secs: DefaultConfig::TIMEOUT_SECS,
            source_hint: SourceHint::Auto,
        }
    }
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DefaultConfig::CHECKPOINT_FILE),
            resume: false,
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))?;
        Ok(config)
    }

    /// 获取默认配置文件路径
    pub fn default_config_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("无法找到配置目录"))?;
        path.push("capture-scan");
        path.push("config.toml");
        Ok(path)
    }

    /// 默认路径存在配置文件时加载，否则使用内置默认值
    pub fn load_or_default() -> Result<Self> {
        match Self::default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }
}
