use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use capture_scan::config::{Config, OutputFormat};
use capture_scan::models::SourceHint;

#[derive(Parser)]
#[command(name = "capture-scan")]
#[command(about = "一个用于标准化 HTTP 抓包数据并识别网站技术栈的 CLI 工具")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 只输出错误，不显示进度
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 在线扫描 URL、URL 列表文件或标准输入 (-)
    Scan {
        /// URL、每行一个 URL 的文件，或 - 表示标准输入
        input: String,

        /// 抓取超时（秒）
        #[arg(short, long)]
        timeout: Option<u64>,

        #[command(flatten)]
        options: ScanOptions,
    },

    /// 离线扫描抓包数据（fff / katana / 原始响应 / 纯正文）
    Offline {
        /// 抓包文件或目录
        path: PathBuf,

        /// 解析并行度
        #[arg(short, long)]
        parallelism: Option<usize>,

        #[command(flatten)]
        options: ScanOptions,
    },

    /// 只统计离线单元数量
    Count {
        /// 抓包文件或目录
        path: PathBuf,

        /// 统计并行度
        #[arg(short, long)]
        parallelism: Option<usize>,
    },

    /// 识别抓包数据格式
    Sniff {
        /// 要识别的路径
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// 在线与离线扫描共用的选项
#[derive(Args, Debug, Default)]
pub struct ScanOptions {
    /// 并发工作者数量
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// 从断点文件继续上次的扫描
    #[arg(long)]
    pub resume: bool,

    /// 断点文件路径
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// 只使用响应头检测
    #[arg(long, conflicts_with = "body_only")]
    pub headers_only: bool,

    /// 只使用正文检测
    #[arg(long)]
    pub body_only: bool,

    /// 自定义检测规则文件 (TOML)
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// 结果文件路径
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 输出格式
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// 按域名聚合输出结果
    #[arg(long)]
    pub domain: bool,
}

impl ScanOptions {
    /// 命令行参数覆盖配置文件中的值
    pub fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.scan.workers = workers;
        }
        if self.resume {
            config.checkpoint.resume = true;
        }
        if let Some(path) = &self.checkpoint {
            config.checkpoint.path = path.clone();
        }
        if self.headers_only {
            config.scan.source_hint = SourceHint::HeadersOnly;
        } else if self.body_only {
            config.scan.source_hint = SourceHint::BodyOnly;
        }
        if let Some(rules) = &self.rules {
            config.detection.rules_path = Some(rules.clone());
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.domain {
            config.output.by_domain = true;
        }
    }
}
