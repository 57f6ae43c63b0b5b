mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use capture_scan::capture::{count_offline, detect_format, CaptureFormat};
use capture_scan::config::{Config, OutputFormat};
use capture_scan::detect::{Detector, RuleDetector};
use capture_scan::operations::{run_offline_scan, run_online_scan, ScanOutcome, ScanSession};
use capture_scan::output::{ConsoleSink, DomainAggregateSink, JsonLinesSink, ResultSink};
use capture_scan::scanner::{create_progress_bar, HttpFetcher, ScanTracker};
use capture_scan::utils::format_count;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志，默认 INFO，--verbose 为 DEBUG，--silent 只保留错误
    let level = if cli.silent {
        tracing::Level::ERROR
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // 加载配置
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_or_default()?
    };

    // 根据命令执行相应操作
    match cli.command {
        Commands::Scan { input, timeout, options } => {
            options.apply(&mut config);
            if let Some(timeout) = timeout {
                config.scan.timeout_secs = timeout;
            }

            let session = build_session(config, cli.silent)?;
            let sinks = build_sinks(&session, cli.silent)?;
            let fetcher = Arc::new(HttpFetcher::new()?);
            let outcome = run_online_scan(&session, &input, fetcher, sinks).await?;
            report(&outcome);
        }
        Commands::Offline { path, parallelism, options } => {
            options.apply(&mut config);
            if let Some(parallelism) = parallelism {
                config.scan.parallelism = parallelism;
            }

            let session = build_session(config, cli.silent)?;
            let sinks = build_sinks(&session, cli.silent)?;
            let outcome = run_offline_scan(&session, &path, sinks).await?;
            report(&outcome);
        }
        Commands::Count { path, parallelism } => {
            let format = detect_format(&path);
            if format == CaptureFormat::Unknown {
                bail!("无法识别的离线输入: {}", path.display());
            }
            let parallelism = parallelism.unwrap_or(config.scan.parallelism);
            let total = count_offline(&path, parallelism)?;
            println!("{}\t{}", format, format_count(total));
        }
        Commands::Sniff { paths } => {
            for path in paths {
                println!("{}\t{}", detect_format(&path), path.display());
            }
        }
    }

    Ok(())
}

/// 组装检测器、进度条，并把 Ctrl-C 接到取消令牌上
fn build_session(config: Config, silent: bool) -> Result<ScanSession> {
    let detector: Arc<dyn Detector> = match &config.detection.rules_path {
        Some(path) => Arc::new(RuleDetector::from_file(path)?),
        None => Arc::new(RuleDetector::builtin()?),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，正在停止扫描...");
            on_signal.cancel();
        }
    });

    Ok(ScanSession {
        config,
        detector,
        tracker: Arc::new(ScanTracker::new(create_progress_bar(silent))),
        cancel,
    })
}

fn build_sinks(session: &ScanSession, silent: bool) -> Result<Vec<Box<dyn ResultSink>>> {
    let output = &session.config.output;
    let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();

    if let Some(path) = &output.path {
        let sink = JsonLinesSink::create(path, session.config.checkpoint.resume)
            .with_context(|| format!("无法创建结果文件 {}", path.display()))?;
        sinks.push(Box::new(sink));
    } else if output.format == OutputFormat::Jsonl {
        bail!("jsonl 输出需要通过 --output 指定文件");
    }

    if output.format == OutputFormat::Console && !silent {
        sinks.push(Box::new(ConsoleSink::new(session.tracker.progress().clone())));
    }

    // 聚合模式：扫描结束时每个域名输出一条
    if output.by_domain {
        sinks = sinks
            .into_iter()
            .map(|sink| Box::new(DomainAggregateSink::new(sink)) as Box<dyn ResultSink>)
            .collect();
    }

    Ok(sinks)
}

fn report(outcome: &ScanOutcome) {
    if outcome.cancelled {
        tracing::warn!("扫描已中断: {}", outcome.summary);
    } else {
        tracing::info!("扫描完成: {}，输出 {} 个结果批次", outcome.summary, outcome.batches);
    }
}
