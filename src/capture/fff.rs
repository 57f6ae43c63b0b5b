//! fff 输出目录：`root/<domain>/<path...>/<hash>.{headers,body}`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender};
use std::thread;

use rayon::prelude::*;
use walkdir::WalkDir;

use super::headers::parse_header_block;
use super::{CaptureParser, ParseContext, UnitStream};
use crate::error::CaptureError;
use crate::models::{HeaderMap, NormalizedInput};

/// 文件名中哈希部分的合法长度范围（SHA1 ~ SHA256）
const HASH_LEN_RANGE: std::ops::RangeInclusive<usize> = 32..=64;

/// fff 目录解析器：每个顶层域名目录一个并行任务
pub struct FffParser;

/// 同一哈希下的一组文件
#[derive(Debug, Default)]
struct HashGroup {
    headers: Option<PathBuf>,
    body: Option<PathBuf>,
}

impl HashGroup {
    /// 用于推导 URL 和断点判定的代表文件
    fn representative(&self) -> Option<&Path> {
        self.headers.as_deref().or(self.body.as_deref())
    }
}

impl CaptureParser for FffParser {
    fn parse(&self, root: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError> {
        let domain_dirs = list_domain_dirs(root)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.parallelism)
            .thread_name(|i| format!("fff-parse-{i}"))
            .build()?;

        let (tx, rx) = mpsc::sync_channel(0);
        let ctx = ctx.clone();
        thread::Builder::new()
            .name("fff-producer".to_string())
            .spawn(move || {
                pool.install(|| {
                    domain_dirs.par_iter().for_each_with(tx, |tx, domain_dir| {
                        parse_domain(domain_dir, &ctx, tx);
                    });
                });
            })
            .map_err(|source| CaptureError::Io {
                path: root.to_path_buf(),
                source,
            })?;

        Ok(Box::new(rx.into_iter()))
    }
}

fn list_domain_dirs(root: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let entries = fs::read_dir(root).map_err(|source| CaptureError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect())
}

/// 遍历一个域名目录，按哈希分组后逐组产出单元
fn parse_domain(domain_dir: &Path, ctx: &ParseContext, tx: &SyncSender<NormalizedInput>) {
    let domain = match domain_dir.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return,
    };

    let mut groups: BTreeMap<String, HashGroup> = BTreeMap::new();
    for entry in WalkDir::new(domain_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("遍历 fff 目录出错: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        let is_headers = name.ends_with(".headers");
        if !is_headers && !name.ends_with(".body") {
            continue;
        }
        let Some(hash) = extract_hash(&name) else {
            continue;
        };

        let group = groups.entry(hash.to_string()).or_default();
        if is_headers {
            group.headers = Some(path);
        } else {
            group.body = Some(path);
        }
    }

    // 同一目录下的多个哈希组推导出相同 URL，断点标识用哈希区分
    for (hash, group) in &groups {
        let Some(representative) = group.representative() else {
            continue;
        };
        let url = derive_url(domain_dir, representative, &domain);
        let unit = NormalizedInput::new(domain.as_str(), url, representative.to_string_lossy())
            .with_checkpoint_qualifier(hash);

        let input = if ctx.should_skip(unit.checkpoint_id()) {
            unit.into_skip_marker()
        } else {
            build_input(group, unit)
        };

        if tx.send(input).is_err() {
            // 消费端已关闭
            return;
        }
    }
}

fn build_input(group: &HashGroup, unit: NormalizedInput) -> NormalizedInput {
    let headers = group
        .headers
        .as_deref()
        .map(read_headers_file)
        .unwrap_or_default();

    let body = match group.body.as_deref() {
        Some(path) => fs::read(path).unwrap_or_else(|err| {
            tracing::warn!("读取 fff 正文文件 {} 失败: {}", path.display(), err);
            Vec::new()
        }),
        None => Vec::new(),
    };

    tracing::debug!("生成 FFF 单元: {} (域名: {})", unit.url, unit.domain);
    unit.with_headers(headers).with_body(body)
}

/// 解析 `.headers` 文件；读取失败时返回空映射
fn read_headers_file(path: &Path) -> HeaderMap {
    match fs::read(path) {
        Ok(bytes) => parse_header_block(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            tracing::warn!("读取 fff 头文件 {} 失败: {}", path.display(), err);
            HeaderMap::new()
        }
    }
}

/// 由文件所在目录相对域名目录的路径推导 URL
pub fn derive_url(domain_root: &Path, file_path: &Path, domain: &str) -> String {
    let base = format!("https://{domain}");
    let Some(parent) = file_path.parent() else {
        return base;
    };

    match parent.strip_prefix(domain_root) {
        Ok(rel) if rel.as_os_str().is_empty() => base,
        Ok(rel) => {
            let segments: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            format!("{}/{}", base, segments.join("/"))
        }
        Err(_) => {
            tracing::warn!(
                "{} 不在域名目录 {} 之下，使用域名根 URL",
                file_path.display(),
                domain_root.display()
            );
            base
        }
    }
}

/// 从 fff 文件名中提取哈希，例如 `cb22...7ad.body` -> `cb22...7ad`
pub fn extract_hash(file_name: &str) -> Option<&str> {
    let (base, _ext) = file_name.rsplit_once('.')?;
    if HASH_LEN_RANGE.contains(&base.len()) && base.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(base)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    const HASH: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn parse_all(root: &Path, ctx: &ParseContext) -> Vec<NormalizedInput> {
        FffParser.parse(root, ctx).unwrap().collect()
    }

    #[test]
    fn test_parse_pair_in_domain_root() {
        let temp_dir = tempdir().unwrap();
        let domain_dir = temp_dir.path().join("example.com");
        write(&domain_dir.join(format!("{HASH}.headers")), "HTTP/1.1 200 OK\nServer: nginx/1.18.0\n");
        write(&domain_dir.join(format!("{HASH}.body")), "<html>Hello World</html>");

        let inputs = parse_all(temp_dir.path(), &ParseContext::new(2));
        assert_eq!(inputs.len(), 1);

        let input = &inputs[0];
        assert_eq!(input.domain, "example.com");
        assert_eq!(input.url, "https://example.com");
        assert_eq!(input.headers["Server"], vec!["nginx/1.18.0"]);
        assert_eq!(input.body, b"<html>Hello World</html>");
        assert!(!input.skipped);
    }

    #[test]
    fn test_parse_nested_body_only() {
        let temp_dir = tempdir().unwrap();
        let nested = temp_dir.path().join("example.com/path/to/file");
        write(&nested.join(format!("{HASH}.body")), "Body Only Content");

        let inputs = parse_all(temp_dir.path(), &ParseContext::new(1));
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].url, "https://example.com/path/to/file");
        assert!(inputs[0].headers.is_empty());
        assert_eq!(inputs[0].body, b"Body Only Content");
    }

    #[test]
    fn test_parse_multi_domain_and_invalid_hash() {
        let temp_dir = tempdir().unwrap();
        for (domain, server) in [("domain1.com", "domain1-server"), ("domain2.com", "domain2-server")] {
            let dir = temp_dir.path().join(domain);
            write(&dir.join(format!("{HASH}.headers")), &format!("HTTP/1.1 200 OK\nServer: {server}\n"));
            write(&dir.join(format!("{HASH}.body")), domain);
            write(&dir.join("not-a-hash.body"), "ignored");
        }

        let mut inputs = parse_all(temp_dir.path(), &ParseContext::new(4));
        inputs.sort_by(|a, b| a.domain.cmp(&b.domain));

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].domain, "domain1.com");
        assert_eq!(inputs[0].headers["Server"], vec!["domain1-server"]);
        assert_eq!(inputs[1].url, "https://domain2.com");
        assert_eq!(inputs[1].body, b"domain2.com");
    }

    #[test]
    fn test_skip_predicate_emits_marker_without_io() {
        let temp_dir = tempdir().unwrap();
        let domain_dir = temp_dir.path().join("example.com");
        write(&domain_dir.join(format!("{HASH}.headers")), "HTTP/1.1 200 OK\nServer: nginx\n");
        write(&domain_dir.join(format!("{HASH}.body")), "<html></html>");

        let done = format!("https://example.com#{HASH}");
        let ctx = ParseContext::new(1).with_skip(Arc::new(move |id: &str| id == done));
        let inputs = parse_all(temp_dir.path(), &ctx);

        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].skipped);
        assert!(inputs[0].headers.is_empty());
        assert!(inputs[0].body.is_empty());
    }

    #[test]
    fn test_sibling_groups_have_distinct_checkpoint_ids() {
        let temp_dir = tempdir().unwrap();
        let domain_dir = temp_dir.path().join("example.com");
        let other = "0123456789abcdef0123456789abcdef01234567";
        write(&domain_dir.join(format!("{HASH}.headers")), "HTTP/1.1 200 OK\nServer: nginx\n");
        write(&domain_dir.join(format!("{other}.headers")), "HTTP/1.1 200 OK\nServer: Apache\n");

        let done = format!("https://example.com#{HASH}");
        let ctx = ParseContext::new(1).with_skip(Arc::new(move |id: &str| id == done));
        let mut inputs = parse_all(temp_dir.path(), &ctx);
        inputs.sort_by(|a, b| a.checkpoint_id().cmp(b.checkpoint_id()));

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].url, inputs[1].url);
        assert_eq!(inputs[0].checkpoint_id(), format!("https://example.com#{other}"));
        assert!(!inputs[0].skipped);
        assert_eq!(inputs[0].headers["Server"], vec!["Apache"]);
        assert!(inputs[1].skipped);
    }

    #[test]
    fn test_derive_url() {
        let root = Path::new("/tmp/fff/example.com");
        assert_eq!(
            derive_url(root, &root.join(format!("{HASH}.headers")), "example.com"),
            "https://example.com"
        );
        assert_eq!(
            derive_url(root, &root.join("0123456789abcdef0123456789abcdef.headers"), "example.com"),
            "https://example.com"
        );

        let root = Path::new("/tmp/fff/www.divvyhomes.com");
        let file = root.join("_next/static/chunks/page-c471709c92969dc3.js").join(format!("{HASH}.body"));
        assert_eq!(
            derive_url(root, &file, "www.divvyhomes.com"),
            "https://www.divvyhomes.com/_next/static/chunks/page-c471709c92969dc3.js"
        );
    }

    #[test]
    fn test_extract_hash() {
        assert_eq!(extract_hash(&format!("{HASH}.body")), Some(HASH));
        assert_eq!(extract_hash("short.body"), None);
        assert_eq!(extract_hash("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz.headers"), None);
        assert_eq!(extract_hash("noextension"), None);
    }
}
