//! Katana 响应存储：可选的首行 URL + 空行、请求块、响应块、正文

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::headers::{
    is_absolute_http_url, is_request_line, is_status_line, parse_header_block, contains_request_line,
    contains_status_line,
};
use super::lookahead::LookaheadReader;
use super::{CaptureParser, ParseContext, UnitStream};
use crate::error::{CaptureError, ParseError};
use crate::models::{host_header, HeaderMap, NormalizedInput};

/// 不代表域名的通用容器目录名
const GENERIC_CONTAINER_DIRS: &[&str] = &["responses", "katana-output", "."];

/// 首行 URL 判定最多需要退回的行数
const LOOKAHEAD_LINES: usize = 2;

/// 内容同时包含请求行和状态行
pub fn is_katana_content(data: &[u8]) -> bool {
    contains_request_line(data) && contains_status_line(data)
}

/// 拆分后的 Katana 记录
#[derive(Debug, Default)]
struct KatanaRecord {
    initial_url: Option<String>,
    request_line: String,
    request_headers: HeaderMap,
    response_headers: HeaderMap,
    body: Vec<u8>,
}

fn malformed(path: &Path, reason: &'static str) -> ParseError {
    ParseError::MalformedKatana {
        path: path.to_path_buf(),
        reason,
    }
}

/// 依次经过 首行 URL -> 请求块 -> 响应块 -> 正文 四个阶段
fn read_record<R: BufRead>(source: R, path: &Path) -> Result<KatanaRecord, ParseError> {
    let io_err = |source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = LookaheadReader::new(source, LOOKAHEAD_LINES);
    let mut record = KatanaRecord::default();

    // 首行 URL：只有紧跟空行时才成立，否则把读过的行退回
    let Some(first) = reader.next_line().map_err(io_err)? else {
        return Err(malformed(path, "文件为空"));
    };
    let candidate = String::from_utf8_lossy(&first).trim().to_string();
    if is_absolute_http_url(&candidate) {
        match reader.next_line().map_err(io_err)? {
            Some(second) if String::from_utf8_lossy(&second).trim().is_empty() => {
                record.initial_url = Some(candidate);
            }
            Some(second) => reader.unread(vec![first, second]).map_err(io_err)?,
            None => reader.unread(vec![first]).map_err(io_err)?,
        }
    } else {
        reader.unread(vec![first]).map_err(io_err)?;
    }

    // 请求块
    let request = reader.read_block().map_err(io_err)?;
    let request_text = String::from_utf8_lossy(&request.bytes);
    let (request_line, request_rest) = request_text
        .split_once('\n')
        .unwrap_or((&request_text[..], ""));
    if !is_request_line(request_line.as_bytes()) {
        return Err(malformed(path, "缺少请求行"));
    }
    record.request_line = request_line.trim().to_string();
    record.request_headers = parse_header_block(request_rest);

    // 响应块（状态行在解析头部时被丢弃）
    let response = reader.read_block().map_err(io_err)?;
    if !is_status_line(&response.bytes) {
        return Err(malformed(path, "缺少响应状态行"));
    }
    record.response_headers = parse_header_block(&String::from_utf8_lossy(&response.bytes));

    record.body = reader.read_to_end().map_err(io_err)?;
    Ok(record)
}

/// 重建请求 URL：首行 URL 优先，其次请求行中的绝对地址，最后 https + 主机 + 路径
fn reconstruct_url(record: &KatanaRecord, hint: Option<&str>) -> String {
    if let Some(url) = &record.initial_url {
        return url.clone();
    }

    let Some(target) = record.request_line.split(' ').nth(1) else {
        return String::new();
    };
    if is_absolute_http_url(target) {
        return target.to_string();
    }

    let host = host_header(&record.request_headers).or(hint).unwrap_or_default();
    if host.is_empty() {
        return String::new();
    }

    if target.starts_with('/') {
        format!("https://{host}{target}")
    } else {
        format!("https://{host}/{target}")
    }
}

/// 解析单个 Katana 文件
pub fn parse_katana_file(path: &Path, hint: Option<&str>) -> Result<NormalizedInput, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record = read_record(BufReader::new(file), path)?;

    let domain = host_header(&record.request_headers)
        .or(hint)
        .unwrap_or_default()
        .to_string();
    let url = reconstruct_url(&record, hint);

    tracing::debug!("生成 Katana 单元: {} (域名: {})", url, domain);
    let source_path = path.to_string_lossy().to_string();
    Ok(NormalizedInput::new(domain, url, source_path.as_str())
        .with_checkpoint_qualifier(&source_path)
        .with_headers(record.response_headers)
        .with_body(record.body))
}

/// 从父目录名推断域名提示
fn domain_hint(path: &Path) -> Option<String> {
    let name = path.parent()?.file_name()?.to_string_lossy().to_string();
    if GENERIC_CONTAINER_DIRS.contains(&name.as_str()) {
        None
    } else {
        Some(name)
    }
}

/// 命中断点时只保留标识字段
fn apply_skip(input: NormalizedInput, ctx: &ParseContext) -> NormalizedInput {
    if ctx.should_skip(input.checkpoint_id()) {
        input.into_skip_marker()
    } else {
        input
    }
}

/// 单个 Katana 文件
pub struct KatanaFileParser;

impl CaptureParser for KatanaFileParser {
    fn parse(&self, path: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError> {
        let units = match parse_katana_file(path, None) {
            Ok(input) => vec![apply_skip(input, ctx)],
            Err(err) => {
                tracing::warn!("跳过 Katana 文件: {}", err);
                Vec::new()
            }
        };
        Ok(Box::new(units.into_iter()))
    }
}

/// Katana 输出目录（递归）
pub struct KatanaDirParser;

impl CaptureParser for KatanaDirParser {
    fn parse(&self, root: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError> {
        let ctx = ctx.clone();
        let files = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("遍历 Katana 目录出错: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".txt"))
            .map(|entry| entry.into_path());

        let units = files.filter_map(move |path: PathBuf| {
            let hint = domain_hint(&path);
            match parse_katana_file(&path, hint.as_deref()) {
                Ok(input) => Some(apply_skip(input, &ctx)),
                Err(err) => {
                    tracing::debug!("跳过 Katana 文件: {}", err);
                    None
                }
            }
        });

        Ok(Box::new(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn record(text: &str) -> Result<KatanaRecord, ParseError> {
        read_record(Cursor::new(text.as_bytes().to_vec()), Path::new("test.txt"))
    }

    #[test]
    fn test_initial_url_wins() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("page.txt");
        fs::write(
            &path,
            "http://site.test/x\n\nGET /x HTTP/1.1\nHost: site.test\n\nHTTP/1.1 200 OK\nServer: Apache\n\n<html>x</html>",
        )
        .unwrap();

        let input = parse_katana_file(&path, None).unwrap();
        assert_eq!(input.url, "http://site.test/x");
        assert_eq!(input.domain, "site.test");
        assert_eq!(input.headers["Server"], vec!["Apache"]);
        assert_eq!(input.body, b"<html>x</html>");
    }

    #[test]
    fn test_url_line_without_blank_is_pushed_back() {
        let err = record("https://site.test/\nGET / HTTP/1.1\n\nHTTP/1.1 200 OK\n\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedKatana { reason: "缺少请求行", .. }));
    }

    #[test]
    fn test_crlf_separators_and_relative_path() {
        let rec = record("GET index.html HTTP/1.1\r\nhost: crlf.test\r\n\r\nHTTP/1.1 301 Moved\r\nLocation: /\r\n\r\nbody").unwrap();
        assert_eq!(reconstruct_url(&rec, None), "https://crlf.test/index.html");
        assert_eq!(rec.response_headers["Location"], vec!["/"]);
        assert_eq!(rec.body, b"body");
    }

    #[test]
    fn test_reconstruct_url_fallbacks() {
        let rec = record("GET https://abs.test/a?b=1 HTTP/1.1\n\nHTTP/1.1 200 OK\n\n").unwrap();
        assert_eq!(reconstruct_url(&rec, Some("hint.test")), "https://abs.test/a?b=1");

        let rec = record("GET /p HTTP/1.1\n\nHTTP/1.1 200 OK\n\n").unwrap();
        assert_eq!(reconstruct_url(&rec, Some("hint.test")), "https://hint.test/p");
        assert_eq!(reconstruct_url(&rec, None), "");
    }

    #[test]
    fn test_directory_skips_malformed_files() {
        let temp_dir = tempdir().unwrap();
        let domain_dir = temp_dir.path().join("example.com");
        fs::create_dir_all(&domain_dir).unwrap();
        fs::write(domain_dir.join("good.txt"), "GET /ok HTTP/1.1\n\nHTTP/1.1 200 OK\nServer: nginx\n\nok").unwrap();
        fs::write(domain_dir.join("bad.txt"), "just some notes, nothing http here").unwrap();

        let responses = temp_dir.path().join("responses");
        fs::create_dir_all(&responses).unwrap();
        fs::write(responses.join("r.txt"), "GET / HTTP/1.1\nHost: other.test\n\nHTTP/1.1 200 OK\n\n").unwrap();

        let mut inputs: Vec<_> = KatanaDirParser
            .parse(temp_dir.path(), &ParseContext::new(1))
            .unwrap()
            .collect();
        inputs.sort_by(|a, b| a.domain.cmp(&b.domain));

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].domain, "example.com");
        assert_eq!(inputs[0].url, "https://example.com/ok");
        assert_eq!(inputs[1].domain, "other.test");
    }

    #[test]
    fn test_malformed_single_file_yields_nothing() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.txt");
        fs::write(&path, "HTTP/1.1 200 OK\n\nno request here").unwrap();

        let units = KatanaFileParser.parse(&path, &ParseContext::new(1)).unwrap();
        assert_eq!(units.count(), 0);
    }

    #[test]
    fn test_is_katana_content() {
        assert!(is_katana_content(b"POST /api HTTP/1.1\n\nHTTP/2 200\n\n"));
        assert!(!is_katana_content(b"HTTP/1.1 200 OK\nServer: x\n\n"));
    }
}
