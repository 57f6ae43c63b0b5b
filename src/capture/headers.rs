use crate::models::input::{append_header, HeaderMap};

/// 识别请求行时接受的 HTTP 方法
pub const REQUEST_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "HEAD", "DELETE", "OPTIONS", "PATCH", "CONNECT", "TRACE",
];

/// 去掉行尾的 `\n` / `\r\n`
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// 块分隔用的空行（仅由换行符组成）
pub fn is_blank_line(line: &[u8]) -> bool {
    trim_line_ending(line).is_empty()
}

/// `HTTP/<digit>...` 形式的状态行
pub fn is_status_line(line: &[u8]) -> bool {
    line.strip_prefix(b"HTTP/")
        .and_then(|rest| rest.first())
        .is_some_and(|b| b.is_ascii_digit())
}

/// `METHOD <target> ...` 形式的请求行
pub fn is_request_line(line: &[u8]) -> bool {
    let line = String::from_utf8_lossy(trim_line_ending(line));
    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => REQUEST_METHODS.contains(&method) && !target.is_empty(),
        _ => false,
    }
}

pub fn contains_status_line(data: &[u8]) -> bool {
    data.split(|b| *b == b'\n').any(is_status_line)
}

pub fn contains_request_line(data: &[u8]) -> bool {
    data.split(|b| *b == b'\n').any(is_request_line)
}

/// 解析一行 `key: value`；键不能为空且不能包含空白
pub fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

/// 解析头部文本块：首行为状态行时丢弃，其余每个非空 `key: value` 行追加到映射中
pub fn parse_header_block(text: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if index == 0 && is_status_line(line.as_bytes()) {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if let Some((key, value)) = parse_header_line(line) {
            append_header(&mut headers, key, value);
        }
    }

    headers
}

pub fn is_absolute_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
