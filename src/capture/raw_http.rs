//! 原始 HTTP 响应转储：一个文件中首尾相接的多个响应

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::headers::{
    contains_request_line, contains_status_line, is_blank_line, is_status_line, parse_header_block,
    parse_header_line, trim_line_ending,
};
use super::{CaptureParser, ParseContext, UnitStream};
use crate::error::CaptureError;
use crate::models::{host_header, NormalizedInput, UNDETERMINED_DOMAIN};

/// 有状态行、没有请求行，且首行之后第一个空行之前至少有一行 `key: value`
pub fn is_raw_http_content(data: &[u8]) -> bool {
    if !contains_status_line(data) || contains_request_line(data) {
        return false;
    }

    data.split(|b| *b == b'\n')
        .skip(1)
        .take_while(|line| !is_blank_line(line))
        .any(|line| parse_header_line(&String::from_utf8_lossy(trim_line_ending(line))).is_some())
}

/// 原始响应转储解析器
pub struct RawHttpParser;

impl CaptureParser for RawHttpParser {
    fn parse(&self, path: &Path, ctx: &ParseContext) -> Result<UnitStream, CaptureError> {
        let file = File::open(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let source = path.to_string_lossy().to_string();
        let ctx = ctx.clone();
        let units = RawResponses::new(BufReader::new(file))
            .enumerate()
            .map(move |(index, block)| build_input(block, &source, index + 1, &ctx));

        Ok(Box::new(units))
    }
}

fn build_input(block: ResponseBlock, source: &str, ordinal: usize, ctx: &ParseContext) -> NormalizedInput {
    let domain = host_header(&block.headers)
        .unwrap_or(UNDETERMINED_DOMAIN)
        .to_string();
    let source_path = format!("{source}#{ordinal}");

    let input = NormalizedInput::new(domain, "", source_path.as_str()).with_checkpoint_qualifier(&source_path);
    if ctx.should_skip(input.checkpoint_id()) {
        return input.into_skip_marker();
    }

    tracing::debug!("生成原始响应单元 #{} (域名: {}, URL 未知)", ordinal, input.domain);
    input.with_headers(block.headers).with_body(block.body)
}

/// 拆分后的单个响应
#[derive(Debug)]
struct ResponseBlock {
    headers: crate::models::HeaderMap,
    body: Vec<u8>,
}

/// 以状态行为边界逐个切出响应，只缓冲当前一个响应
struct RawResponses<R> {
    reader: R,
    buffer: Vec<u8>,
    finished: bool,
}

impl<R: BufRead> RawResponses<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for RawResponses<R> {
    type Item = ResponseBlock;

    fn next(&mut self) -> Option<ResponseBlock> {
        while !self.finished {
            let mut line = Vec::new();
            let read = match self.reader.read_until(b'\n', &mut line) {
                Ok(read) => read,
                Err(err) => {
                    tracing::warn!("读取原始响应数据出错: {}", err);
                    0
                }
            };

            if read == 0 {
                self.finished = true;
                let rest = std::mem::take(&mut self.buffer);
                return split_response(&rest);
            }

            if is_status_line(&line) && !self.buffer.is_empty() {
                let previous = std::mem::replace(&mut self.buffer, line);
                if let Some(block) = split_response(&previous) {
                    return Some(block);
                }
                continue;
            }

            self.buffer.extend_from_slice(&line);
        }
        None
    }
}

/// 首行必须是状态行；第一个空行之前为头部，之后为正文
fn split_response(block: &[u8]) -> Option<ResponseBlock> {
    let first_line = block.split(|b| *b == b'\n').next()?;
    if !is_status_line(first_line) {
        return None;
    }

    let mut header_end = block.len();
    let mut body_start = block.len();
    let mut offset = 0;
    for line in block.split_inclusive(|b| *b == b'\n') {
        if is_blank_line(line) {
            header_end = offset;
            body_start = offset + line.len();
            break;
        }
        offset += line.len();
    }

    let header_bytes = &block[..header_end];
    if header_bytes.is_empty() {
        return None;
    }

    Some(ResponseBlock {
        headers: parse_header_block(&String::from_utf8_lossy(header_bytes)),
        body: block[body_start..].to_vec(),
    })
}
