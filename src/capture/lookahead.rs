use std::collections::VecDeque;
use std::io::{self, BufRead};

use super::headers::is_blank_line;

/// 按行读取的缓冲读取器，支持把已读取的少量行退回到同一个逻辑流中
pub struct LookaheadReader<R> {
    inner: R,
    pending: VecDeque<Vec<u8>>,
    capacity: usize,
}

/// 以空行结束的文本块
#[derive(Debug, Default)]
pub struct Block {
    pub bytes: Vec<u8>,

    /// 是否遇到了分隔空行（false 表示读到了文件末尾）
    pub terminated: bool,
}

impl<R: BufRead> LookaheadReader<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        Self {
            inner,
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 读取下一行（包含行尾换行符），到达末尾返回 None
    pub fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }

        let mut line = Vec::new();
        if self.inner.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// 按原顺序退回若干行
    pub fn unread(&mut self, lines: Vec<Vec<u8>>) -> io::Result<()> {
        if self.pending.len() + lines.len() > self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "lookahead capacity exceeded",
            ));
        }
        for line in lines.into_iter().rev() {
            self.pending.push_front(line);
        }
        Ok(())
    }

    /// 读取到下一个空行为止；空行被消费但不计入结果
    pub fn read_block(&mut self) -> io::Result<Block> {
        let mut block = Block::default();
        while let Some(line) = self.next_line()? {
            if is_blank_line(&line) {
                block.terminated = true;
                break;
            }
            block.bytes.extend_from_slice(&line);
        }
        Ok(block)
    }

    /// 读取剩余全部内容
    pub fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut rest: Vec<u8> = self.pending.drain(..).flatten().collect();
        self.inner.read_to_end(&mut rest)?;
        Ok(rest)
    }
}
