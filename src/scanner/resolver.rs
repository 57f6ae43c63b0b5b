use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::LiveTarget;

/// 解析在线扫描的输入：`-` 读标准输入，普通文件按行读取，否则视为单个 URL
pub fn resolve_targets(input: &str) -> Result<Vec<LiveTarget>> {
    if input == "-" {
        tracing::debug!("从标准输入读取目标");
        return read_targets(io::stdin().lock());
    }

    let path = Path::new(input);
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            bail!("输入 '{}' 是目录，在线模式只接受 URL 或 URL 列表文件", input)
        }
        Ok(_) => {
            tracing::debug!("从文件读取目标: {}", input);
            let file = File::open(path).with_context(|| format!("无法打开输入文件 {input}"))?;
            read_targets(BufReader::new(file))
        }
        Err(_) => {
            let target = LiveTarget::parse(input)?;
            Ok(vec![target])
        }
    }
}

/// 每行一个目标；空行忽略，无效行警告后跳过
pub fn read_targets<R: BufRead>(reader: R) -> Result<Vec<LiveTarget>> {
    let mut targets = Vec::new();
    for line in reader.lines() {
        let line = line.context("读取目标列表失败")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match LiveTarget::parse(line) {
            Ok(target) => targets.push(target),
            Err(err) => tracing::warn!("跳过无效输入行 '{}': {}", line, err),
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_read_targets_skips_blank_and_invalid() {
        let input = "https://a.test\n\n   \nnot a url\nhttp://www.b.test/path\n";
        let targets = read_targets(Cursor::new(input)).unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].domain, "a.test");
        assert_eq!(targets[1].url, "http://www.b.test/path");
        assert_eq!(targets[1].domain, "b.test");
    }

    #[test]
    fn test_resolve_file_direct_and_directory() {
        let temp_dir = tempdir().unwrap();
        let list = temp_dir.path().join("targets.txt");
        fs::write(&list, "https://one.test\nhttps://two.test\n").unwrap();

        assert_eq!(resolve_targets(list.to_str().unwrap()).unwrap().len(), 2);
        assert_eq!(
            resolve_targets("https://direct.test").unwrap(),
            vec![LiveTarget::parse("https://direct.test").unwrap()]
        );
        assert!(resolve_targets(temp_dir.path().to_str().unwrap()).is_err());
        assert!(resolve_targets("definitely not a url").is_err());
    }
}
