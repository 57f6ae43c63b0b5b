pub struct DefaultConfig;

impl DefaultConfig {
    /// 默认并发工作者数量
    pub const WORKERS: usize = 10;

    /// 默认在线抓取超时（秒）
    pub const TIMEOUT_SECS: u64 = 10;

    /// 默认断点文件名（当前目录下）
    pub const CHECKPOINT_FILE: &'static str = ".capture-scan.resume";

    /// 默认解析并行度：CPU 核心数
    pub fn parallelism() -> usize {
        num_cpus::get().max(1)
    }
}
