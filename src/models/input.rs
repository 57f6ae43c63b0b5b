use std::collections::BTreeMap;

/// 多值 HTTP 头映射：同名头按出现顺序追加
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// 无法确定域名时使用的占位值
pub const UNDETERMINED_DOMAIN: &str = "unknown";

/// 标准化后的扫描单元，与来源格式无关
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedInput {
    /// 域名（进入检测阶段前必须非空）
    pub domain: String,

    /// 完整 URL（原始响应转储等场景下为空）
    pub url: String,

    /// 响应头
    pub headers: HeaderMap,

    /// 响应体原始字节
    pub body: Vec<u8>,

    /// 该单元来自的文件路径
    pub source_path: String,

    /// 断点续扫命中时由解析器直接产出的跳过标记，不含头和正文
    pub skipped: bool,

    /// 带限定后缀的断点标识，同一来源内多个单元共享 URL 或域名时使用
    pub checkpoint_key: Option<String>,
}

impl NormalizedInput {
    pub fn new(domain: impl Into<String>, url: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            url: url.into(),
            source_path: source_path.into(),
            ..Default::default()
        }
    }

    /// 转为跳过标记，保留标识字段
    pub fn into_skip_marker(self) -> Self {
        Self {
            skipped: true,
            headers: HeaderMap::new(),
            body: Vec::new(),
            ..self
        }
    }

    /// 给断点标识追加 `#<qualifier>`；标识本身已是来源路径时不变
    pub fn with_checkpoint_qualifier(mut self, qualifier: &str) -> Self {
        let base = unit_id(&self.url, &self.domain, &self.source_path);
        if base != self.source_path {
            self.checkpoint_key = Some(format!("{base}#{qualifier}"));
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// 断点记录中使用的标识：URL，其次域名，最后来源路径；有限定后缀时以其为准
    pub fn checkpoint_id(&self) -> &str {
        match &self.checkpoint_key {
            Some(key) => key,
            None => unit_id(&self.url, &self.domain, &self.source_path),
        }
    }

    /// 分派到检测前的模式校验
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.domain.is_empty() {
            return Err("domain 不能为空");
        }
        Ok(())
    }
}

/// 计算单元标识；占位域名不参与标识，避免不同响应互相覆盖
pub fn unit_id<'a>(url: &'a str, domain: &'a str, source_path: &'a str) -> &'a str {
    if !url.is_empty() {
        url
    } else if !domain.is_empty() && domain != UNDETERMINED_DOMAIN {
        domain
    } else {
        source_path
    }
}

/// 大小写不敏感地读取 Host 头
pub fn host_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("host"))
        .and_then(|(_, values)| values.first())
        .map(|value| value.as_str())
        .filter(|value| !value.is_empty())
}

/// 追加一个头值（同名多值追加而非覆盖）
pub fn append_header(headers: &mut HeaderMap, key: impl Into<String>, value: impl Into<String>) {
    headers.entry(key.into()).or_default().push(value.into());
}
