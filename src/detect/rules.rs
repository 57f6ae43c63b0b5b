use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;

use super::Detector;
use crate::error::DetectError;
use crate::models::{Detection, HeaderMap, SourceHint};

/// 内置规则
pub const DEFAULT_RULES: &str = r#"
[[technology]]
name = "Nginx"
headers = { Server = "(?i)nginx" }

[[technology]]
name = "Apache HTTP Server"
headers = { Server = "(?i)apache" }

[[technology]]
name = "Cloudflare"
headers = { Server = "(?i)cloudflare", CF-RAY = "." }

[[technology]]
name = "PHP"
headers = { X-Powered-By = "(?i)php" }
body = ['\.php(\?|")']
confidence = "medium"

[[technology]]
name = "Express"
headers = { X-Powered-By = "(?i)express" }

[[technology]]
name = "ASP.NET"
headers = { X-Powered-By = "(?i)asp\\.net", X-AspNet-Version = "." }

[[technology]]
name = "WordPress"
body = ["/wp-content/", "/wp-includes/", '<meta name="generator" content="WordPress']

[[technology]]
name = "Next.js"
headers = { X-Powered-By = "(?i)next\\.js" }
body = ["/_next/static/", "__NEXT_DATA__"]

[[technology]]
name = "React"
body = ["data-reactroot", "react(\\.production)?(\\.min)?\\.js"]
confidence = "medium"

[[technology]]
name = "jQuery"
body = ['jquery[.-]?(\d+\.\d+\.\d+)?(\.min)?\.js']
"#;

/// 证据文本的最大长度
const MAX_EVIDENCE_LEN: usize = 120;

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    technology: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    name: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Vec<String>,
    #[serde(default = "default_confidence")]
    confidence: String,
}

fn default_confidence() -> String {
    "high".to_string()
}

#[derive(Debug)]
struct TechnologyRule {
    name: String,
    confidence: String,
    headers: Vec<(String, Regex)>,
    body: Vec<Regex>,
}

/// 正则规则检测器
#[derive(Debug)]
pub struct RuleDetector {
    rules: Vec<TechnologyRule>,
}

impl RuleDetector {
    /// 从 TOML 文本构建
    pub fn from_toml(text: &str) -> Result<Self, DetectError> {
        let file: RuleFile = toml::from_str(text).map_err(|e| DetectError::InvalidRules(e.to_string()))?;

        let rules = file
            .technology
            .into_iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// 从规则文件构建
    pub fn from_file(path: &Path) -> Result<Self, DetectError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DetectError::InvalidRules(format!("无法读取 {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// 使用内置规则
    pub fn builtin() -> Result<Self, DetectError> {
        Self::from_toml(DEFAULT_RULES)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile_rule(def: RuleDef) -> Result<TechnologyRule, DetectError> {
    let compile = |pattern: &str| {
        Regex::new(pattern).map_err(|e| DetectError::InvalidRules(format!("{}: {}", def.name, e)))
    };

    let headers = def
        .headers
        .iter()
        .map(|(name, pattern)| Ok((name.clone(), compile(pattern)?)))
        .collect::<Result<Vec<_>, DetectError>>()?;
    let body = def
        .body
        .iter()
        .map(|pattern| compile(pattern))
        .collect::<Result<Vec<_>, DetectError>>()?;

    Ok(TechnologyRule {
        name: def.name,
        confidence: def.confidence,
        headers,
        body,
    })
}

/// 命中的位置与证据
struct RuleMatch {
    path: String,
    evidence: String,
}

impl TechnologyRule {
    fn match_headers(&self, headers: &HeaderMap) -> Option<RuleMatch> {
        self.headers.iter().find_map(|(name, pattern)| {
            headers
                .iter()
                .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                .flat_map(|(_, values)| values.iter())
                .find(|value| pattern.is_match(value))
                .map(|value| RuleMatch {
                    path: format!("header:{}", name.to_ascii_lowercase()),
                    evidence: truncate(value),
                })
        })
    }

    fn match_body(&self, body: &str) -> Option<RuleMatch> {
        self.body.iter().find_map(|pattern| {
            pattern.find(body).map(|m| RuleMatch {
                path: "body".to_string(),
                evidence: truncate(m.as_str()),
            })
        })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_EVIDENCE_LEN).collect()
}

impl Detector for RuleDetector {
    fn detect(&self, headers: &HeaderMap, body: &[u8], hint: SourceHint) -> Result<Vec<Detection>, DetectError> {
        let use_headers = hint != SourceHint::BodyOnly;
        let use_body = hint != SourceHint::HeadersOnly && !body.is_empty();
        let body_text = if use_body {
            String::from_utf8_lossy(body)
        } else {
            Default::default()
        };

        let timestamp = Utc::now();
        let detections = self
            .rules
            .iter()
            .filter_map(|rule| {
                let found = use_headers
                    .then(|| rule.match_headers(headers))
                    .flatten()
                    .or_else(|| use_body.then(|| rule.match_body(&body_text)).flatten())?;

                Some(Detection {
                    domain: String::new(),
                    url: String::new(),
                    technology: rule.name.clone(),
                    source: hint.source_tag().to_string(),
                    path: found.path,
                    evidence: found.evidence,
                    confidence: rule.confidence.clone(),
                    timestamp,
                })
            })
            .collect();

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::input::append_header;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in pairs {
            append_header(&mut map, *key, *value);
        }
        map
    }

    #[test]
    fn test_builtin_rules_compile() {
        let detector = RuleDetector::builtin().unwrap();
        assert!(detector.len() >= 8);
    }

    #[test]
    fn test_header_and_body_matches() {
        let detector = RuleDetector::builtin().unwrap();
        let found = detector
            .detect(
                &headers(&[("server", "nginx/1.18.0")]),
                b"<link href='/wp-content/themes/x.css'>",
                SourceHint::Auto,
            )
            .unwrap();

        let mut names: Vec<_> = found.iter().map(|d| d.technology.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Nginx", "WordPress"]);

        let nginx = found.iter().find(|d| d.technology == "Nginx").unwrap();
        assert_eq!(nginx.path, "header:server");
        assert_eq!(nginx.evidence, "nginx/1.18.0");
        assert_eq!(nginx.source, "fingerprint");
    }

    #[test]
    fn test_source_hint_limits_inputs() {
        let detector = RuleDetector::builtin().unwrap();
        let hdrs = headers(&[("Server", "Apache/2.4")]);
        let body = b"<script src='/_next/static/chunk.js'></script>";

        let found = detector.detect(&hdrs, body, SourceHint::HeadersOnly).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].technology, "Apache HTTP Server");
        assert_eq!(found[0].source, "fingerprint-header");

        let found = detector.detect(&hdrs, body, SourceHint::BodyOnly).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].technology, "Next.js");
        assert_eq!(found[0].source, "fingerprint-body");
    }

    #[test]
    fn test_invalid_rules() {
        assert!(matches!(
            RuleDetector::from_toml("[[technology]]\nname = \"Bad\"\nbody = [\"(unclosed\"]"),
            Err(DetectError::InvalidRules(_))
        ));
        assert!(RuleDetector::from_toml("not = [valid").is_err());
    }
}
