use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Severity ordering used by report sinks: Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingKind {
    Vulnerability,
    Anomaly,
}

/// A value pair carried by file-upload form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileField {
    pub filename: String,
    pub content: String,
}

impl FileField {
    pub fn placeholder() -> Self {
        FileField {
            filename: "upload.txt".to_string(),
            content: "Hello".to_string(),
        }
    }
}

/// One captured HTTP exchange: the request that was made during the crawl
/// together with what came back. Immutable after capture; attack modules
/// clone it and mutate the copy, so parameter order is preserved and the
/// original is never touched.
#[derive(Debug, Clone)]
pub struct Resource {
    pub method: String,
    pub url: Url,
    pub get_params: Vec<(String, String)>,
    pub post_params: Vec<(String, String)>,
    pub file_params: Vec<(String, FileField)>,
    pub referer: Option<String>,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed: Duration,
}

impl Resource {
    /// A GET resource for `url`; query parameters are split out of the URL.
    pub fn get(url: Url, referer: Option<String>) -> Self {
        let get_params = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Resource {
            method: "GET".to_string(),
            url,
            get_params,
            post_params: Vec::new(),
            file_params: Vec::new(),
            referer,
            status: 0,
            headers: HashMap::new(),
            body: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// A POST form resource with its typed fields.
    pub fn form(
        url: Url,
        post_params: Vec<(String, String)>,
        file_params: Vec<(String, FileField)>,
        referer: Option<String>,
    ) -> Self {
        let get_params = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Resource {
            method: "POST".to_string(),
            url,
            get_params,
            post_params,
            file_params,
            referer,
            status: 0,
            headers: HashMap::new(),
            body: String::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// URL without its query string.
    pub fn page(&self) -> String {
        let mut u = self.url.clone();
        u.set_query(None);
        u.set_fragment(None);
        u.to_string()
    }

    /// Last path segment, empty for directory URLs.
    pub fn file_name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("")
            .to_string()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Copy of this resource with the GET parameter at `index` replaced.
    /// The URL query string is rebuilt so it stays in sync with the list.
    pub fn with_get_value(&self, index: usize, value: &str) -> Resource {
        let mut copy = self.clone();
        if let Some(p) = copy.get_params.get_mut(index) {
            p.1 = value.to_string();
        }
        copy.sync_query();
        copy
    }

    pub fn with_post_value(&self, index: usize, value: &str) -> Resource {
        let mut copy = self.clone();
        if let Some(p) = copy.post_params.get_mut(index) {
            p.1 = value.to_string();
        }
        copy
    }

    pub fn with_file_value(&self, index: usize, filename: &str) -> Resource {
        let mut copy = self.clone();
        if let Some(p) = copy.file_params.get_mut(index) {
            p.1.filename = filename.to_string();
        }
        copy
    }

    /// Copy with the whole query string replaced by raw (already encoded) text.
    pub fn with_raw_query(&self, query: &str) -> Resource {
        let mut copy = self.clone();
        copy.url.set_query(Some(query));
        copy.get_params.clear();
        copy
    }

    /// Copy with a different HTTP method, everything else untouched.
    pub fn with_method(&self, method: &str) -> Resource {
        let mut copy = self.clone();
        copy.method = method.to_string();
        copy
    }

    /// Replace every parameter value equal to `needle` (in all three lists)
    /// and rebuild the query string. Used to swap a marker code for a payload.
    pub fn replacing_value(&self, needle: &str, replacement: &str) -> Resource {
        let mut copy = self.clone();
        for p in copy.get_params.iter_mut() {
            if p.1 == needle {
                p.1 = replacement.to_string();
            }
        }
        for p in copy.post_params.iter_mut() {
            if p.1 == needle {
                p.1 = replacement.to_string();
            }
        }
        for p in copy.file_params.iter_mut() {
            if p.1.filename == needle {
                p.1.filename = replacement.to_string();
            }
        }
        copy.sync_query();
        copy
    }

    fn sync_query(&mut self) {
        if self.get_params.is_empty() {
            self.url.set_query(None);
            return;
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.get_params.iter().map(|(k, v)| (k, v)))
            .finish();
        self.url.set_query(Some(&query));
    }

    /// Dedup signature for "same target + same parameter position" probes:
    /// the parameter under attack is replaced by `marker` so different
    /// payloads against the same slot collapse to one pattern.
    pub fn attack_pattern(&self, list: ParamList, index: usize, marker: &str) -> String {
        let render = |params: &[(String, String)], hit: bool| {
            params
                .iter()
                .enumerate()
                .map(|(i, (k, v))| {
                    if hit && i == index {
                        format!("{}={}", k, marker)
                    } else {
                        format!("{}={}", k, v)
                    }
                })
                .collect::<Vec<_>>()
                .join("&")
        };
        let files = self
            .file_params
            .iter()
            .enumerate()
            .map(|(i, (k, v))| {
                if list == ParamList::File && i == index {
                    format!("{}={}", k, marker)
                } else {
                    format!("{}={}", k, v.filename)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        format!(
            "{} {} g[{}] p[{}] f[{}]",
            self.method,
            self.page(),
            render(&self.get_params, list == ParamList::Get),
            render(&self.post_params, list == ParamList::Post),
            files,
        )
    }

    /// Raw-HTTP rendition of the request, for reports.
    pub fn http_repr(&self) -> String {
        let mut out = format!(
            "{} {}{} HTTP/1.1\nHost: {}",
            self.method,
            self.url.path(),
            self.url
                .query()
                .map(|q| format!("?{}", q))
                .unwrap_or_default(),
            self.url.host_str().unwrap_or(""),
        );
        if let Some(referer) = &self.referer {
            out.push_str(&format!("\nReferer: {}", referer));
        }
        if !self.post_params.is_empty() || !self.file_params.is_empty() {
            let body = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.post_params.iter().map(|(k, v)| (k, v)))
                .extend_pairs(self.file_params.iter().map(|(k, v)| (k, &v.filename)))
                .finish();
            out.push_str("\nContent-Type: application/x-www-form-urlencoded\n\n");
            out.push_str(&body);
        }
        out
    }

    /// curl proof-of-concept command for the request.
    pub fn curl_repr(&self) -> String {
        let mut out = format!("curl \"{}\"", self.url);
        if self.method != "GET" {
            out.push_str(&format!(" -X {}", self.method));
        }
        for (k, v) in &self.post_params {
            out.push_str(&format!(" -d \"{}={}\"", k, v));
        }
        if let Some(referer) = &self.referer {
            out.push_str(&format!(" -e \"{}\"", referer));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamList {
    Get,
    Post,
    File,
}

/// One recorded finding. Owned by the report sink, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub category: String,
    pub severity: Severity,
    pub url: String,
    pub parameter: String,
    pub info: String,
    pub http_request: String,
    pub curl_command: String,
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    pub fn new(
        kind: FindingKind,
        category: &str,
        severity: Severity,
        request: &Resource,
        parameter: &str,
        info: &str,
    ) -> Self {
        Finding {
            kind,
            category: category.to_string(),
            severity,
            url: request.url.to_string(),
            parameter: parameter.to_string(),
            info: info.to_string(),
            http_request: request.http_repr(),
            curl_command: request.curl_repr(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(u: &str) -> Resource {
        Resource::get(Url::parse(u).unwrap(), None)
    }

    #[test]
    fn get_splits_query_pairs_in_order() {
        let r = res("http://site.test/page.php?a=1&b=2");
        assert_eq!(
            r.get_params,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn with_get_value_keeps_parameter_order() {
        let r = res("http://site.test/page.php?a=1&b=2&c=3");
        let evil = r.with_get_value(1, "PAYLOAD");
        assert_eq!(evil.get_params[0].1, "1");
        assert_eq!(evil.get_params[1].1, "PAYLOAD");
        assert_eq!(evil.get_params[2].1, "3");
        assert_eq!(evil.url.query(), Some("a=1&b=PAYLOAD&c=3"));
        // original untouched
        assert_eq!(r.get_params[1].1, "2");
        assert_eq!(r.url.query(), Some("a=1&b=2&c=3"));
    }

    #[test]
    fn attack_pattern_collapses_payload_variants() {
        let r = res("http://site.test/p?x=1");
        let a = r
            .with_get_value(0, "' OR 1")
            .attack_pattern(ParamList::Get, 0, "__M__");
        let b = r
            .with_get_value(0, "zzz")
            .attack_pattern(ParamList::Get, 0, "__M__");
        assert_eq!(a, b);
    }

    #[test]
    fn file_name_of_directory_is_empty() {
        assert_eq!(res("http://site.test/dir/").file_name(), "");
        assert_eq!(res("http://site.test/dir/x.php").file_name(), "x.php");
    }

    #[test]
    fn http_repr_carries_post_body() {
        let u = Url::parse("http://site.test/form.php").unwrap();
        let f = Resource::form(
            u,
            vec![("name".to_string(), "bob".to_string())],
            vec![],
            Some("http://site.test/".to_string()),
        );
        let repr = f.http_repr();
        assert!(repr.starts_with("POST /form.php HTTP/1.1"));
        assert!(repr.contains("Referer: http://site.test/"));
        assert!(repr.ends_with("name=bob"));
    }
}
