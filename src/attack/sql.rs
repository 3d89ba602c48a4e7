//! Error-based SQL injection. One malformed probe per parameter; the
//! response is matched against known DBMS error signatures.

use regex::Regex;

use crate::attack::{AttackContext, AttackModule, ModuleMeta, PatternMemory};
use crate::catalog::{self, Catalog};
use crate::error::ScanError;
use crate::models::{ParamList, Resource, Severity};
use crate::report::ReportSink;

use async_trait::async_trait;

/// Upside-down question mark, quote, double quote, open paren: enough to
/// break string and numeric contexts in every major DBMS at once.
const PROBE: &str = "\u{00BF}'\"(";

const SIGNATURES: &[(&str, &str)] = &[
    (r"You have an error in your SQL syntax", "MySQL"),
    (r"supplied argument is not a valid MySQL", "MySQL"),
    (r"(?i)warning:\s+mysqli?_", "MySQL"),
    (r"\[Microsoft\]\[ODBC Microsoft Access Driver\]", "Access"),
    (r"\[Microsoft\]\[ODBC SQL Server Driver\]", "MSSQL"),
    (r"Microsoft OLE DB Provider for ODBC Drivers", "MSSQL"),
    (r"Unclosed quotation mark after the character string", "MSSQL"),
    (r"java\.sql\.SQLException", "Java"),
    (r"PostgreSQL query failed", "PostgreSQL"),
    (r"(?i)warning:\s+pg_", "PostgreSQL"),
    (r"unterminated quoted string at or near", "PostgreSQL"),
    (r"supplied argument is not a valid PostgreSQL result", "PostgreSQL"),
    (r"ORA-[0-9]{4,5}", "Oracle"),
    (r"SQLite/JDBCDriver", "SQLite"),
    (r"sqlite3?\.OperationalError", "SQLite"),
    (r#"near \".*\": syntax error"#, "SQLite"),
    (r"XPathException", "XPath"),
];

/// Extensions treated as server-generated text when no Content-Type header
/// was captured for the page.
const TEXT_EXTENSIONS: &[&str] = &[
    "php", "php3", "php4", "php5", "phtm", "phtml", "asp", "aspx", "jsp", "jhtml", "pl", "py",
    "cfm", "cfml", "html", "htm", "xhtml", "xht", "xhtm", "shtm", "shtml", "xml", "txt",
];

/// Bare query-string probes only make sense against text content; binary
/// and application-type files never echo a DBMS error.
fn is_text_page(resource: &Resource) -> bool {
    if let Some(ct) = resource.content_type() {
        return ct.contains("text");
    }
    let file = resource.file_name();
    if file.is_empty() {
        // directory URL
        return true;
    }
    match file.rsplit_once('.') {
        Some((_, ext)) => TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

pub struct SqlModule {
    meta: ModuleMeta,
    signatures: Vec<(Regex, &'static str)>,
    attacked: PatternMemory,
}

impl SqlModule {
    pub fn new() -> Self {
        SqlModule {
            meta: ModuleMeta {
                name: "sql",
                priority: 4,
                require: &[],
                common: true,
                do_get: true,
                do_post: true,
            },
            signatures: SIGNATURES
                .iter()
                .filter_map(|(p, d)| Regex::new(p).ok().map(|r| (r, *d)))
                .collect(),
            attacked: PatternMemory::default(),
        }
    }

    fn detect(&self, body: &str) -> Option<&'static str> {
        self.signatures
            .iter()
            .find(|(re, _)| re.is_match(body))
            .map(|(_, dbms)| *dbms)
    }

    /// Send one probe and record what it reveals. Returns Err only for
    /// transport failures other than timeouts.
    async fn probe(
        &mut self,
        evil: &Resource,
        parameter: &str,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let response = match ctx.transport.send(evil).await {
            Ok(r) => r,
            Err(ScanError::Timeout { .. }) => {
                ctx.sink.log_anomaly(
                    catalog::RESOURCE_CONSUMPTION,
                    Severity::Medium,
                    evil,
                    parameter,
                    "timeout while testing for SQL injection",
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if let Some(dbms) = self.detect(&response.body) {
            ctx.sink.log_vulnerability(
                catalog::SQL_INJECTION,
                Severity::High,
                evil,
                parameter,
                &format!("{} error message via parameter '{}'", dbms, parameter),
            );
        } else if response.status == 500 {
            ctx.sink.log_anomaly(
                catalog::INTERNAL_ERROR,
                Severity::Medium,
                evil,
                parameter,
                "server error while testing for SQL injection",
            );
        }
        Ok(())
    }
}

impl Default for SqlModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttackModule for SqlModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_vulnerability(catalog.get(catalog::SQL_INJECTION)?);
        sink.declare_anomaly(catalog.get(catalog::INTERNAL_ERROR)?);
        sink.declare_anomaly(catalog.get(catalog::RESOURCE_CONSUMPTION)?);
        Ok(())
    }

    async fn attack_get(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        if resource.get_params.is_empty() {
            // bare page: attack the query string itself
            if !is_text_page(resource) {
                return Ok(());
            }
            let pattern = format!("GET {} QUERY_STRING", resource.page());
            if !self.attacked.first_time(pattern) {
                return Ok(());
            }
            let encoded: String = url::form_urlencoded::byte_serialize(PROBE.as_bytes()).collect();
            let evil = resource.with_raw_query(&encoded);
            return self.probe(&evil, "QUERY_STRING", ctx).await;
        }
        for index in 0..resource.get_params.len() {
            let pattern = resource.attack_pattern(ParamList::Get, index, "__SQL__");
            if !self.attacked.first_time(pattern) {
                continue;
            }
            let parameter = resource.get_params[index].0.clone();
            let evil = resource.with_get_value(index, PROBE);
            self.probe(&evil, &parameter, ctx).await?;
        }
        Ok(())
    }

    async fn attack_post(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        for index in 0..resource.post_params.len() {
            let pattern = resource.attack_pattern(ParamList::Post, index, "__SQL__");
            if !self.attacked.first_time(pattern) {
                continue;
            }
            let parameter = resource.post_params[index].0.clone();
            let evil = resource.with_post_value(index, PROBE);
            self.probe(&evil, &parameter, ctx).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, Transport};
    use crate::report::TextReport;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    struct Scripted {
        replies: HashMap<String, (u16, String)>,
        hits: Mutex<usize>,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: &Resource) -> Result<HttpResponse, ScanError> {
            *self.hits.lock().unwrap() += 1;
            let key = request.url.to_string();
            let (status, body) = self
                .replies
                .get(&key)
                .cloned()
                .unwrap_or((200, String::new()));
            Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body,
                elapsed: Duration::from_millis(1),
            })
        }
    }

    fn evil_url() -> String {
        let r = Resource::get(Url::parse("http://a/p?id=1").unwrap(), None);
        r.with_get_value(0, PROBE).url.to_string()
    }

    #[tokio::test]
    async fn mysql_error_in_reply_is_a_vulnerability() {
        let transport = Scripted {
            replies: [(
                evil_url(),
                (
                    200,
                    "You have an error in your SQL syntax near ''\"('".to_string(),
                ),
            )]
            .into_iter()
            .collect(),
            hits: Mutex::new(0),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = SqlModule::new();
        let r = Resource::get(Url::parse("http://a/p?id=1").unwrap(), None);
        module.attack_get(&r, &mut ctx).await.unwrap();
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, catalog::SQL_INJECTION);
        assert_eq!(findings[0].parameter, "id");
    }

    #[tokio::test]
    async fn plain_500_is_an_anomaly() {
        let transport = Scripted {
            replies: [(evil_url(), (500, "boom".to_string()))].into_iter().collect(),
            hits: Mutex::new(0),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = SqlModule::new();
        let r = Resource::get(Url::parse("http://a/p?id=1").unwrap(), None);
        module.attack_get(&r, &mut ctx).await.unwrap();
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, catalog::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn bare_query_probe_skips_non_text_content() {
        let transport = Scripted {
            replies: HashMap::new(),
            hits: Mutex::new(0),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = SqlModule::new();

        let mut pdf = Resource::get(Url::parse("http://a/report.pdf").unwrap(), None);
        pdf.headers
            .insert("content-type".to_string(), "application/pdf".to_string());
        module.attack_get(&pdf, &mut ctx).await.unwrap();
        assert_eq!(*transport.hits.lock().unwrap(), 0);

        // no header either: the extension decides
        let image = Resource::get(Url::parse("http://a/logo.png").unwrap(), None);
        module.attack_get(&image, &mut ctx).await.unwrap();
        assert_eq!(*transport.hits.lock().unwrap(), 0);

        let mut page = Resource::get(Url::parse("http://a/index.php").unwrap(), None);
        page.headers
            .insert("content-type".to_string(), "text/html".to_string());
        module.attack_get(&page, &mut ctx).await.unwrap();
        assert_eq!(*transport.hits.lock().unwrap(), 1);

        // directory URLs count as text even without a header
        let dir = Resource::get(Url::parse("http://a/admin/").unwrap(), None);
        module.attack_get(&dir, &mut ctx).await.unwrap();
        assert_eq!(*transport.hits.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn same_target_is_probed_once() {
        let transport = Scripted {
            replies: HashMap::new(),
            hits: Mutex::new(0),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = SqlModule::new();
        let a = Resource::get(Url::parse("http://a/p?id=1").unwrap(), None);
        let b = Resource::get(Url::parse("http://a/p?id=2").unwrap(), None);
        module.attack_get(&a, &mut ctx).await.unwrap();
        module.attack_get(&b, &mut ctx).await.unwrap();
        assert_eq!(*transport.hits.lock().unwrap(), 1);
    }
}
