//! Report sinks. Modules record findings through the [`ReportSink`]
//! contract; the shared [`ReportData`] accumulator keeps everything in
//! memory so an interrupted scan still flushes what it collected.

pub mod json;
pub mod text;

use std::path::Path;

use chrono::{DateTime, Utc};
use log::warn;

use crate::catalog::CategoryInfo;
use crate::error::ScanError;
use crate::models::{Finding, FindingKind, Resource, Severity};

#[derive(Default)]
pub struct ReportData {
    pub target: String,
    pub scope: String,
    pub version: String,
    pub started: Option<DateTime<Utc>>,
    pub vulnerability_types: Vec<&'static CategoryInfo>,
    pub anomaly_types: Vec<&'static CategoryInfo>,
    pub findings: Vec<Finding>,
}

impl ReportData {
    pub fn of_kind(&self, kind: FindingKind) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.kind == kind)
    }

    /// Findings of one category, report order.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }
}

/// Recording side of reporting. One sink lives for the whole scan; findings
/// are immutable once logged.
pub trait ReportSink: Send {
    fn data(&self) -> &ReportData;
    fn data_mut(&mut self) -> &mut ReportData;

    /// Serialize everything collected so far to `destination`.
    fn flush(&self, destination: &Path) -> Result<(), ScanError>;

    fn set_target(&mut self, url: &str, scope: &str) {
        let data = self.data_mut();
        data.target = url.to_string();
        data.scope = scope.to_string();
        data.version = env!("CARGO_PKG_VERSION").to_string();
        data.started = Some(Utc::now());
    }

    fn declare_vulnerability(&mut self, info: &'static CategoryInfo) {
        let types = &mut self.data_mut().vulnerability_types;
        if !types.iter().any(|t| t.name == info.name) {
            types.push(info);
        }
    }

    fn declare_anomaly(&mut self, info: &'static CategoryInfo) {
        let types = &mut self.data_mut().anomaly_types;
        if !types.iter().any(|t| t.name == info.name) {
            types.push(info);
        }
    }

    fn log_vulnerability(
        &mut self,
        category: &str,
        severity: Severity,
        request: &Resource,
        parameter: &str,
        info: &str,
    ) {
        warn!("{} in {} via '{}': {}", category, request.url, parameter, info);
        self.data_mut().findings.push(Finding::new(
            FindingKind::Vulnerability,
            category,
            severity,
            request,
            parameter,
            info,
        ));
    }

    fn log_anomaly(
        &mut self,
        category: &str,
        severity: Severity,
        request: &Resource,
        parameter: &str,
        info: &str,
    ) {
        warn!(
            "anomaly: {} in {} via '{}': {}",
            category, request.url, parameter, info
        );
        self.data_mut().findings.push(Finding::new(
            FindingKind::Anomaly,
            category,
            severity,
            request,
            parameter,
            info,
        ));
    }

    fn findings(&self) -> &[Finding] {
        &self.data().findings
    }
}

pub use json::JsonReport;
pub use text::TextReport;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Catalog};
    use url::Url;

    #[test]
    fn declaring_a_category_twice_keeps_one_entry() {
        let catalog = Catalog::builtin();
        let info = catalog.get(catalog::XSS).unwrap();
        let mut sink = TextReport::default();
        sink.declare_vulnerability(info);
        sink.declare_vulnerability(info);
        assert_eq!(sink.data().vulnerability_types.len(), 1);
    }

    #[test]
    fn findings_carry_kind_and_reproduction() {
        let mut sink = TextReport::default();
        sink.set_target("http://site.test/", "folder");
        let r = Resource::get(Url::parse("http://site.test/p?x=1").unwrap(), None);
        sink.log_vulnerability(catalog::SQL_INJECTION, Severity::High, &r, "x", "boom");
        sink.log_anomaly(catalog::INTERNAL_ERROR, Severity::Medium, &r, "x", "500");
        let findings = sink.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, FindingKind::Vulnerability);
        assert_eq!(findings[1].kind, FindingKind::Anomaly);
        assert!(findings[0].http_request.starts_with("GET /p?x=1"));
        assert!(findings[0].curl_command.starts_with("curl"));
    }
}
