//! Plain-text report renderer.

use std::fs;
use std::path::Path;

use crate::error::ScanError;
use crate::models::FindingKind;
use crate::report::{ReportData, ReportSink};

#[derive(Default)]
pub struct TextReport {
    data: ReportData,
}

impl ReportSink for TextReport {
    fn data(&self) -> &ReportData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ReportData {
        &mut self.data
    }

    fn flush(&self, destination: &Path) -> Result<(), ScanError> {
        fs::write(destination, render(&self.data))?;
        Ok(())
    }
}

fn rule(c: char) -> String {
    std::iter::repeat(c).take(72).collect()
}

pub fn render(data: &ReportData) -> String {
    let mut out = String::new();
    out.push_str(&rule('='));
    out.push_str("\nScan report for ");
    out.push_str(&data.target);
    out.push('\n');
    if !data.scope.is_empty() {
        out.push_str(&format!("Scope: {}\n", data.scope));
    }
    if let Some(started) = data.started {
        out.push_str(&format!("Started {}\n", started.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    if !data.version.is_empty() {
        out.push_str(&format!("webhound {}\n", data.version));
    }
    out.push_str(&rule('='));
    out.push('\n');

    for (title, kind, types) in [
        ("Vulnerabilities", FindingKind::Vulnerability, &data.vulnerability_types),
        ("Anomalies", FindingKind::Anomaly, &data.anomaly_types),
    ] {
        let findings: Vec<_> = data.of_kind(kind).collect();
        out.push_str(&format!("\n{} ({})\n", title, findings.len()));
        out.push_str(&rule('-'));
        out.push('\n');
        for info in types {
            let in_cat: Vec<_> = findings
                .iter()
                .filter(|f| f.category == info.name)
                .collect();
            if in_cat.is_empty() {
                continue;
            }
            out.push_str(&format!("\n* {}\n", info.name));
            out.push_str(&format!("  {}\n", info.description));
            out.push_str(&format!("  Solution: {}\n", info.solution));
            for reference in info.references {
                out.push_str(&format!("  See: {}\n", reference));
            }
            for f in in_cat {
                out.push_str(&format!(
                    "\n  [{}] {} (parameter: {})\n  {}\n",
                    f.severity.as_str(),
                    f.url,
                    if f.parameter.is_empty() { "-" } else { &f.parameter },
                    f.info,
                ));
                for line in f.http_request.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str(&format!("    {}\n", f.curl_command));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Catalog};
    use crate::models::{Resource, Severity};
    use url::Url;

    #[test]
    fn render_groups_by_category_and_kind() {
        let catalog = Catalog::builtin();
        let mut sink = TextReport::default();
        sink.set_target("http://site.test/", "folder");
        sink.declare_vulnerability(catalog.get(catalog::SQL_INJECTION).unwrap());
        sink.declare_anomaly(catalog.get(catalog::INTERNAL_ERROR).unwrap());
        let r = Resource::get(Url::parse("http://site.test/p?id=1").unwrap(), None);
        sink.log_vulnerability(
            catalog::SQL_INJECTION,
            Severity::High,
            &r,
            "id",
            "MySQL error",
        );

        let text = render(sink.data());
        assert!(text.contains("Scan report for http://site.test/"));
        assert!(text.contains("Vulnerabilities (1)"));
        assert!(text.contains("* SQL Injection"));
        assert!(text.contains("(parameter: id)"));
        assert!(text.contains("curl"));
        assert!(text.contains("Anomalies (0)"));
        // declared but empty anomaly category is not listed
        assert!(!text.contains("* Internal Server Error"));
    }
}
