//! JSON report renderer.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::ScanError;
use crate::models::{Finding, FindingKind};
use crate::report::{ReportData, ReportSink};

#[derive(Default)]
pub struct JsonReport {
    data: ReportData,
}

#[derive(Serialize)]
struct JsonCategory<'a> {
    name: &'a str,
    description: &'a str,
    solution: &'a str,
    references: &'a [&'a str],
    findings: Vec<&'a Finding>,
}

#[derive(Serialize)]
struct JsonDocument<'a> {
    target: &'a str,
    scope: &'a str,
    version: &'a str,
    date: Option<String>,
    vulnerabilities: Vec<JsonCategory<'a>>,
    anomalies: Vec<JsonCategory<'a>>,
}

fn categories(data: &ReportData, kind: FindingKind) -> Vec<JsonCategory<'_>> {
    let types = match kind {
        FindingKind::Vulnerability => &data.vulnerability_types,
        FindingKind::Anomaly => &data.anomaly_types,
    };
    types
        .iter()
        .map(|info| JsonCategory {
            name: info.name,
            description: info.description,
            solution: info.solution,
            references: info.references,
            findings: data
                .of_kind(kind)
                .filter(|f| f.category == info.name)
                .collect(),
        })
        .collect()
}

pub fn render(data: &ReportData) -> Result<String, ScanError> {
    let doc = JsonDocument {
        target: &data.target,
        scope: &data.scope,
        version: &data.version,
        date: data.started.map(|d| d.to_rfc3339()),
        vulnerabilities: categories(data, FindingKind::Vulnerability),
        anomalies: categories(data, FindingKind::Anomaly),
    };
    serde_json::to_string_pretty(&doc).map_err(|e| ScanError::Parse(e.to_string()))
}

impl ReportSink for JsonReport {
    fn data(&self) -> &ReportData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut ReportData {
        &mut self.data
    }

    fn flush(&self, destination: &Path) -> Result<(), ScanError> {
        fs::write(destination, render(&self.data)?)?;
        Ok(())
    }
}
