//! Directive language and orchestrator behavior through the public API.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use webhound::catalog::Catalog;
use webhound::error::ScanError;
use webhound::http::{HttpResponse, Transport};
use webhound::models::Resource;
use webhound::orchestrator::Orchestrator;
use webhound::report::{ReportSink, TextReport};

#[test]
fn minus_all_plus_sql_enables_exactly_sql() {
    let mut orchestrator = Orchestrator::default_registry();
    orchestrator.apply_directives("-all,+sql");
    let enabled: Vec<_> = orchestrator
        .module_flags()
        .into_iter()
        .filter(|(_, get, post)| *get || *post)
        .map(|(name, _, _)| name)
        .collect();
    assert_eq!(enabled, vec!["sql"]);
}

#[test]
fn defaults_enable_the_common_set() {
    let orchestrator = Orchestrator::default_registry();
    let enabled: Vec<_> = orchestrator
        .module_flags()
        .into_iter()
        .filter(|(_, get, post)| *get || *post)
        .map(|(name, _, _)| name)
        .collect();
    assert_eq!(enabled, vec!["sql", "xss", "permanentxss"]);
}

#[test]
fn directive_string_replaces_defaults_entirely() {
    let mut orchestrator = Orchestrator::default_registry();
    orchestrator.apply_directives("+backup");
    let enabled: Vec<_> = orchestrator
        .module_flags()
        .into_iter()
        .filter(|(_, get, post)| *get || *post)
        .map(|(name, _, _)| name)
        .collect();
    assert_eq!(enabled, vec!["backup"]);
}

/// Fails on one URL, answers every other with a MySQL error page.
struct OneBadApple {
    bad: String,
    hits: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for OneBadApple {
    async fn send(&self, request: &Resource) -> Result<HttpResponse, ScanError> {
        let url = request.url.to_string();
        self.hits.lock().unwrap().push(url.clone());
        if request.url.path() == self.bad {
            return Err(ScanError::Timeout { url });
        }
        Ok(HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: "You have an error in your SQL syntax".to_string(),
            elapsed: Duration::from_millis(1),
        })
    }
}

#[tokio::test]
async fn transport_failure_on_one_resource_does_not_stop_the_module() {
    let transport = OneBadApple {
        bad: "/broken.php".to_string(),
        hits: Mutex::new(Vec::new()),
    };
    let mut sink = TextReport::default();
    let interrupt = AtomicBool::new(false);
    let catalog = Catalog::builtin();
    let mut orchestrator = Orchestrator::default_registry();
    orchestrator.apply_directives("-all,+sql");

    let targets = vec![
        Resource::get(Url::parse("http://a/broken.php?id=1").unwrap(), None),
        Resource::get(Url::parse("http://a/ok.php?id=1").unwrap(), None),
    ];
    orchestrator
        .run(&targets, &transport, &mut sink, &interrupt, &catalog)
        .await
        .unwrap();

    // the healthy resource was still probed and produced a finding
    assert!(transport
        .hits
        .lock()
        .unwrap()
        .iter()
        .any(|u| u.contains("ok.php")));
    assert_eq!(
        sink.findings()
            .iter()
            .filter(|f| f.category == "SQL Injection")
            .count(),
        1
    );
}

#[tokio::test]
async fn interrupt_still_yields_partial_findings() {
    let transport = OneBadApple {
        bad: "/none".to_string(),
        hits: Mutex::new(Vec::new()),
    };
    let mut sink = TextReport::default();
    let interrupt = AtomicBool::new(false);
    let catalog = Catalog::builtin();
    let mut orchestrator = Orchestrator::default_registry();
    orchestrator.apply_directives("-all,+sql");

    let targets = vec![Resource::get(
        Url::parse("http://a/ok.php?id=1").unwrap(),
        None,
    )];
    orchestrator
        .run(&targets, &transport, &mut sink, &interrupt, &catalog)
        .await
        .unwrap();
    let collected = sink.findings().len();
    assert_eq!(collected, 1);

    // flag set: later modules do nothing, earlier findings stay available
    interrupt.store(true, std::sync::atomic::Ordering::Relaxed);
    orchestrator
        .run(&targets, &transport, &mut sink, &interrupt, &catalog)
        .await
        .unwrap();
    assert_eq!(sink.findings().len(), collected);
}
