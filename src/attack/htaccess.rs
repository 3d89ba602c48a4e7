//! Access-control bypass. Resources the crawl saw answering 401/402/403 are
//! retried with a method the access rules never list; a normal answer means
//! the restriction only covers the usual verbs.

use async_trait::async_trait;

use crate::attack::{AttackContext, AttackModule, ModuleMeta, PatternMemory};
use crate::catalog::{self, Catalog};
use crate::error::ScanError;
use crate::models::{Resource, Severity};
use crate::report::ReportSink;

const BOGUS_METHOD: &str = "ABC";

pub struct HtaccessModule {
    meta: ModuleMeta,
    attacked: PatternMemory,
}

impl HtaccessModule {
    pub fn new() -> Self {
        HtaccessModule {
            meta: ModuleMeta {
                name: "htaccess",
                priority: 5,
                require: &[],
                common: false,
                do_get: false,
                do_post: false,
            },
            attacked: PatternMemory::default(),
        }
    }
}

impl Default for HtaccessModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttackModule for HtaccessModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_vulnerability(catalog.get(catalog::HTACCESS_BYPASS)?);
        Ok(())
    }

    async fn attack_get(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        if !matches!(resource.status, 401 | 402 | 403) {
            return Ok(());
        }
        if !self.attacked.first_time(resource.page()) {
            return Ok(());
        }
        let probe = resource.with_method(BOGUS_METHOD);
        let response = match ctx.transport.send(&probe).await {
            Ok(r) => r,
            Err(e) if e.is_recoverable() => return Ok(()),
            Err(e) => return Err(e),
        };
        if (200..300).contains(&response.status) {
            ctx.sink.log_vulnerability(
                catalog::HTACCESS_BYPASS,
                Severity::High,
                &probe,
                "",
                &format!(
                    "access restriction ({}) bypassed with method {}",
                    resource.status, BOGUS_METHOD
                ),
            );
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

    /// 403 for the usual verbs, 200 for anything unexpected.
    struct LazyHtaccess {
        methods_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for LazyHtaccess {
        async fn send(&self, request: &Resource) -> Result<HttpResponse, ScanError> {
            self.methods_seen.lock().unwrap().push(request.method.clone());
            let status = if request.method == "GET" || request.method == "POST" {
                403
            } else {
                200
            };
            Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: String::new(),
                elapsed: Duration::from_millis(1),
            })
        }
    }

    fn forbidden(url: &str) -> Resource {
        let mut r = Resource::get(Url::parse(url).unwrap(), None);
        r.status = 403;
        r
    }

    #[tokio::test]
    async fn bogus_method_answering_200_is_a_bypass() {
        let transport = LazyHtaccess {
            methods_seen: Mutex::new(Vec::new()),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = HtaccessModule::new();
        module
            .attack_get(&forbidden("http://a/private/"), &mut ctx)
            .await
            .unwrap();

        assert_eq!(*transport.methods_seen.lock().unwrap(), vec!["ABC"]);
        let findings = sink.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].category, catalog::HTACCESS_BYPASS);
    }

    #[tokio::test]
    async fn open_resources_are_left_alone() {
        let transport = LazyHtaccess {
            methods_seen: Mutex::new(Vec::new()),
        };
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        let mut module = HtaccessModule::new();
        let mut open = Resource::get(Url::parse("http://a/public/").unwrap(), None);
        open.status = 200;
        module.attack_get(&open, &mut ctx).await.unwrap();
        assert!(transport.methods_seen.lock().unwrap().is_empty());
        assert!(sink.findings().is_empty());
    }
}
