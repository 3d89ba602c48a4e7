//! Response-time survey. Nothing is probed; the timings captured during the
//! crawl are ranked by download speed and the slowest pages reported, which
//! surfaces endpoints worth a closer look for resource exhaustion.

use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::attack::{AttackContext, AttackModule, ModuleMeta};
use crate::catalog::{self, Catalog};
use crate::error::ScanError;
use crate::models::{Resource, Severity};
use crate::report::ReportSink;

const TOP: usize = 10;

pub struct DelayModule {
    meta: ModuleMeta,
}

impl DelayModule {
    pub fn new() -> Self {
        DelayModule {
            meta: ModuleMeta {
                name: "delay",
                priority: 8,
                require: &[],
                common: false,
                do_get: false,
                do_post: false,
            },
        }
    }
}

impl Default for DelayModule {
    fn default() -> Self {
        Self::new()
    }
}

fn speed(resource: &Resource) -> f64 {
    (resource.body.len() as f64 + 1.0) / resource.elapsed.as_secs_f64()
}

#[async_trait]
impl AttackModule for DelayModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_anomaly(catalog.get(catalog::RESOURCE_CONSUMPTION)?);
        Ok(())
    }

    /// Rank the whole resource set at once, slowest first. Resources without
    /// a measured timing (resumed from the store) are left out.
    async fn attack(
        &mut self,
        resources: &[Resource],
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let mut measured: Vec<&Resource> =
            resources.iter().filter(|r| !r.elapsed.is_zero()).collect();
        measured.sort_by(|a, b| speed(a).total_cmp(&speed(b)));

        for resource in measured.into_iter().take(TOP) {
            if ctx.interrupt.load(Ordering::Relaxed) {
                break;
            }
            ctx.sink.log_anomaly(
                catalog::RESOURCE_CONSUMPTION,
                Severity::Low,
                resource,
                "",
                &format!(
                    "slow response: {} bytes in {:.2}s ({:.0} bytes/s)",
                    resource.body.len(),
                    resource.elapsed.as_secs_f64(),
                    speed(resource),
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
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use url::Url;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn send(&self, _r: &Resource) -> Result<HttpResponse, ScanError> {
            panic!("the survey must not touch the network");
        }
    }

    fn timed(url: &str, bytes: usize, millis: u64) -> Resource {
        let mut r = Resource::get(Url::parse(url).unwrap(), None);
        r.body = "x".repeat(bytes);
        r.elapsed = Duration::from_millis(millis);
        r
    }

    async fn survey(resources: &[Resource]) -> TextReport {
        let transport = NoTransport;
        let mut sink = TextReport::default();
        let interrupt = AtomicBool::new(false);
        let mut ctx = AttackContext {
            transport: &transport,
            sink: &mut sink,
            interrupt: &interrupt,
        };
        DelayModule::new().attack(resources, &mut ctx).await.unwrap();
        sink
    }

    #[tokio::test]
    async fn slowest_page_is_reported_first() {
        let resources = vec![
            timed("http://a/fast.php", 10_000, 10),
            timed("http://a/slow.php", 100, 2_000),
            timed("http://a/mid.php", 1_000, 100),
        ];
        let sink = survey(&resources).await;
        let findings = sink.findings();
        assert_eq!(findings.len(), 3);
        assert!(findings[0].url.contains("slow.php"));
        assert!(findings[2].url.contains("fast.php"));
        assert!(findings[0].info.contains("bytes/s"));
    }

    #[tokio::test]
    async fn report_is_capped_at_ten_entries() {
        let resources: Vec<Resource> = (0..15)
            .map(|i| timed(&format!("http://a/p{}.php", i), 100, 50 + i))
            .collect();
        let sink = survey(&resources).await;
        assert_eq!(sink.findings().len(), 10);
    }

    #[tokio::test]
    async fn resources_without_timing_are_ignored() {
        let resources = vec![Resource::get(
            Url::parse("http://a/restored.php").unwrap(),
            None,
        )];
        let sink = survey(&resources).await;
        assert!(sink.findings().is_empty());
    }
}
