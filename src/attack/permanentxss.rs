//! Stored XSS sweep. Walks every crawled GET page with a fresh fetch and
//! looks for marker codes the reflected-XSS module planted earlier. A
//! confirmed payload showing up on an independent page is a stored XSS; a
//! bare marker found far from its origin is attacked in place.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::Mutex;

use crate::attack::{AttackContext, AttackModule, ModuleMeta, PatternMemory, SharedState};
use crate::catalog::{self, Catalog};
use crate::correlator::{payload_present, MarkerEntry, MarkerState, XssCorrelator};
use crate::error::ScanError;
use crate::models::{Resource, Severity};
use crate::report::ReportSink;

pub struct PermanentXssModule {
    meta: ModuleMeta,
    markers: Option<Arc<Mutex<XssCorrelator>>>,
    anomalies: PatternMemory,
}

impl PermanentXssModule {
    pub fn new() -> Self {
        PermanentXssModule {
            meta: ModuleMeta {
                name: "permanentxss",
                priority: 6,
                require: &["xss"],
                common: true,
                do_get: true,
                do_post: false,
            },
            markers: None,
            anomalies: PatternMemory::default(),
        }
    }

    fn report_stored(
        &self,
        ctx: &mut AttackContext<'_>,
        entry: &MarkerEntry,
        page_url: &str,
    ) {
        ctx.sink.log_vulnerability(
            catalog::XSS,
            Severity::High,
            &entry.origin,
            &entry.parameter,
            &format!(
                "stored XSS: payload injected via parameter '{}' at {} appears on {}",
                entry.parameter, entry.origin.url, page_url
            ),
        );
    }

    /// The marker text of a still-unconfirmed code turned up on `page`.
    /// Re-inject templates at the origin and watch this page for them.
    async fn attack_in_place(
        &mut self,
        markers: &Arc<Mutex<XssCorrelator>>,
        code: &str,
        entry: &MarkerEntry,
        page: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let templates = markers.lock().await.templates().to_vec();
        for template in templates {
            if ctx.interrupt.load(Ordering::Relaxed) {
                return Ok(());
            }
            let payload = XssCorrelator::instantiate(&template, code);
            let armed = entry.origin.replacing_value(code, &payload);
            match ctx.transport.send(&armed).await {
                Ok(_) => {}
                Err(ScanError::Timeout { .. }) => {
                    let pattern = format!("{} {}", armed.page(), entry.parameter);
                    if self.anomalies.first_time(pattern) {
                        ctx.sink.log_anomaly(
                            catalog::RESOURCE_CONSUMPTION,
                            Severity::Medium,
                            &armed,
                            &entry.parameter,
                            "timeout while testing for stored XSS",
                        );
                    }
                    continue;
                }
                Err(e) => return Err(e),
            }
            let refreshed = match ctx.transport.send(page).await {
                Ok(r) => r,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            if payload_present(&refreshed.body, &payload) {
                let confirmed = {
                    let mut table = markers.lock().await;
                    table.confirm_reflected(code, payload.clone());
                    table.confirm_stored(code)
                };
                if confirmed {
                    self.report_stored(ctx, entry, page.url.as_str());
                }
                return Ok(());
            }
        }
        Ok(())
    }
}

impl Default for PermanentXssModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttackModule for PermanentXssModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_vulnerability(catalog.get(catalog::XSS)?);
        sink.declare_anomaly(catalog.get(catalog::RESOURCE_CONSUMPTION)?);
        Ok(())
    }

    fn load_dependency(&mut self, name: &str, state: SharedState) {
        if name == "xss" {
            let SharedState::XssMarkers(markers) = state;
            self.markers = Some(markers);
        }
    }

    async fn attack(
        &mut self,
        resources: &[Resource],
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let Some(markers) = self.markers.clone() else {
            warn!("permanentxss: marker table missing, nothing to do");
            return Ok(());
        };
        for resource in resources {
            if ctx.interrupt.load(Ordering::Relaxed) {
                break;
            }
            if resource.method != "GET" || !self.meta.do_get {
                continue;
            }
            // fresh fetch: stored content may have landed after the crawl
            let page = Resource::get(resource.url.clone(), resource.referer.clone());
            let response = match ctx.transport.send(&page).await {
                Ok(r) => r,
                Err(e) if e.is_recoverable() => {
                    warn!("permanentxss: skipping {}: {}", page.url, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let hits = markers.lock().await.codes_in(&response.body);
            for code in hits {
                let Some(entry) = markers.lock().await.get(&code).cloned() else {
                    continue;
                };
                match &entry.state {
                    MarkerState::ConfirmedReflected(payload) => {
                        if payload_present(&response.body, payload)
                            && markers.lock().await.confirm_stored(&code)
                        {
                            self.report_stored(ctx, &entry, page.url.as_str());
                        }
                    }
                    MarkerState::Probed => {
                        if let Err(e) = self
                            .attack_in_place(&markers, &code, &entry, &page, ctx)
                            .await
                        {
                            if e.is_recoverable() {
                                warn!("permanentxss: {}", e);
                            } else {
                                return Err(e);
                            }
                        }
                    }
                    MarkerState::ConfirmedStored => {}
                }
            }
        }
        Ok(())
    }
}
