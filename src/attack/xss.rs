//! Reflected XSS. Every probe starts with a harmless random marker code; a
//! reflected marker is escalated through the payload template list. All
//! codes are registered with the correlator so the stored-XSS sweep can pick
//! them up later, whether or not they reflected here.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::attack::{AttackContext, AttackModule, ModuleMeta, PatternMemory, SharedState};
use crate::catalog::{self, Catalog};
use crate::correlator::{generate_code, payload_present, XssCorrelator};
use crate::error::ScanError;
use crate::models::{ParamList, Resource, Severity};
use crate::report::ReportSink;

pub struct XssModule {
    meta: ModuleMeta,
    markers: Arc<Mutex<XssCorrelator>>,
    attacked: PatternMemory,
    anomalies: PatternMemory,
}

impl XssModule {
    pub fn new() -> Self {
        XssModule {
            meta: ModuleMeta {
                name: "xss",
                priority: 5,
                require: &[],
                common: true,
                do_get: true,
                do_post: true,
            },
            markers: Arc::new(Mutex::new(XssCorrelator::default())),
            attacked: PatternMemory::default(),
            anomalies: PatternMemory::default(),
        }
    }

    fn mutate(resource: &Resource, list: ParamList, index: usize, value: &str) -> Resource {
        match list {
            ParamList::Get => resource.with_get_value(index, value),
            ParamList::Post => resource.with_post_value(index, value),
            ParamList::File => resource.with_file_value(index, value),
        }
    }

    fn parameter_name(resource: &Resource, list: ParamList, index: usize) -> Option<String> {
        match list {
            ParamList::Get => resource.get_params.get(index).map(|p| p.0.clone()),
            ParamList::Post => resource.post_params.get(index).map(|p| p.0.clone()),
            ParamList::File => resource.file_params.get(index).map(|p| p.0.clone()),
        }
    }

    async fn probe(
        &mut self,
        resource: &Resource,
        list: ParamList,
        index: usize,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let pattern = resource.attack_pattern(list, index, "__XSS__");
        if !self.attacked.first_time(pattern.clone()) {
            return Ok(());
        }
        let Some(parameter) = Self::parameter_name(resource, list, index) else {
            return Ok(());
        };

        let code = generate_code();
        let evil = Self::mutate(resource, list, index, &code);
        self.markers
            .lock()
            .await
            .register(code.clone(), evil.clone(), parameter.clone());

        let response = match ctx.transport.send(&evil).await {
            Ok(r) => r,
            Err(ScanError::Timeout { .. }) => {
                if self.anomalies.first_time(pattern) {
                    ctx.sink.log_anomaly(
                        catalog::RESOURCE_CONSUMPTION,
                        Severity::Medium,
                        &evil,
                        &parameter,
                        "timeout while testing for XSS",
                    );
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !response.body.contains(&code) {
            // not reflected here; the code stays registered for the
            // stored-XSS sweep
            return Ok(());
        }

        let templates = self.markers.lock().await.templates().to_vec();
        for template in templates {
            if ctx.interrupt.load(Ordering::Relaxed) {
                return Ok(());
            }
            let payload = XssCorrelator::instantiate(&template, &code);
            let armed = Self::mutate(resource, list, index, &payload);
            let response = match ctx.transport.send(&armed).await {
                Ok(r) => r,
                Err(ScanError::Timeout { .. }) => {
                    if self.anomalies.first_time(pattern.clone()) {
                        ctx.sink.log_anomaly(
                            catalog::RESOURCE_CONSUMPTION,
                            Severity::Medium,
                            &armed,
                            &parameter,
                            "timeout while testing for XSS",
                        );
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            if payload_present(&response.body, &payload) {
                ctx.sink.log_vulnerability(
                    catalog::XSS,
                    Severity::High,
                    &armed,
                    &parameter,
                    &format!("XSS via parameter '{}'", parameter),
                );
                self.markers.lock().await.confirm_reflected(&code, payload);
                return Ok(());
            }
            if response.status == 500 {
                ctx.sink.log_anomaly(
                    catalog::INTERNAL_ERROR,
                    Severity::Medium,
                    &armed,
                    &parameter,
                    "server error while testing for XSS",
                );
            }
        }
        self.markers.lock().await.exhaust(&code);
        Ok(())
    }
}

impl Default for XssModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttackModule for XssModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_vulnerability(catalog.get(catalog::XSS)?);
        sink.declare_anomaly(catalog.get(catalog::INTERNAL_ERROR)?);
        sink.declare_anomaly(catalog.get(catalog::RESOURCE_CONSUMPTION)?);
        Ok(())
    }

    fn shared_state(&self) -> Option<SharedState> {
        Some(SharedState::XssMarkers(self.markers.clone()))
    }

    async fn attack_get(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        for index in 0..resource.get_params.len() {
            self.probe(resource, ParamList::Get, index, ctx).await?;
        }
        Ok(())
    }

    async fn attack_post(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        for index in 0..resource.post_params.len() {
            self.probe(resource, ParamList::Post, index, ctx).await?;
        }
        for index in 0..resource.file_params.len() {
            self.probe(resource, ParamList::File, index, ctx).await?;
        }
        Ok(())
    }
}
