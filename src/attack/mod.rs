//! Attack modules: the contract every probe implements plus the built-in
//! module set.

pub mod backup;
pub mod delay;
pub mod htaccess;
pub mod permanentxss;
pub mod sql;
pub mod xss;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::Mutex;

use crate::catalog::Catalog;
use crate::correlator::XssCorrelator;
use crate::error::ScanError;
use crate::http::Transport;
use crate::models::Resource;
use crate::report::ReportSink;

/// Static description of a module: registered once, flags mutated only by
/// directives.
#[derive(Debug, Clone)]
pub struct ModuleMeta {
    pub name: &'static str,
    /// Lower runs first.
    pub priority: i32,
    /// Names of modules that must have executed before this one runs.
    pub require: &'static [&'static str],
    /// Part of the `common` bulk-selection group.
    pub common: bool,
    pub do_get: bool,
    pub do_post: bool,
}

impl ModuleMeta {
    pub fn enabled(&self) -> bool {
        self.do_get || self.do_post
    }
}

/// Typed state a module exposes to its dependents. The orchestrator moves
/// these across module boundaries; modules never reach into each other.
#[derive(Clone)]
pub enum SharedState {
    XssMarkers(Arc<Mutex<XssCorrelator>>),
}

/// Everything a module needs while attacking.
pub struct AttackContext<'a> {
    pub transport: &'a dyn Transport,
    pub sink: &'a mut dyn ReportSink,
    pub interrupt: &'a AtomicBool,
}

/// Per-module memory of attacked target signatures. One pattern, one probe.
#[derive(Default)]
pub struct PatternMemory {
    seen: HashSet<String>,
}

impl PatternMemory {
    /// True the first time `pattern` is seen.
    pub fn first_time(&mut self, pattern: String) -> bool {
        self.seen.insert(pattern)
    }
}

#[async_trait]
pub trait AttackModule: Send {
    fn meta(&self) -> &ModuleMeta;
    fn meta_mut(&mut self) -> &mut ModuleMeta;

    /// Register this module's report categories. A missing category is a
    /// fatal configuration error.
    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError>;

    /// State offered to dependent modules, if any.
    fn shared_state(&self) -> Option<SharedState> {
        None
    }

    /// Receive the state of a dependency named in `require`.
    fn load_dependency(&mut self, _name: &str, _state: SharedState) {}

    async fn attack_get(
        &mut self,
        _resource: &Resource,
        _ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        Ok(())
    }

    async fn attack_post(
        &mut self,
        _resource: &Resource,
        _ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        Ok(())
    }

    /// Walk the resource set, honoring the GET/POST flags and the interrupt.
    /// Recoverable errors end work on one resource, never the module.
    async fn attack(
        &mut self,
        resources: &[Resource],
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        for resource in resources {
            if ctx.interrupt.load(Ordering::Relaxed) {
                break;
            }
            let result = if resource.method == "GET" && self.meta().do_get {
                self.attack_get(resource, ctx).await
            } else if resource.method == "POST" && self.meta().do_post {
                self.attack_post(resource, ctx).await
            } else {
                Ok(())
            };
            if let Err(e) = result {
                if e.is_recoverable() {
                    warn!("{}: skipping {}: {}", self.meta().name, resource.url, e);
                } else {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
