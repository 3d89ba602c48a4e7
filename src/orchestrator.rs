//! Module scheduling: directive parsing, priority ordering and dependency
//! gating. No probe error escapes this layer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::attack::{
    backup::BackupModule, delay::DelayModule, htaccess::HtaccessModule,
    permanentxss::PermanentXssModule, sql::SqlModule, xss::XssModule, AttackContext, AttackModule,
};
use crate::catalog::Catalog;
use crate::error::ScanError;
use crate::http::Transport;
use crate::models::Resource;
use crate::report::ReportSink;

pub struct Orchestrator {
    modules: Vec<Box<dyn AttackModule>>,
}

impl Orchestrator {
    pub fn with_modules(modules: Vec<Box<dyn AttackModule>>) -> Self {
        Orchestrator { modules }
    }

    /// The built-in module set with its default activation flags.
    pub fn default_registry() -> Self {
        Self::with_modules(vec![
            Box::new(SqlModule::new()),
            Box::new(XssModule::new()),
            Box::new(PermanentXssModule::new()),
            Box::new(BackupModule::new()),
            Box::new(HtaccessModule::new()),
            Box::new(DelayModule::new()),
        ])
    }

    /// (name, do_get, do_post) per registered module, registry order.
    pub fn module_flags(&self) -> Vec<(&'static str, bool, bool)> {
        self.modules
            .iter()
            .map(|m| {
                let meta = m.meta();
                (meta.name, meta.do_get, meta.do_post)
            })
            .collect()
    }

    /// Apply a comma-separated directive string: `[+|-]name[:get|:post]`,
    /// with `common` as the bulk keyword. Giving any directive first clears
    /// every flag, so the string fully describes the active set. Unresolved
    /// names warn and are skipped.
    pub fn apply_directives(&mut self, directive: &str) {
        for module in self.modules.iter_mut() {
            let meta = module.meta_mut();
            meta.do_get = false;
            meta.do_post = false;
        }

        for token in directive.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (enable, rest) = match token.strip_prefix('+') {
                Some(r) => (true, r),
                None => match token.strip_prefix('-') {
                    Some(r) => (false, r),
                    None => (true, token),
                },
            };
            let (name, method) = match rest.split_once(':') {
                Some((n, m)) => (n, Some(m)),
                None => (rest, None),
            };
            if !matches!(method, None | Some("get") | Some("post")) {
                warn!("ignoring directive '{}': unknown method suffix", token);
                continue;
            }

            match name {
                "all" if enable => {
                    warn!("'+all' is refused, use 'common' to enable the common set");
                }
                // '-all' stands down the common set only
                "all" => self.set_group(|meta| meta.common, false, method),
                "common" => self.set_group(|meta| meta.common, enable, method),
                _ => {
                    let mut found = false;
                    for module in self.modules.iter_mut() {
                        let meta = module.meta_mut();
                        if meta.name == name {
                            set_flags(meta, enable, method);
                            found = true;
                        }
                    }
                    if !found {
                        warn!("unknown module '{}' in directive, skipping", name);
                    }
                }
            }
        }
    }

    fn set_group(
        &mut self,
        select: impl Fn(&crate::attack::ModuleMeta) -> bool,
        enable: bool,
        method: Option<&str>,
    ) {
        for module in self.modules.iter_mut() {
            let meta = module.meta_mut();
            if select(meta) {
                set_flags(meta, enable, method);
            }
        }
    }

    /// Run every enabled module against the resource set, lowest priority
    /// first. A module whose `require` set has not fully executed is skipped
    /// with a diagnostic; dependency state crosses module boundaries only
    /// here.
    pub async fn run(
        &mut self,
        resources: &[Resource],
        transport: &dyn Transport,
        sink: &mut dyn ReportSink,
        interrupt: &AtomicBool,
        catalog: &Catalog,
    ) -> Result<(), ScanError> {
        for module in self.modules.iter().filter(|m| m.meta().enabled()) {
            module.declare(catalog, sink)?;
        }

        let mut order: Vec<usize> = (0..self.modules.len()).collect();
        order.sort_by_key(|&i| self.modules[i].meta().priority);

        let mut executed: HashSet<&'static str> = HashSet::new();
        for index in order {
            if interrupt.load(Ordering::Relaxed) {
                warn!("attack phase interrupted, keeping findings so far");
                break;
            }
            let meta = self.modules[index].meta().clone();
            if !meta.enabled() {
                continue;
            }
            let missing: Vec<&str> = meta
                .require
                .iter()
                .copied()
                .filter(|r| !executed.contains(r))
                .collect();
            if !missing.is_empty() {
                warn!(
                    "skipping module '{}': unmet dependencies {}",
                    meta.name,
                    missing.join(", ")
                );
                continue;
            }

            let mut states = Vec::new();
            for req in meta.require {
                if let Some(dep) = self.modules.iter().find(|m| m.meta().name == *req) {
                    if let Some(state) = dep.shared_state() {
                        states.push((*req, state));
                    }
                }
            }
            let module = &mut self.modules[index];
            for (name, state) in states {
                module.load_dependency(name, state);
            }

            info!("running module '{}'", meta.name);
            let mut ctx = AttackContext {
                transport,
                sink: &mut *sink,
                interrupt,
            };
            if let Err(e) = module.attack(resources, &mut ctx).await {
                warn!("module '{}' aborted: {}", meta.name, e);
            }
            executed.insert(meta.name);
        }
        Ok(())
    }
}

fn set_flags(meta: &mut crate::attack::ModuleMeta, enable: bool, method: Option<&str>) {
    match method {
        None => {
            meta.do_get = enable;
            meta.do_post = enable;
        }
        Some("get") => meta.do_get = enable,
        Some("post") => meta.do_post = enable,
        Some(_) => {}
    }
}
