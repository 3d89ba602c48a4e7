//! Backup-file disclosure. For every crawled page the usual editor and
//! copy names are requested; a readable one exposes server-side source.

use async_trait::async_trait;

use crate::attack::{AttackContext, AttackModule, ModuleMeta, PatternMemory};
use crate::catalog::{self, Catalog};
use crate::error::ScanError;
use crate::models::{Resource, Severity};
use crate::report::ReportSink;

const FILE_NAME: &str = "[FILE_NAME]";

const PAYLOADS: &[&str] = &[
    "[FILE_NAME].bak",
    "[FILE_NAME].old",
    "[FILE_NAME].save",
    "[FILE_NAME]~",
    "[FILE_NAME].orig",
    ".[FILE_NAME].swp",
    "Copy of [FILE_NAME]",
    "[FILE_NAME].txt",
];

pub struct BackupModule {
    meta: ModuleMeta,
    attacked: PatternMemory,
}

impl BackupModule {
    pub fn new() -> Self {
        BackupModule {
            meta: ModuleMeta {
                name: "backup",
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

impl Default for BackupModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttackModule for BackupModule {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ModuleMeta {
        &mut self.meta
    }

    fn declare(&self, catalog: &Catalog, sink: &mut dyn ReportSink) -> Result<(), ScanError> {
        sink.declare_vulnerability(catalog.get(catalog::BACKUP_FILE)?);
        Ok(())
    }

    async fn attack_get(
        &mut self,
        resource: &Resource,
        ctx: &mut AttackContext<'_>,
    ) -> Result<(), ScanError> {
        let file = resource.file_name();
        if file.is_empty() {
            return Ok(());
        }
        let page = resource.page();
        if !self.attacked.first_time(page.clone()) {
            return Ok(());
        }

        for payload in PAYLOADS {
            let candidate = payload.replace(FILE_NAME, &file);
            let Ok(url) = resource.url.join(&candidate) else {
                continue;
            };
            let probe = Resource::get(url, resource.referer.clone());
            let response = match ctx.transport.send(&probe).await {
                Ok(r) => r,
                Err(e) if e.is_recoverable() => continue,
                Err(e) => return Err(e),
            };
            if (200..300).contains(&response.status) {
                ctx.sink.log_vulnerability(
                    catalog::BACKUP_FILE,
                    Severity::Medium,
                    &probe,
                    "",
                    &format!("backup copy of {} readable at {}", page, probe.url),
                );
            }
        }
        Ok(())
    }
}
