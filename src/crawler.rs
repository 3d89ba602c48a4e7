//! Breadth-first crawl of the target: FIFO frontier with depth tracking,
//! a visited set, scope filtering and incremental persistence.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use url::Url;

use crate::db::{resource_signature, CrawlStore};
use crate::error::ScanError;
use crate::extract::LinkExtractor;
use crate::http::Transport;
use crate::models::Resource;

/// How far from the base URL the crawl may wander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the base page itself.
    Page,
    /// The base URL's folder and below.
    Folder,
    /// Anything on the same registrable domain.
    Domain,
    /// URLs prefixed by the base URL.
    Url,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Scope::Page => "page",
            Scope::Folder => "folder",
            Scope::Domain => "domain",
            Scope::Url => "url",
        })
    }
}

impl std::str::FromStr for Scope {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "page" => Ok(Scope::Page),
            "folder" => Ok(Scope::Folder),
            "domain" => Ok(Scope::Domain),
            "url" => Ok(Scope::Url),
            other => Err(ScanError::Config(format!("unknown scope '{}'", other))),
        }
    }
}

struct FrontierEntry {
    url: Url,
    depth: usize,
    referer: Option<String>,
}

pub struct Crawler {
    root: Url,
    scope: Scope,
    max_depth: usize,
    extractor: LinkExtractor,
    pending: VecDeque<FrontierEntry>,
    /// URLs fetched (or being fetched). Disjoint from `pending` at all
    /// times: an entry moves here the moment it is popped, and only URLs in
    /// neither set are ever enqueued.
    visited: HashSet<String>,
    /// visited ∪ pending, used for the enqueue check.
    known: HashSet<String>,
    resources: Vec<Resource>,
    seen_signatures: HashSet<String>,
    interrupt: Arc<AtomicBool>,
}

impl Crawler {
    pub fn new(
        root: Url,
        scope: Scope,
        max_depth: usize,
        extractor: LinkExtractor,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        let mut crawler = Crawler {
            root: root.clone(),
            scope,
            max_depth,
            extractor,
            pending: VecDeque::new(),
            visited: HashSet::new(),
            known: HashSet::new(),
            resources: Vec::new(),
            seen_signatures: HashSet::new(),
            interrupt,
        };
        crawler.enqueue(root, 0, None);
        crawler
    }

    /// Additional start URLs, crawled from depth 0.
    pub fn seed(&mut self, url: Url) {
        self.enqueue(url, 0, None);
    }

    fn folder_prefix(&self) -> String {
        let text = {
            let mut u = self.root.clone();
            u.set_query(None);
            u.set_fragment(None);
            u.to_string()
        };
        match text.rfind('/') {
            Some(i) => text[..=i].to_string(),
            None => text,
        }
    }

    fn allowed(&self, url: &Url) -> bool {
        if !self.extractor.in_scope(url) {
            return false;
        }
        match self.scope {
            Scope::Domain => true,
            Scope::Url => url.as_str().starts_with(self.root.as_str()),
            Scope::Folder => url.as_str().starts_with(&self.folder_prefix()),
            Scope::Page => {
                let mut page = url.clone();
                page.set_query(None);
                let mut base = self.root.clone();
                base.set_query(None);
                page == base
            }
        }
    }

    fn enqueue(&mut self, url: Url, depth: usize, referer: Option<String>) {
        if depth > self.max_depth || !self.allowed(&url) {
            return;
        }
        if self.known.insert(url.to_string()) {
            self.pending.push_back(FrontierEntry {
                url,
                depth,
                referer,
            });
        }
    }

    fn record_resource(&mut self, resource: Resource) -> bool {
        if self.seen_signatures.insert(resource_signature(&resource)) {
            self.resources.push(resource);
            true
        } else {
            false
        }
    }

    /// Reload a previous crawl so already-visited pages are skipped and
    /// known resources survive. Stored targets that were discovered but
    /// never fetched are re-enqueued.
    pub async fn resume_from(&mut self, store: &CrawlStore) -> Result<(), ScanError> {
        for url in store.visited().await? {
            self.visited.insert(url.clone());
            self.known.insert(url);
        }
        for resource in store.resources().await? {
            if resource.method == "GET" && !self.visited.contains(resource.url.as_str()) {
                self.enqueue(resource.url.clone(), 0, resource.referer.clone());
            }
            self.record_resource(resource);
        }
        self.pending
            .retain(|e| !self.visited.contains(e.url.as_str()));
        info!(
            "resumed: {} visited, {} resources",
            self.visited.len(),
            self.resources.len()
        );
        Ok(())
    }

    /// Drive the crawl to frontier exhaustion (or interrupt) and return the
    /// captured resources. Fetch failures are logged and dropped.
    pub async fn run(
        &mut self,
        transport: &dyn Transport,
        store: Option<&CrawlStore>,
    ) -> Result<Vec<Resource>, ScanError> {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {pos} pages  {wide_msg}") {
            bar.set_style(style);
        }

        while let Some(entry) = self.pending.pop_front() {
            if self.interrupt.load(Ordering::Relaxed) {
                warn!("crawl interrupted, keeping partial results");
                break;
            }
            self.visited.insert(entry.url.to_string());
            bar.set_message(entry.url.to_string());
            bar.inc(1);

            let mut resource = Resource::get(entry.url.clone(), entry.referer.clone());
            let response = match transport.send(&resource).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("dropping {}: {}", entry.url, e);
                    continue;
                }
            };
            resource.status = response.status;
            resource.headers = response.headers.clone();
            resource.body = response.body.clone();
            resource.elapsed = response.elapsed;

            let fresh = self.record_resource(resource);
            if let Some(store) = store {
                store.mark_visited(entry.url.as_str()).await?;
                if fresh {
                    if let Some(r) = self.resources.last() {
                        store.save_resource(r).await?;
                    }
                }
            }

            if !response.is_html() || entry.depth >= self.max_depth {
                continue;
            }
            let extracted = self.extractor.extract(&entry.url, &response.body);
            let referer = Some(entry.url.to_string());
            for link in extracted.links {
                self.enqueue(link, entry.depth + 1, referer.clone());
            }
            for form in extracted.forms {
                if form.method == "GET" {
                    self.enqueue(form.url.clone(), entry.depth + 1, referer.clone());
                } else if self.allowed(&form.url) {
                    let fresh = self.record_resource(form);
                    if fresh {
                        if let (Some(store), Some(r)) = (store, self.resources.last()) {
                            store.save_resource(r).await?;
                        }
                    }
                }
            }
        }

        bar.finish_and_clear();
        info!(
            "crawl finished: {} pages visited, {} resources",
            self.visited.len(),
            self.resources.len()
        );
        Ok(self.resources.clone())
    }
}
