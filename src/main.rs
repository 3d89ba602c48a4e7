use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use comfy_table::Table;
use log::warn;

use webhound::catalog::Catalog;
use webhound::cli::{Args, ReportFormat};
use webhound::crawler::Crawler;
use webhound::db::CrawlStore;
use webhound::extract::LinkExtractor;
use webhound::http::HttpClient;
use webhound::models::FindingKind;
use webhound::orchestrator::Orchestrator;
use webhound::report::{JsonReport, ReportSink, TextReport};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    println!(
        "{} {}",
        "webhound".bold().cyan(),
        env!("CARGO_PKG_VERSION")
    );
    println!("target: {}\n", args.base_url.as_str().bold());

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing up");
                flag.store(true, Ordering::Relaxed);
            }
        });
    }

    let transport = HttpClient::new(Duration::from_secs(args.timeout))
        .context("building HTTP client")?;

    let extractor = LinkExtractor::new(
        &args.base_url,
        args.exclusions(),
        args.async_suffix.clone(),
    );
    let mut crawler = Crawler::new(
        args.base_url.clone(),
        args.scope,
        args.depth,
        extractor,
        interrupt.clone(),
    );
    for url in &args.start_urls {
        crawler.seed(url.clone());
    }

    let store = CrawlStore::open(&args.store)
        .await
        .context("opening crawl store")?;
    if args.resume {
        crawler
            .resume_from(&store)
            .await
            .context("resuming previous crawl")?;
    }
    let resources = crawler
        .run(&transport, Some(&store))
        .await
        .context("crawling target")?;

    let catalog = Catalog::builtin();
    let mut sink: Box<dyn ReportSink> = match args.format {
        ReportFormat::Txt => Box::<TextReport>::default(),
        ReportFormat::Json => Box::<JsonReport>::default(),
    };
    sink.set_target(args.base_url.as_str(), &args.scope.to_string());

    let mut orchestrator = Orchestrator::default_registry();
    if let Some(directive) = &args.modules {
        orchestrator.apply_directives(directive);
    }
    orchestrator
        .run(&resources, &transport, sink.as_mut(), &interrupt, &catalog)
        .await
        .context("running attack modules")?;

    print_summary(sink.as_ref());

    let output = args.output_path();
    sink.flush(&output)
        .with_context(|| format!("writing report to {}", output.display()))?;
    println!(
        "\n{} report written to {}",
        "done:".green().bold(),
        output.display()
    );
    Ok(())
}

fn print_summary(sink: &dyn ReportSink) {
    let mut per_category: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for finding in sink.findings() {
        let entry = per_category.entry(finding.category.as_str()).or_default();
        match finding.kind {
            FindingKind::Vulnerability => entry.0 += 1,
            FindingKind::Anomaly => entry.1 += 1,
        }
    }

    let mut table = Table::new();
    table.set_header(["Category", "Vulnerabilities", "Anomalies"]);
    for (category, (vulns, anomalies)) in &per_category {
        table.add_row([category.to_string(), vulns.to_string(), anomalies.to_string()]);
    }
    println!("\n{table}");
}
