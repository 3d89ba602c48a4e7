use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::crawler::Scope;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Txt,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "webhound",
    version,
    about = "Web application vulnerability scanner"
)]
pub struct Args {
    /// Base URL of the target
    pub base_url: Url,

    /// Additional start URLs, crawled from depth 0
    #[arg(short = 's', long = "start")]
    pub start_urls: Vec<Url>,

    /// URL substrings excluded from the crawl (besides the built-in "logout")
    #[arg(short = 'x', long = "exclude")]
    pub exclude: Vec<String>,

    /// Maximum crawl depth
    #[arg(short = 'd', long, default_value_t = 40)]
    pub depth: usize,

    /// Crawl scope: page, folder, domain or url
    #[arg(short = 'b', long, default_value = "folder")]
    pub scope: Scope,

    /// Attack module directive, e.g. "-all,+sql" or "common,+backup"
    #[arg(short = 'm', long = "module", allow_hyphen_values = true)]
    pub modules: Option<String>,

    /// Report format
    #[arg(short = 'f', long, value_enum, default_value_t = ReportFormat::Txt)]
    pub format: ReportFormat,

    /// Report output path (defaults per format)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(short = 't', long, default_value_t = 6)]
    pub timeout: u64,

    /// Resume the crawl recorded in the store
    #[arg(long)]
    pub resume: bool,

    /// Crawl store path
    #[arg(long, default_value = "crawl.db")]
    pub store: PathBuf,

    /// Dotted suffix of the site's async-request helper, for script links
    #[arg(long, default_value = ".asyncRequest")]
    pub async_suffix: String,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            PathBuf::from(match self.format {
                ReportFormat::Txt => "webhound-report.txt",
                ReportFormat::Json => "webhound-report.json",
            })
        })
    }

    /// Built-in exclusions plus the user's.
    pub fn exclusions(&self) -> Vec<String> {
        let mut list = vec!["logout".to_string()];
        list.extend(self.exclude.iter().cloned());
        list
    }
}
