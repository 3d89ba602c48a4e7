//! webhound: web application vulnerability scanner.
//!
//! The pipeline: the crawler walks the target and captures attackable
//! resources, the orchestrator runs the enabled attack modules over them
//! (priority-ordered, dependency-gated), and findings land in a report
//! sink that renders text or JSON.

pub mod attack;
pub mod catalog;
pub mod cli;
pub mod correlator;
pub mod crawler;
pub mod db;
pub mod error;
pub mod extract;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod script;

pub use error::ScanError;
