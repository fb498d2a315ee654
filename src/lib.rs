//! # resty
//!
//! A Markdown/YAML driven REST API test runner. Tests are fenced `yaml` code
//! blocks embedded in an otherwise free-form Markdown document: one block
//! declares shared config (variables, includes, mocks), another declares a
//! single HTTP request with its expectations.
//!
//! ## Overview
//!
//! resty:
//!
//! - **Parses** `.resty`/`.rest` files into config and test blocks ([`block`])
//! - **Resolves variables** across four layers — environment, included,
//!   file, captured ([`vars`])
//! - **Resolves dependencies** between tests via `requires`, detecting
//!   cycles and producing a stable topological order ([`resolver`])
//! - **Executes** each request against the network or an inline/external
//!   mock, with retry and capture semantics ([`executor`])
//! - **Evaluates** status/header/value expectations and extracts JSONPath
//!   values ([`expect`], [`jsonpath`])
//! - **Orchestrates** a whole file end to end and aggregates results across
//!   every discovered file ([`orchestrator`], [`result`])
//! - **Reports** results as text, Markdown, JSON, JUnit XML, or HTML
//!   ([`report`])
//!
//! ## Architecture
//!
//! ### Parsing ([`block`])
//!
//! [`block::parse_file`] scans a Markdown file for fenced `yaml` blocks and
//! decodes each into a [`block::Block`] — either a [`block::ConfigBlock`] or
//! a [`block::TestBlock`].
//!
//! ### Configuration ([`config`])
//!
//! [`config::load_includes`] loads external variable files (`include:`),
//! following nested includes with cycle detection.
//!
//! ### Dependency resolution ([`resolver`])
//!
//! [`resolver::resolve_order`] validates `requires` references, computes the
//! transitive closure of a selection, detects cycles, and returns tests in
//! topological order.
//!
//! ### Execution ([`executor`])
//!
//! [`executor::Executor`] resolves variables, dispatches to a mock or the
//! network, validates the response, and captures extracted values — with
//! retry/backoff for transient failures.
//!
//! ### Orchestration ([`orchestrator`])
//!
//! [`orchestrator::Orchestrator`] drives [`orchestrator::run_file`] across
//! every discovered file and aggregates into a [`result::TestRunSummary`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use resty::discovery;
//! use resty::orchestrator::{Orchestrator, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let files = discovery::discover_files(&[std::path::PathBuf::from(".")], true);
//!
//!     let orchestrator = Orchestrator::new(RunOptions::default());
//!     let outcome = orchestrator.run(&files).await;
//!
//!     std::process::exit(outcome.exit_code());
//! }
//! ```
//!
//! [`Orchestrator`]: orchestrator::Orchestrator

pub mod block;
pub mod config;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod expect;
pub mod jsonpath;
pub mod mock;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod result;
pub mod vars;

pub use error::RestyError;
pub use orchestrator::{Orchestrator, RunOptions, RunOutcome};
pub use result::{TestResult, TestRunSummary, TestStatus};
