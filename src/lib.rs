//! testreporter - a streaming test-reporting agent
//!
//! testreporter observes a running test suite through a fixed set of
//! lifecycle callbacks and streams structured results, captured console
//! output and artifacts to a remote reporting service.
//!
//! # Overview
//!
//! The agent intercepts the process's standard streams at the descriptor
//! level while tests execute, buffers the captured text, and flushes it to
//! the reporting sink either periodically or immediately when a notable
//! event (failure, screenshot, manual capture) occurs, always in causal
//! order, so a case's remote timeline never shows a failure ahead of the
//! log lines that led to it. Remote run/case identifiers are tracked in an
//! in-memory context, and TCM (test-case-management) result statuses can be
//! deferred until a case's true outcome is known.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`observer`]: The seven host lifecycle callbacks and the
//!   [`observer::ReportingAgent`] facade driving everything
//! - [`capture`]: Descriptor-level console interception with echo
//!   pass-through
//! - [`coordinator`]: Flush timing, forced flushes and failure attribution
//! - [`context`]: Run/case identity registry
//! - [`registry`]: Deferred TCM result tracking
//! - [`tcm`]: TestRail, Xray and Zephyr integration surfaces
//! - [`sink`]: The reporting-sink boundary trait
//! - [`config`]: Environment and properties-file configuration
//! - [`error`]: Error types and Result alias
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use testreporter::config::ReportingConfig;
//! use testreporter::observer::{CaseOutcome, ReportingAgent, TestLifecycleObserver};
//! use testreporter::sink::NullSink;
//!
//! # fn main() -> testreporter::error::Result<()> {
//! let config = ReportingConfig::from_env()?;
//! let mut agent = ReportingAgent::new(config, Arc::new(NullSink));
//!
//! // The host integration layer adapts its test runner's callbacks:
//! agent.run_will_start("Nightly UI suite");
//! agent.suite_will_start("SmokeTests", &["testLogin".to_string()]);
//! agent.case_will_start("testLogin");
//! agent.case_did_finish("testLogin", CaseOutcome::Passed);
//! agent.suite_did_finish("SmokeTests");
//! agent.run_did_finish();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod observer;
pub mod registry;
pub mod sink;
pub mod tcm;

pub use error::{Error, Result};
pub use model::{CaseId, LaunchMode, LogLevel, RunId, TestCaseData, TestStatus};
pub use observer::{CaseOutcome, ReportingAgent, TestLifecycleObserver};
