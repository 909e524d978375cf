//! Core data types shared across the agent

use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote identifier assigned to a test run by the reporting sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote identifier assigned to a test case execution by the reporting sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseId(pub u64);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final status of a test case as reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// Test passed successfully.
    Passed,
    /// Test failed with an assertion or unexpected error.
    Failed,
    /// Test was skipped or disabled.
    Skipped,
    /// Test execution was aborted before producing an outcome.
    Aborted,
}

impl TestStatus {
    /// Wire value understood by the reporting sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity attached to a batch of forwarded log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Wire value understood by the reporting sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Controls which standard streams are intercepted.
///
/// `Default` captures only standard error (enough for host-harness logging);
/// `Debug` additionally redirects standard output so ad-hoc prints from the
/// tests themselves are captured too. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchMode {
    #[default]
    #[serde(rename = "DEFAULT", alias = "default")]
    Default,
    #[serde(rename = "DEBUG", alias = "debug")]
    Debug,
}

/// Descriptive metadata for one test case execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCaseData {
    /// Display name of the test case, unique within the run.
    pub name: String,
    /// Name of the suite (class) the case belongs to.
    pub class_name: String,
    /// Name of the test method.
    pub method_name: String,
    /// Person responsible for the test.
    pub maintainer: String,
}

impl TestCaseData {
    /// Creates case metadata with the default "anonymous" maintainer.
    pub fn new(
        name: impl Into<String>,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
    ) -> Self {
        TestCaseData {
            name: name.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
            maintainer: "anonymous".to_string(),
        }
    }

    /// Sets the maintainer, replacing the "anonymous" default.
    pub fn with_maintainer(mut self, maintainer: impl Into<String>) -> Self {
        self.maintainer = maintainer.into();
        self
    }
}
