//! Reporting sink abstraction
//!
//! The sink is the boundary to the remote reporting service. Everything the
//! agent emits goes through the [`ReportingSink`] trait; transport, retries
//! and authentication are the implementation's concern. All calls are
//! fire-and-forget from the agent's perspective: errors are logged by the
//! caller, never propagated to the test host.

use crate::error::Result;
use crate::model::{CaseId, LogLevel, RunId, TestCaseData, TestStatus};
use crate::tcm::TcmType;
use chrono::{DateTime, Utc};

/// Run-level metadata forwarded when a run starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    pub build: Option<String>,
    pub environment: Option<String>,
    pub milestone_id: Option<u64>,
    pub milestone_name: Option<String>,
}

/// Boundary contract to the remote reporting service.
pub trait ReportingSink: Send + Sync {
    /// Starts a test run, returning its remote id.
    fn start_run(
        &self,
        name: &str,
        start_time: DateTime<Utc>,
        metadata: &RunMetadata,
    ) -> Result<RunId>;

    /// Finishes a previously started run.
    fn finish_run(&self, run_id: RunId, end_time: DateTime<Utc>) -> Result<()>;

    /// Starts a test case within a run, returning its remote id.
    fn start_case(
        &self,
        run_id: RunId,
        case: &TestCaseData,
        start_time: DateTime<Utc>,
    ) -> Result<CaseId>;

    /// Finishes a test case with its final status and an optional reason.
    fn finish_case(
        &self,
        run_id: RunId,
        case_id: CaseId,
        status: TestStatus,
        end_time: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<()>;

    /// Updates mutable case metadata (maintainer, class name).
    fn update_case(&self, run_id: RunId, case_id: CaseId, case: &TestCaseData) -> Result<()>;

    /// Forwards a batch of captured log lines attributed to a case.
    fn send_logs(
        &self,
        run_id: RunId,
        case_id: CaseId,
        level: LogLevel,
        timestamp_millis: i64,
        lines: &[String],
    ) -> Result<()>;

    /// Attaches a screenshot to a case.
    fn send_screenshot(&self, run_id: RunId, case_id: CaseId, bytes: &[u8]) -> Result<()>;

    /// Attaches an arbitrary artifact to a case.
    fn send_case_artifact(
        &self,
        run_id: RunId,
        case_id: CaseId,
        name: &str,
        bytes: &[u8],
    ) -> Result<()>;

    /// Creates or updates a TCM result for an externally-managed test case.
    fn upsert_tcm_result(
        &self,
        run_id: RunId,
        case_id: CaseId,
        tcm_type: TcmType,
        external_id: &str,
        status: &str,
    ) -> Result<()>;

    /// Attaches key/value labels to the run.
    fn attach_run_labels(&self, run_id: RunId, labels: &[(String, String)]) -> Result<()>;

    /// Attaches key/value labels to a case.
    fn attach_case_labels(
        &self,
        run_id: RunId,
        case_id: CaseId,
        labels: &[(String, String)],
    ) -> Result<()>;
}

/// Sink that accepts everything and reports nowhere.
///
/// Useful as a stand-in while wiring up a host integration before a real
/// transport exists.
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportingSink for NullSink {
    fn start_run(
        &self,
        _name: &str,
        _start_time: DateTime<Utc>,
        _metadata: &RunMetadata,
    ) -> Result<RunId> {
        Ok(RunId(0))
    }

    fn finish_run(&self, _run_id: RunId, _end_time: DateTime<Utc>) -> Result<()> {
        Ok(())
    }

    fn start_case(
        &self,
        _run_id: RunId,
        _case: &TestCaseData,
        _start_time: DateTime<Utc>,
    ) -> Result<CaseId> {
        Ok(CaseId(0))
    }

    fn finish_case(
        &self,
        _run_id: RunId,
        _case_id: CaseId,
        _status: TestStatus,
        _end_time: DateTime<Utc>,
        _reason: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }

    fn update_case(&self, _run_id: RunId, _case_id: CaseId, _case: &TestCaseData) -> Result<()> {
        Ok(())
    }

    fn send_logs(
        &self,
        _run_id: RunId,
        _case_id: CaseId,
        _level: LogLevel,
        _timestamp_millis: i64,
        _lines: &[String],
    ) -> Result<()> {
        Ok(())
    }

    fn send_screenshot(&self, _run_id: RunId, _case_id: CaseId, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn send_case_artifact(
        &self,
        _run_id: RunId,
        _case_id: CaseId,
        _name: &str,
        _bytes: &[u8],
    ) -> Result<()> {
        Ok(())
    }

    fn upsert_tcm_result(
        &self,
        _run_id: RunId,
        _case_id: CaseId,
        _tcm_type: TcmType,
        _external_id: &str,
        _status: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn attach_run_labels(&self, _run_id: RunId, _labels: &[(String, String)]) -> Result<()> {
        Ok(())
    }

    fn attach_case_labels(
        &self,
        _run_id: RunId,
        _case_id: CaseId,
        _labels: &[(String, String)],
    ) -> Result<()> {
        Ok(())
    }
}

/// Recording sink double shared by the unit tests.
#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// One observed sink call, with enough payload for assertions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkCall {
        StartRun {
            name: String,
        },
        FinishRun {
            run_id: RunId,
        },
        StartCase {
            run_id: RunId,
            name: String,
            class_name: String,
        },
        FinishCase {
            run_id: RunId,
            case_id: CaseId,
            status: TestStatus,
            reason: Option<String>,
        },
        UpdateCase {
            case_id: CaseId,
            maintainer: String,
        },
        SendLogs {
            case_id: CaseId,
            level: LogLevel,
            lines: Vec<String>,
        },
        SendScreenshot {
            case_id: CaseId,
            bytes: Vec<u8>,
        },
        SendCaseArtifact {
            case_id: CaseId,
            name: String,
        },
        UpsertTcmResult {
            case_id: CaseId,
            tcm_type: TcmType,
            external_id: String,
            status: String,
        },
        AttachRunLabels {
            labels: Vec<(String, String)>,
        },
        AttachCaseLabels {
            case_id: CaseId,
            labels: Vec<(String, String)>,
        },
    }

    /// Sink that records every call and assigns sequential ids.
    #[derive(Debug)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<SinkCall>>,
        next_run_id: AtomicU64,
        next_case_id: AtomicU64,
        fail_everything: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            RecordingSink {
                calls: Mutex::new(Vec::new()),
                next_run_id: AtomicU64::new(100),
                next_case_id: AtomicU64::new(501),
                fail_everything: false,
            }
        }

        /// A sink whose every operation fails, for unreachable-sink tests.
        pub fn unreachable() -> Self {
            RecordingSink {
                fail_everything: true,
                ..Self::new()
            }
        }

        pub fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: SinkCall) -> Result<()> {
            if self.fail_everything {
                return Err(Error::Sink("unreachable".to_string()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl ReportingSink for RecordingSink {
        fn start_run(
            &self,
            name: &str,
            _start_time: DateTime<Utc>,
            _metadata: &RunMetadata,
        ) -> Result<RunId> {
            self.record(SinkCall::StartRun {
                name: name.to_string(),
            })?;
            Ok(RunId(self.next_run_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn finish_run(&self, run_id: RunId, _end_time: DateTime<Utc>) -> Result<()> {
            self.record(SinkCall::FinishRun { run_id })
        }

        fn start_case(
            &self,
            run_id: RunId,
            case: &TestCaseData,
            _start_time: DateTime<Utc>,
        ) -> Result<CaseId> {
            self.record(SinkCall::StartCase {
                run_id,
                name: case.name.clone(),
                class_name: case.class_name.clone(),
            })?;
            Ok(CaseId(self.next_case_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn finish_case(
            &self,
            run_id: RunId,
            case_id: CaseId,
            status: TestStatus,
            _end_time: DateTime<Utc>,
            reason: Option<&str>,
        ) -> Result<()> {
            self.record(SinkCall::FinishCase {
                run_id,
                case_id,
                status,
                reason: reason.map(str::to_string),
            })
        }

        fn update_case(&self, _run_id: RunId, case_id: CaseId, case: &TestCaseData) -> Result<()> {
            self.record(SinkCall::UpdateCase {
                case_id,
                maintainer: case.maintainer.clone(),
            })
        }

        fn send_logs(
            &self,
            _run_id: RunId,
            case_id: CaseId,
            level: LogLevel,
            _timestamp_millis: i64,
            lines: &[String],
        ) -> Result<()> {
            self.record(SinkCall::SendLogs {
                case_id,
                level,
                lines: lines.to_vec(),
            })
        }

        fn send_screenshot(&self, _run_id: RunId, case_id: CaseId, bytes: &[u8]) -> Result<()> {
            self.record(SinkCall::SendScreenshot {
                case_id,
                bytes: bytes.to_vec(),
            })
        }

        fn send_case_artifact(
            &self,
            _run_id: RunId,
            case_id: CaseId,
            name: &str,
            _bytes: &[u8],
        ) -> Result<()> {
            self.record(SinkCall::SendCaseArtifact {
                case_id,
                name: name.to_string(),
            })
        }

        fn upsert_tcm_result(
            &self,
            _run_id: RunId,
            case_id: CaseId,
            tcm_type: TcmType,
            external_id: &str,
            status: &str,
        ) -> Result<()> {
            self.record(SinkCall::UpsertTcmResult {
                case_id,
                tcm_type,
                external_id: external_id.to_string(),
                status: status.to_string(),
            })
        }

        fn attach_run_labels(&self, _run_id: RunId, labels: &[(String, String)]) -> Result<()> {
            self.record(SinkCall::AttachRunLabels {
                labels: labels.to_vec(),
            })
        }

        fn attach_case_labels(
            &self,
            _run_id: RunId,
            case_id: CaseId,
            labels: &[(String, String)],
        ) -> Result<()> {
            self.record(SinkCall::AttachCaseLabels {
                case_id,
                labels: labels.to_vec(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sink_accepts_everything() {
        let sink = NullSink;
        let run_id = sink
            .start_run("Test Run", Utc::now(), &RunMetadata::default())
            .unwrap();
        let case_id = sink
            .start_case(run_id, &TestCaseData::new("testA", "Suite", "testA"), Utc::now())
            .unwrap();
        sink.send_logs(run_id, case_id, LogLevel::Info, 0, &["line".to_string()])
            .unwrap();
        sink.finish_case(run_id, case_id, TestStatus::Passed, Utc::now(), None)
            .unwrap();
        sink.finish_run(run_id, Utc::now()).unwrap();
    }
}
