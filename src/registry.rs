//! Deferred TCM result tracking
//!
//! [`TestCaseRegistry`] defers and aggregates TCM result-status decisions
//! until a case's true outcome is known, while avoiding duplicate external
//! case associations. Operations that cannot resolve a current case are
//! silent no-ops: TCM calls may run opportunistically from helper code that
//! cannot always guarantee execution context.

use crate::context::RunContext;
use crate::model::{CaseId, TestStatus};
use crate::sink::ReportingSink;
use crate::tcm::TcmType;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Sentinel meaning "awaiting the test's own pass/fail/skip outcome".
const PENDING_STATUS: &str = "";

/// Tracks external test-case associations and their pending result statuses.
///
/// Associations are keyed by the remote case id so late lookups work after
/// the case's "current" pointer is cleared, and are purged once the case's
/// outcome is resolved so memory stays bounded across a long run.
#[derive(Debug, Default)]
pub struct TestCaseRegistry {
    associations: HashMap<CaseId, BTreeMap<(TcmType, String), String>>,
}

impl TestCaseRegistry {
    pub fn new() -> Self {
        TestCaseRegistry::default()
    }

    /// Associates external TCM case ids with the currently running test.
    ///
    /// Each id not yet associated with this (case, TCM system) pair gets a
    /// label attached on the sink and an entry recorded with the pending
    /// sentinel. Repeated calls with overlapping id sets are idempotent.
    pub fn attach_external_cases(
        &mut self,
        context: &RunContext,
        sink: &dyn ReportingSink,
        tcm_type: TcmType,
        external_ids: &[String],
    ) {
        let (run_id, case_id) = match (context.run_id(), context.current_case_id()) {
            (Some(run_id), Some(case_id)) => (run_id, case_id),
            _ => {
                debug!("TCM association outside of a running test case, skipping");
                return;
            }
        };

        let entries = self.associations.entry(case_id).or_default();
        for external_id in external_ids {
            let key = (tcm_type, external_id.clone());
            if entries.contains_key(&key) {
                continue;
            }
            let labels = vec![(tcm_type.label_key().to_string(), external_id.clone())];
            if let Err(e) = sink.attach_case_labels(run_id, case_id, &labels) {
                warn!("Failed to attach TCM label for {}: {}", external_id, e);
            }
            entries.insert(key, PENDING_STATUS.to_string());
        }
    }

    /// Records an explicit, authoritative status for one external case and
    /// emits the upsert immediately. The deferred-resolution step will not
    /// overwrite it.
    pub fn set_explicit_status(
        &mut self,
        context: &RunContext,
        sink: &dyn ReportingSink,
        tcm_type: TcmType,
        external_id: &str,
        status: &str,
    ) {
        let (run_id, case_id) = match (context.run_id(), context.current_case_id()) {
            (Some(run_id), Some(case_id)) => (run_id, case_id),
            _ => {
                debug!("TCM status set outside of a running test case, skipping");
                return;
            }
        };

        self.associations
            .entry(case_id)
            .or_default()
            .insert((tcm_type, external_id.to_string()), status.to_string());

        if let Err(e) = sink.upsert_tcm_result(run_id, case_id, tcm_type, external_id, status) {
            warn!("Failed to upsert TCM result for {}: {}", external_id, e);
        }
    }

    /// Resolves every association still holding the pending sentinel to the
    /// case's final outcome, then purges all associations for the case.
    ///
    /// Called once per case at finish time, before the current-case pointer
    /// is cleared.
    pub fn resolve_deferred_statuses(
        &mut self,
        context: &RunContext,
        sink: &dyn ReportingSink,
        final_outcome: TestStatus,
    ) {
        let (run_id, case_id) = match (context.run_id(), context.current_case_id()) {
            (Some(run_id), Some(case_id)) => (run_id, case_id),
            _ => {
                debug!("TCM resolution outside of a running test case, skipping");
                return;
            }
        };

        let Some(entries) = self.associations.remove(&case_id) else {
            return;
        };
        for ((tcm_type, external_id), status) in entries {
            if status != PENDING_STATUS {
                continue;
            }
            if let Err(e) = sink.upsert_tcm_result(
                run_id,
                case_id,
                tcm_type,
                &external_id,
                final_outcome.as_str(),
            ) {
                warn!("Failed to upsert deferred TCM result for {}: {}", external_id, e);
            }
        }
    }

    /// Number of associations currently tracked for a case.
    pub fn association_count(&self, case_id: CaseId) -> usize {
        self.associations.get(&case_id).map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunId;
    use crate::sink::recording::{RecordingSink, SinkCall};

    fn active_context() -> RunContext {
        let mut context = RunContext::new();
        context.set_run_id(RunId(100));
        context.register_case("testA", CaseId(501));
        context
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_attach_is_idempotent_under_overlapping_sets() {
        let context = active_context();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(&context, &sink, TcmType::TestRail, &ids(&["C1", "C2"]));
        registry.attach_external_cases(&context, &sink, TcmType::TestRail, &ids(&["C2", "C3"]));

        let label_calls: Vec<_> = sink
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::AttachCaseLabels { .. }))
            .collect();
        // One attachment per distinct (case, tcmType, externalId) triple.
        assert_eq!(label_calls.len(), 3);
        assert_eq!(registry.association_count(CaseId(501)), 3);
    }

    #[test]
    fn test_same_id_different_tcm_types_are_distinct() {
        let context = active_context();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(&context, &sink, TcmType::TestRail, &ids(&["C1"]));
        registry.attach_external_cases(&context, &sink, TcmType::Xray, &ids(&["C1"]));

        assert_eq!(registry.association_count(CaseId(501)), 2);
    }

    #[test]
    fn test_explicit_status_emits_immediately() {
        let context = active_context();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.set_explicit_status(&context, &sink, TcmType::TestRail, "C100", "passed");

        assert_eq!(
            sink.calls(),
            vec![SinkCall::UpsertTcmResult {
                case_id: CaseId(501),
                tcm_type: TcmType::TestRail,
                external_id: "C100".to_string(),
                status: "passed".to_string(),
            }]
        );
    }

    #[test]
    fn test_deferred_resolution_skips_explicit_statuses() {
        let context = active_context();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(
            &context,
            &sink,
            TcmType::TestRail,
            &ids(&["C100", "C200"]),
        );
        registry.set_explicit_status(&context, &sink, TcmType::TestRail, "C100", "passed");

        let before = sink.calls().len();
        registry.resolve_deferred_statuses(&context, &sink, TestStatus::Failed);

        let upserts: Vec<_> = sink.calls()[before..]
            .iter()
            .cloned()
            .filter(|c| matches!(c, SinkCall::UpsertTcmResult { .. }))
            .collect();
        // Only the still-pending C200 gets the final outcome; C100 was
        // already resolved explicitly.
        assert_eq!(
            upserts,
            vec![SinkCall::UpsertTcmResult {
                case_id: CaseId(501),
                tcm_type: TcmType::TestRail,
                external_id: "C200".to_string(),
                status: "FAILED".to_string(),
            }]
        );
        assert_eq!(registry.association_count(CaseId(501)), 0);
    }

    #[test]
    fn test_resolution_purges_all_associations() {
        let context = active_context();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(&context, &sink, TcmType::Zephyr, &ids(&["Z-1", "Z-2"]));
        registry.resolve_deferred_statuses(&context, &sink, TestStatus::Passed);

        assert_eq!(registry.association_count(CaseId(501)), 0);

        // A second resolution has nothing left to emit.
        let before = sink.calls().len();
        registry.resolve_deferred_statuses(&context, &sink, TestStatus::Passed);
        assert_eq!(sink.calls().len(), before);
    }

    #[test]
    fn test_no_context_is_a_silent_noop() {
        let context = RunContext::new();
        let sink = RecordingSink::new();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(&context, &sink, TcmType::TestRail, &ids(&["C1"]));
        registry.set_explicit_status(&context, &sink, TcmType::TestRail, "C1", "passed");
        registry.resolve_deferred_statuses(&context, &sink, TestStatus::Passed);

        assert!(sink.calls().is_empty());
    }

    #[test]
    fn test_sink_failure_does_not_poison_registry() {
        let context = active_context();
        let sink = RecordingSink::unreachable();
        let mut registry = TestCaseRegistry::new();

        registry.attach_external_cases(&context, &sink, TcmType::TestRail, &ids(&["C1"]));
        // The association is still recorded even though the label attachment
        // failed; delivery is best-effort.
        assert_eq!(registry.association_count(CaseId(501)), 1);
    }
}
