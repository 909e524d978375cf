//! Run/case identity registry
//!
//! [`RunContext`] is the single source of truth for which run and case are
//! active and for the remote identifiers the reporting sink assigned to them.
//! It is owned by the observer facade and shared (behind a mutex) with the
//! flush coordinator, never accessed through any ambient global.

use crate::model::{CaseId, RunId};
use std::collections::HashMap;

/// Process-wide registry mapping locally-running tests to their
/// remotely-assigned identifiers.
///
/// The case name→id table persists for the whole run so identifiers remain
/// resolvable after a case finishes (late status updates); only the "current
/// case" pointer is cleared per-case. At most one run is active at a time.
#[derive(Debug, Default)]
pub struct RunContext {
    run_id: Option<RunId>,
    current_case_id: Option<CaseId>,
    executed_cases: HashMap<String, CaseId>,
}

impl RunContext {
    /// Creates an empty context with no active run.
    pub fn new() -> Self {
        RunContext::default()
    }

    /// Records the remote id of the run that just started.
    pub fn set_run_id(&mut self, run_id: RunId) {
        self.run_id = Some(run_id);
    }

    /// Remote id of the active run, if any.
    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Clears the active run at run finish.
    pub fn clear_run(&mut self) {
        self.run_id = None;
    }

    /// Inserts a case into the persistent name→id table and marks it as the
    /// current case.
    pub fn register_case(&mut self, name: impl Into<String>, case_id: CaseId) {
        self.executed_cases.insert(name.into(), case_id);
        self.current_case_id = Some(case_id);
    }

    /// Remote id of the currently executing case, if one is active.
    pub fn current_case_id(&self) -> Option<CaseId> {
        self.current_case_id
    }

    /// Name of the currently executing case, resolved by reverse lookup on
    /// the persistent table.
    pub fn current_case_name(&self) -> Option<&str> {
        let id = self.current_case_id?;
        self.executed_cases
            .iter()
            .find(|(_, case_id)| **case_id == id)
            .map(|(name, _)| name.as_str())
    }

    /// Remote id for a case by name, whether or not it is still current.
    pub fn case_id(&self, name: &str) -> Option<CaseId> {
        self.executed_cases.get(name).copied()
    }

    /// Unsets the "current case" pointer; the table entry remains.
    pub fn clear_current_case(&mut self) {
        self.current_case_id = None;
    }

    /// True once any case has been registered in this run. Used to gate
    /// "must configure before any test starts" preconditions.
    pub fn has_any_cases(&self) -> bool {
        !self.executed_cases.is_empty()
    }
}
