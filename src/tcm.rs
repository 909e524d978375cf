//! Test-case-management integrations
//!
//! Public surfaces for associating running tests with externally-managed
//! test cases in TestRail, Xray or Zephyr. Per-case calls (`set_case_id`,
//! `set_case_status`) are valid only while a test is executing and no-op
//! silently otherwise; run-level configuration must happen before the first
//! test starts and is rejected with a console hint afterwards.

use crate::observer::ReportingAgent;
use std::fmt;
use tracing::warn;

/// Status system names accepted by the individual TCM systems.
pub mod status {
    /// TestRail system status names (not their display labels). Custom
    /// statuses need the system name from the TestRail administrator.
    pub mod testrail {
        pub const PASSED: &str = "passed";
        pub const BLOCKED: &str = "blocked";
        pub const RETEST: &str = "retest";
        pub const FAILED: &str = "failed";
    }

    /// Xray status names, which differ between cloud and server deployments.
    pub mod xray {
        pub mod cloud {
            pub const PASSED: &str = "PASSED";
            pub const EXECUTING: &str = "EXECUTING";
            pub const NOT_EXECUTED: &str = "NOT_EXECUTED";
            pub const FAILED: &str = "FAILED";
        }

        pub mod server {
            pub const PASS: &str = "PASS";
            pub const FAIL: &str = "FAIL";
        }
    }

    /// Zephyr status names for the Scale and Squad flavors.
    pub mod zephyr {
        pub mod scale_cloud {
            pub const IN_PROGRESS: &str = "IN PROGRESS";
            pub const PASS: &str = "PASS";
            pub const FAIL: &str = "FAIL";
            pub const NOT_EXECUTED: &str = "NOT EXECUTED";
            pub const BLOCKED: &str = "BLOCKED";
        }

        pub mod squad_cloud {
            pub const UNEXECUTED: &str = "UNEXECUTED";
            pub const PASS: &str = "PASS";
            pub const FAIL: &str = "FAIL";
            pub const WIP: &str = "WIP";
            pub const BLOCKED: &str = "BLOCKED";
        }
    }
}

/// External test-case-management system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TcmType {
    TestRail,
    Xray,
    Zephyr,
}

impl TcmType {
    /// Wire value understood by the reporting sink.
    pub fn as_str(&self) -> &'static str {
        match self {
            TcmType::TestRail => "TEST_RAIL",
            TcmType::Xray => "XRAY",
            TcmType::Zephyr => "ZEPHYR",
        }
    }

    /// Label key under which external case ids are attached to a test case.
    pub fn label_key(&self) -> &'static str {
        match self {
            TcmType::TestRail => "com.testreporter/tcm.testrail.case-id",
            TcmType::Xray => "com.testreporter/tcm.xray.test-key",
            TcmType::Zephyr => "com.testreporter/tcm.zephyr.test-case-key",
        }
    }
}

impl fmt::Display for TcmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Attaches a run-level configuration label, refusing once tests have begun.
fn attach_run_config_label(agent: &mut ReportingAgent, system: &str, key: &str, value: &str) {
    if agent.has_started_cases() {
        warn!(
            "The {} configuration must be provided before start of tests. \
             Hint: move the configuration to the code block which is executed before all tests",
            system
        );
        return;
    }
    agent.attach_run_labels(&[(key.to_string(), value.to_string())]);
}

/// TestRail integration surface.
pub struct TestRail<'a> {
    agent: &'a mut ReportingAgent,
}

impl<'a> TestRail<'a> {
    const SYNC_ENABLED_KEY: &'static str = "com.testreporter/tcm.testrail.sync.enabled";
    const SYNC_REAL_TIME_KEY: &'static str = "com.testreporter/tcm.testrail.sync.real-time";
    const INCLUDE_ALL_KEY: &'static str = "com.testreporter/tcm.testrail.include-all-cases";
    const SUITE_ID_KEY: &'static str = "com.testreporter/tcm.testrail.suite-id";
    const RUN_ID_KEY: &'static str = "com.testreporter/tcm.testrail.run-id";
    const RUN_NAME_KEY: &'static str = "com.testreporter/tcm.testrail.run-name";
    const MILESTONE_KEY: &'static str = "com.testreporter/tcm.testrail.milestone";
    const ASSIGNEE_KEY: &'static str = "com.testreporter/tcm.testrail.assignee";

    pub fn new(agent: &'a mut ReportingAgent) -> Self {
        TestRail { agent }
    }

    /// Mandatory. Sets the TestRail suite id for the current run; must be
    /// invoked before all tests.
    pub fn set_suite_id(&mut self, suite_id: &str) {
        attach_run_config_label(self.agent, "TestRail", Self::SUITE_ID_KEY, suite_id);
    }

    /// Mandatory. Associates a TestRail case with the currently running test.
    pub fn set_case_id(&mut self, case_id: &str) {
        self.agent
            .attach_test_cases(TcmType::TestRail, &[case_id.to_string()]);
    }

    /// Sets an explicit status for a TestRail case in the run. Use the
    /// status *system name*, not its label; see [`status::testrail`].
    pub fn set_case_status(&mut self, case_id: &str, result_status: &str) {
        self.agent
            .set_test_case_status(TcmType::TestRail, case_id, result_status);
    }

    /// Optional. Disables result upload; must be invoked before all tests.
    pub fn disable_sync(&mut self) {
        attach_run_config_label(self.agent, "TestRail", Self::SYNC_ENABLED_KEY, "false");
    }

    /// Optional. Includes all cases from the suite into the newly created
    /// TestRail run; must be invoked before all tests.
    pub fn include_all_cases_in_new_run(&mut self) {
        attach_run_config_label(self.agent, "TestRail", Self::INCLUDE_ALL_KEY, "true");
    }

    /// Optional. Enables real-time result upload. Implies
    /// [`Self::include_all_cases_in_new_run`]; must be invoked before all
    /// tests.
    pub fn enable_real_time_sync(&mut self) {
        attach_run_config_label(self.agent, "TestRail", Self::SYNC_REAL_TIME_KEY, "true");
        attach_run_config_label(self.agent, "TestRail", Self::INCLUDE_ALL_KEY, "true");
    }

    /// Optional. Adds results into an existing TestRail run instead of a new
    /// one; must be invoked before all tests.
    pub fn set_run_id(&mut self, run_id: &str) {
        attach_run_config_label(self.agent, "TestRail", Self::RUN_ID_KEY, run_id);
    }

    /// Optional. Custom name for the new TestRail run; must be invoked
    /// before all tests.
    pub fn set_run_name(&mut self, run_name: &str) {
        attach_run_config_label(self.agent, "TestRail", Self::RUN_NAME_KEY, run_name);
    }

    /// Optional. TestRail milestone for the results; must be invoked before
    /// all tests.
    pub fn set_milestone(&mut self, milestone: &str) {
        attach_run_config_label(self.agent, "TestRail", Self::MILESTONE_KEY, milestone);
    }

    /// Optional. TestRail run assignee; must be invoked before all tests.
    pub fn set_assignee(&mut self, assignee: &str) {
        attach_run_config_label(self.agent, "TestRail", Self::ASSIGNEE_KEY, assignee);
    }
}

/// Xray integration surface.
pub struct Xray<'a> {
    agent: &'a mut ReportingAgent,
}

impl<'a> Xray<'a> {
    const SYNC_ENABLED_KEY: &'static str = "com.testreporter/tcm.xray.sync.enabled";
    const SYNC_REAL_TIME_KEY: &'static str = "com.testreporter/tcm.xray.sync.real-time";
    const EXECUTION_KEY: &'static str = "com.testreporter/tcm.xray.test-execution-key";

    pub fn new(agent: &'a mut ReportingAgent) -> Self {
        Xray { agent }
    }

    /// Mandatory. Sets the Xray execution key; must be invoked before all
    /// tests.
    pub fn set_execution_key(&mut self, key: &str) {
        attach_run_config_label(self.agent, "Xray", Self::EXECUTION_KEY, key);
    }

    /// Mandatory. Associates an Xray test key with the currently running
    /// test.
    pub fn set_test_key(&mut self, test_key: &str) {
        self.agent
            .attach_test_cases(TcmType::Xray, &[test_key.to_string()]);
    }

    /// Sets an explicit status for a test in the Xray execution; see
    /// [`status::xray`].
    pub fn set_test_status(&mut self, test_key: &str, result_status: &str) {
        self.agent
            .set_test_case_status(TcmType::Xray, test_key, result_status);
    }

    /// Optional. Disables result upload; must be invoked before all tests.
    pub fn disable_sync(&mut self) {
        attach_run_config_label(self.agent, "Xray", Self::SYNC_ENABLED_KEY, "false");
    }

    /// Optional. Enables real-time result upload; must be invoked before all
    /// tests.
    pub fn enable_real_time_sync(&mut self) {
        attach_run_config_label(self.agent, "Xray", Self::SYNC_REAL_TIME_KEY, "true");
    }
}

/// Zephyr integration surface.
pub struct Zephyr<'a> {
    agent: &'a mut ReportingAgent,
}

impl<'a> Zephyr<'a> {
    const SYNC_ENABLED_KEY: &'static str = "com.testreporter/tcm.zephyr.sync.enabled";
    const SYNC_REAL_TIME_KEY: &'static str = "com.testreporter/tcm.zephyr.sync.real-time";
    const TEST_CYCLE_KEY: &'static str = "com.testreporter/tcm.zephyr.test-cycle-key";
    const JIRA_PROJECT_KEY: &'static str = "com.testreporter/tcm.zephyr.jira-project-key";

    pub fn new(agent: &'a mut ReportingAgent) -> Self {
        Zephyr { agent }
    }

    /// Mandatory. Sets the Zephyr test cycle key; must be invoked before all
    /// tests.
    pub fn set_test_cycle_key(&mut self, cycle_key: &str) {
        attach_run_config_label(self.agent, "Zephyr", Self::TEST_CYCLE_KEY, cycle_key);
    }

    /// Mandatory. Sets the Jira project key; must be invoked before all
    /// tests.
    pub fn set_jira_project_key(&mut self, jira_key: &str) {
        attach_run_config_label(self.agent, "Zephyr", Self::JIRA_PROJECT_KEY, jira_key);
    }

    /// Mandatory. Associates a Zephyr test case with the currently running
    /// test.
    pub fn set_test_case_key(&mut self, test_case_key: &str) {
        self.agent
            .attach_test_cases(TcmType::Zephyr, &[test_case_key.to_string()]);
    }

    /// Sets an explicit status for a Zephyr test case; see
    /// [`status::zephyr`].
    pub fn set_test_case_status(&mut self, test_case_key: &str, result_status: &str) {
        self.agent
            .set_test_case_status(TcmType::Zephyr, test_case_key, result_status);
    }

    /// Optional. Disables result upload; must be invoked before all tests.
    pub fn disable_sync(&mut self) {
        attach_run_config_label(self.agent, "Zephyr", Self::SYNC_ENABLED_KEY, "false");
    }

    /// Optional. Enables real-time result upload; must be invoked before all
    /// tests.
    pub fn enable_real_time_sync(&mut self) {
        attach_run_config_label(self.agent, "Zephyr", Self::SYNC_REAL_TIME_KEY, "true");
    }
}
