//! Observer facade wiring host lifecycle callbacks to the reporting pipeline
//!
//! The host integration layer adapts whatever its test runner exposes into
//! calls against [`TestLifecycleObserver`]; [`ReportingAgent`] implements the
//! trait and drives the run context, TCM registry, stream capture and flush
//! coordinator. Nothing here ever propagates an error back across a callback:
//! a reporting malfunction must never block or fail the test run itself.

use crate::capture::StreamCapture;
use crate::config::ReportingConfig;
use crate::context::RunContext;
use crate::coordinator::{Interruption, LifecycleCoordinator};
use crate::model::{CaseId, LogLevel, RunId, TestCaseData, TestStatus};
use crate::registry::TestCaseRegistry;
use crate::sink::{ReportingSink, RunMetadata};
use crate::tcm::TcmType;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Run label key carrying the locale of the system under test.
const LOCALE_LABEL_KEY: &str = "com.testreporter/sut.locale";

/// Outcome of a test case as observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Failed,
    Skipped,
}

/// The seven host test-lifecycle hook points.
///
/// The host invokes each callback according to its own single-threaded test
/// execution order; implementations fail soft (no-op) when a callback is
/// observed without the context it needs.
pub trait TestLifecycleObserver {
    /// The run is about to start. `run_name` is the host's display name for
    /// the whole suite execution.
    fn run_will_start(&mut self, run_name: &str);

    /// A suite (test class) is about to start, together with the names of
    /// the cases it contains.
    fn suite_will_start(&mut self, suite_name: &str, case_names: &[String]);

    /// A case is about to start.
    fn case_will_start(&mut self, case_name: &str);

    /// The case recorded a failure. Fires zero or one time per case, before
    /// `case_did_finish`.
    fn case_recorded_failure(&mut self, case_name: &str, description: &str);

    /// The case finished with the given outcome.
    fn case_did_finish(&mut self, case_name: &str, outcome: CaseOutcome);

    /// The suite finished.
    fn suite_did_finish(&mut self, suite_name: &str);

    /// The run finished.
    fn run_did_finish(&mut self);
}

/// The externally-visible agent: owns the capture pipeline and the identity
/// registries, and forwards lifecycle events to the reporting sink.
///
/// Constructed once per process. At most one run may be active at a time.
pub struct ReportingAgent {
    config: ReportingConfig,
    sink: Arc<dyn ReportingSink>,
    context: Arc<Mutex<RunContext>>,
    registry: TestCaseRegistry,
    capture: StreamCapture,
    coordinator: Option<LifecycleCoordinator>,
    suites: HashMap<String, Vec<String>>,
    maintainers: HashMap<String, String>,
    finished_early: HashSet<String>,
    detached: bool,
}

impl ReportingAgent {
    pub fn new(config: ReportingConfig, sink: Arc<dyn ReportingSink>) -> Self {
        ReportingAgent {
            config,
            sink,
            context: Arc::new(Mutex::new(RunContext::new())),
            registry: TestCaseRegistry::new(),
            capture: StreamCapture::new(),
            coordinator: None,
            suites: HashMap::new(),
            maintainers: HashMap::new(),
            finished_early: HashSet::new(),
            detached: false,
        }
    }

    /// A capture or flush thread that panicked while holding the context
    /// lock must not take the host callbacks down with it.
    fn lock_context(&self) -> MutexGuard<'_, RunContext> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True when reporting is disabled and every callback is a no-op; the
    /// host integration may use this to deregister its adapter entirely.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// True once any case has started in this run. Run-level TCM
    /// configuration must happen before this flips.
    pub fn has_started_cases(&self) -> bool {
        self.lock_context().has_any_cases()
    }

    fn current_ids(&self) -> Option<(RunId, CaseId)> {
        let context = self.lock_context();
        Some((context.run_id()?, context.current_case_id()?))
    }

    /// Associates external TCM case ids with the currently running test.
    pub fn attach_test_cases(&mut self, tcm_type: TcmType, external_ids: &[String]) {
        if self.detached {
            return;
        }
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        self.registry
            .attach_external_cases(&context, self.sink.as_ref(), tcm_type, external_ids);
    }

    /// Sets an explicit TCM result status for the currently running test.
    pub fn set_test_case_status(&mut self, tcm_type: TcmType, external_id: &str, status: &str) {
        if self.detached {
            return;
        }
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        self.registry.set_explicit_status(
            &context,
            self.sink.as_ref(),
            tcm_type,
            external_id,
            status,
        );
    }

    /// Attaches key/value labels to the active run.
    pub fn attach_run_labels(&mut self, labels: &[(String, String)]) {
        if self.detached {
            return;
        }
        let run_id = self.lock_context().run_id();
        let Some(run_id) = run_id else {
            debug!("Run label attachment outside of an active run, skipping");
            return;
        };
        if let Err(e) = self.sink.attach_run_labels(run_id, labels) {
            warn!("Failed to attach run labels: {}", e);
        }
    }

    /// Attaches key/value labels to the currently running case.
    pub fn attach_case_labels(&mut self, labels: &[(String, String)]) {
        if self.detached {
            return;
        }
        let Some((run_id, case_id)) = self.current_ids() else {
            debug!("Case label attachment outside of a running test case, skipping");
            return;
        };
        if let Err(e) = self.sink.attach_case_labels(run_id, case_id, labels) {
            warn!("Failed to attach case labels: {}", e);
        }
    }

    /// Attaches a locale label to the active run.
    pub fn set_locale(&mut self, locale: &str) {
        self.attach_run_labels(&[(LOCALE_LABEL_KEY.to_string(), locale.to_string())]);
    }

    /// Records the maintainer for the currently running case; forwarded with
    /// the next maintainer update.
    pub fn set_current_maintainer(&mut self, maintainer: &str) {
        if self.detached {
            return;
        }
        let name = self
            .context
            .lock()
            .unwrap()
            .current_case_name()
            .map(str::to_string);
        match name {
            Some(name) => {
                self.maintainers.insert(name, maintainer.to_string());
            }
            None => debug!("Maintainer set outside of a running test case, skipping"),
        }
    }

    /// Forwards a screenshot; captured output buffered so far is flushed
    /// first so the remote timeline keeps its causal order.
    pub fn attach_screenshot(&mut self, png: Vec<u8>) {
        self.interrupt(Interruption::Screenshot(png));
    }

    /// Forwards an arbitrary artifact, flushing captured output first.
    pub fn attach_artifact(&mut self, name: &str, bytes: Vec<u8>) {
        self.interrupt(Interruption::Artifact {
            name: name.to_string(),
            bytes,
        });
    }

    /// Forces an out-of-band flush of captured console output.
    pub fn flush_captured_output(&mut self) {
        self.interrupt(Interruption::Manual);
    }

    /// Sends a deliberate log message at the given level, attributed to the
    /// currently running case. Captured output buffered so far is flushed
    /// first so the message lands after the lines it followed in real time.
    pub fn send_log(&mut self, level: LogLevel, message: &str) {
        self.interrupt(Interruption::Log {
            level,
            message: message.to_string(),
        });
    }

    fn interrupt(&mut self, interruption: Interruption) {
        if self.detached {
            return;
        }
        let Some(coordinator) = self.coordinator.as_ref() else {
            debug!("Interruption raised before the run started, skipping");
            return;
        };
        if let Err(e) = coordinator.interrupt(interruption) {
            warn!("Failed to process capture interruption: {}", e);
        }
    }

    /// Resolves the suite (class) name a case belongs to by reverse lookup
    /// over the recorded suite contents.
    fn suite_name_for(&self, case_name: &str) -> String {
        for (suite_name, cases) in &self.suites {
            if cases.iter().any(|name| name == case_name) {
                return suite_name.clone();
            }
        }
        "Unrecognized".to_string()
    }

    fn case_data(&self, case_name: &str) -> TestCaseData {
        let data = TestCaseData::new(case_name, self.suite_name_for(case_name), case_name);
        match self.maintainers.get(case_name) {
            Some(maintainer) => data.with_maintainer(maintainer.clone()),
            None => data,
        }
    }

    fn update_maintainer(&self, case_name: &str) {
        let case_id = self.lock_context().case_id(case_name);
        let run_id = self.lock_context().run_id();
        let (Some(run_id), Some(case_id)) = (run_id, case_id) else {
            debug!("Maintainer update for unregistered case {}, skipping", case_name);
            return;
        };
        if let Err(e) = self
            .sink
            .update_case(run_id, case_id, &self.case_data(case_name))
        {
            warn!("Failed to update case metadata: {}", e);
        }
    }

    fn finish_case_on_sink(&self, case_name: &str, status: TestStatus, reason: Option<&str>) {
        let context = self.lock_context();
        let (Some(run_id), Some(case_id)) = (context.run_id(), context.case_id(case_name)) else {
            debug!("Finish for unregistered case {}, skipping", case_name);
            return;
        };
        drop(context);
        if let Err(e) = self
            .sink
            .finish_case(run_id, case_id, status, Utc::now(), reason)
        {
            warn!("Failed to finish case {}: {}", case_name, e);
        }
    }

    fn run_metadata(&self) -> RunMetadata {
        RunMetadata {
            build: self.config.build.clone(),
            environment: self.config.environment.clone(),
            milestone_id: self.config.milestone_id,
            milestone_name: self.config.milestone_name.clone(),
        }
    }
}

impl TestLifecycleObserver for ReportingAgent {
    fn run_will_start(&mut self, run_name: &str) {
        if !self.config.enabled {
            debug!("Reporting disabled, detaching from the test host");
            self.detached = true;
            return;
        }

        // A capture-setup failure loses console logs only; case outcomes are
        // still reported.
        if self.config.capture_console {
            if let Err(e) = self.capture.start_interception(self.config.launch_mode) {
                warn!("Console capture unavailable: {}", e);
            }
        }
        match LifecycleCoordinator::start(
            self.capture.buffer(),
            self.sink.clone(),
            self.context.clone(),
            self.config.flush_interval,
        ) {
            Ok(coordinator) => self.coordinator = Some(coordinator),
            Err(e) => warn!("Log flush worker unavailable: {}", e),
        }

        let display_name = self
            .config
            .run_display_name
            .clone()
            .unwrap_or_else(|| {
                if run_name.is_empty() {
                    "Test Run".to_string()
                } else {
                    run_name.to_string()
                }
            });
        match self
            .sink
            .start_run(&display_name, Utc::now(), &self.run_metadata())
        {
            Ok(run_id) => {
                self.lock_context().set_run_id(run_id);
                if let Some(locale) = self.config.locale.clone() {
                    self.set_locale(&locale);
                }
            }
            Err(e) => warn!("Failed to start run on the reporting sink: {}", e),
        }
    }

    fn suite_will_start(&mut self, suite_name: &str, case_names: &[String]) {
        if self.detached {
            return;
        }
        self.suites
            .insert(suite_name.to_string(), case_names.to_vec());
    }

    fn case_will_start(&mut self, case_name: &str) {
        if self.detached {
            return;
        }
        if let Some(coordinator) = self.coordinator.as_ref() {
            if let Err(e) = coordinator.case_started(case_name) {
                warn!("Failed to start capture for {}: {}", case_name, e);
            }
        }

        let run_id = self.lock_context().run_id();
        let Some(run_id) = run_id else {
            debug!("Case start without an active run, skipping");
            return;
        };
        match self
            .sink
            .start_case(run_id, &self.case_data(case_name), Utc::now())
        {
            Ok(case_id) => {
                self.lock_context().register_case(case_name, case_id);
            }
            // Without a remote id, downstream operations for this case fall
            // into the context-missing no-op path.
            Err(e) => warn!("Failed to start case {}: {}", case_name, e),
        }
    }

    fn case_recorded_failure(&mut self, case_name: &str, description: &str) {
        if self.detached {
            return;
        }
        // Flush-before-payload: buffered logs reach the sink ahead of the
        // failure description they causally precede.
        self.interrupt(Interruption::Failure(description.to_string()));
        self.update_maintainer(case_name);
        self.finish_case_on_sink(case_name, TestStatus::Failed, Some(description));
        self.finished_early.insert(case_name.to_string());
    }

    fn case_did_finish(&mut self, case_name: &str, outcome: CaseOutcome) {
        if self.detached {
            return;
        }
        if let Some(coordinator) = self.coordinator.as_ref() {
            if let Err(e) = coordinator.case_finished() {
                warn!("Failed to complete capture for {}: {}", case_name, e);
            }
        }
        self.update_maintainer(case_name);

        let status = match outcome {
            CaseOutcome::Passed => TestStatus::Passed,
            CaseOutcome::Failed => TestStatus::Failed,
            CaseOutcome::Skipped if self.config.skips_as_failures => TestStatus::Failed,
            CaseOutcome::Skipped => TestStatus::Skipped,
        };
        if !self.finished_early.remove(case_name) {
            self.finish_case_on_sink(case_name, status, None);
        }

        // Deferred TCM statuses resolve to the (possibly remapped) outcome
        // before the current-case pointer goes away.
        let mut context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        self.registry
            .resolve_deferred_statuses(&context, self.sink.as_ref(), status);
        context.clear_current_case();
    }

    fn suite_did_finish(&mut self, suite_name: &str) {
        if self.detached {
            return;
        }
        self.suites.remove(suite_name);
    }

    fn run_did_finish(&mut self) {
        if self.detached {
            return;
        }
        let run_id = self.lock_context().run_id();
        match run_id {
            Some(run_id) => {
                if let Err(e) = self.sink.finish_run(run_id, Utc::now()) {
                    warn!("Failed to finish run: {}", e);
                }
            }
            None => debug!("Run finish without an active run, skipping"),
        }
        self.lock_context().clear_run();

        // Teardown: suspend the flush timer and restore the redirected
        // descriptors.
        if let Some(mut coordinator) = self.coordinator.take() {
            coordinator.shutdown();
        }
        self.capture.shutdown();
    }
}
