//! Built-in host: records suites as they are registered, then runs them one after another.
//!
//! # Execution Model
//!
//! For every suite, in registration order:
//! 1. its `before` hooks, awaited without a limit; a failing hook fails every case of the suite
//! 2. its cases, strictly in declaration order, each awaited up to the configured timeout
//! 3. its `after` hooks
//!
//! Each unit runs on its own worker thread and counts as finished when its [`Done`] handle
//! completes, so the timeout bounds synchronous work too. A unit that overruns is abandoned
//! and its thread left to finish on its own.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use miette::Diagnostic;
use regex::Regex;

use crate::host::{Completion, Done, Host, SetupHook, SuiteScope, TeardownHook, TestFn};
use crate::{ErrorKind, JsonTestError};

pub mod report;

pub use report::{write_report, RunSummary};

// =============================================================================
// CORE TYPES
// =============================================================================

/// Configuration for test execution and reporting.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Per-case completion limit; `None` waits indefinitely.
    pub test_timeout: Option<Duration>,
    /// Only cases whose full title matches run; the rest are skipped.
    pub grep: Option<Regex>,
    pub use_colors: bool,
    /// Stop after the first suite with a failing case.
    pub bail: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_timeout: Some(Duration::from_millis(2000)),
            grep: None,
            use_colors: atty::is(atty::Stream::Stdout),
            bail: false,
        }
    }
}

/// A captured failure, detached from the error so results stay cloneable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub help: Option<String>,
    /// Pretty-printed expected and actual values of an assertion mismatch.
    pub diff: Option<(String, String)>,
}

impl From<&JsonTestError> for Failure {
    fn from(error: &JsonTestError) -> Self {
        let diff = match error {
            JsonTestError::Mismatch { expected, actual, .. } => Some((expected.clone(), actual.clone())),
            _ => None,
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            help: error.help().map(|h| h.to_string()),
            diff,
        }
    }
}

/// Result of executing a single case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestResult {
    Pass { suite: String, name: String },
    Fail { suite: String, name: String, failure: Failure },
    Skipped { suite: String, name: String, reason: String },
}

impl TestResult {
    pub fn name(&self) -> &str {
        match self {
            TestResult::Pass { name, .. } | TestResult::Fail { name, .. } | TestResult::Skipped { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Fail { .. })
    }
}

/// A document that produced no suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSuite {
    pub file: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub results: Vec<TestResult>,
    pub skipped_suites: Vec<SkippedSuite>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        RunSummary::of(self)
    }
}

struct RecordedSuite {
    title: String,
    before: Vec<SetupHook>,
    after: Vec<TeardownHook>,
    cases: Vec<(String, TestFn)>,
}

impl SuiteScope for RecordedSuite {
    fn before(&mut self, hook: SetupHook) {
        self.before.push(hook);
    }

    fn after(&mut self, hook: TeardownHook) {
        self.after.push(hook);
    }

    fn it(&mut self, title: String, test: TestFn) {
        self.cases.push((title, test));
    }
}

// =============================================================================
// SEQUENTIAL HOST
// =============================================================================

/// Runs registered suites sequentially on the calling thread.
pub struct SequentialHost {
    config: HarnessConfig,
    suites: Vec<RecordedSuite>,
    skipped: Vec<SkippedSuite>,
}

impl SequentialHost {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            suites: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Number of cases registered so far.
    pub fn case_count(&self) -> usize {
        self.suites.iter().map(|s| s.cases.len()).sum()
    }

    /// Runs every registered suite and consumes the host.
    pub fn run(self) -> RunReport {
        let SequentialHost { config, suites, skipped } = self;
        let runner = Runner { config };
        let mut results = Vec::new();
        let mut bailed = false;

        for suite in suites {
            if bailed {
                for (name, _) in suite.cases {
                    results.push(TestResult::Skipped {
                        suite: suite.title.clone(),
                        name,
                        reason: "an earlier suite failed (--bail)".to_string(),
                    });
                }
                continue;
            }
            let start = results.len();
            runner.run_suite(suite, &mut results);
            if runner.config.bail && results[start..].iter().any(TestResult::is_failure) {
                tracing::info!("bailing out after first failing suite");
                bailed = true;
            }
        }

        RunReport {
            results,
            skipped_suites: skipped,
        }
    }
}

impl Host for SequentialHost {
    fn describe(&mut self, title: String, body: Box<dyn FnOnce(&mut dyn SuiteScope) + '_>) {
        let mut suite = RecordedSuite {
            title,
            before: Vec::new(),
            after: Vec::new(),
            cases: Vec::new(),
        };
        body(&mut suite);
        self.suites.push(suite);
    }

    fn skip_suite(&mut self, source_file: &Path, reason: &str) {
        self.skipped.push(SkippedSuite {
            file: source_file.to_path_buf(),
            reason: reason.to_string(),
        });
    }
}

struct Runner {
    config: HarnessConfig,
}

impl Runner {
    fn run_suite(&self, suite: RecordedSuite, results: &mut Vec<TestResult>) {
        let RecordedSuite { title, before, after, cases } = suite;
        let selected: Vec<bool> = cases
            .iter()
            .map(|(name, _)| self.selected(&title, name))
            .collect();

        // nothing to run: leave servers and shared instances alone
        if !selected.iter().any(|s| *s) {
            for (name, _) in cases {
                results.push(TestResult::Skipped {
                    suite: title.clone(),
                    name,
                    reason: "does not match --grep".to_string(),
                });
            }
            return;
        }

        let mut setup_failure = None;
        for hook in before {
            // setup is bounded by its own readiness timeout, not the per-case one
            if let Err(e) = self.await_completion(hook, None) {
                tracing::warn!(suite = %title, error = %e, "before hook failed");
                setup_failure = Some(e);
                break;
            }
        }

        for ((name, test), selected) in cases.into_iter().zip(selected) {
            let result = if !selected {
                TestResult::Skipped {
                    suite: title.clone(),
                    name,
                    reason: "does not match --grep".to_string(),
                }
            } else if let Some(e) = &setup_failure {
                let mut failure = Failure::from(e);
                failure.message = format!("\"before all\" hook failed: {}", failure.message);
                TestResult::Fail {
                    suite: title.clone(),
                    name,
                    failure,
                }
            } else {
                match self.await_completion(test, self.config.test_timeout) {
                    Ok(()) => TestResult::Pass {
                        suite: title.clone(),
                        name,
                    },
                    Err(e) => TestResult::Fail {
                        suite: title.clone(),
                        name,
                        failure: Failure::from(&e),
                    },
                }
            };
            results.push(result);
        }

        for hook in after {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(hook)) {
                tracing::warn!(suite = %title, panic = %panic_message(&*payload), "after hook panicked");
            }
        }
    }

    fn selected(&self, suite: &str, name: &str) -> bool {
        self.config
            .grep
            .as_ref()
            .map_or(true, |re| re.is_match(&format!("{} {}", suite, name)))
    }

    fn await_completion(
        &self,
        unit: Box<dyn FnOnce(Done) + Send + 'static>,
        limit: Option<Duration>,
    ) -> Completion {
        let (tx, rx) = mpsc::channel();
        let panic_tx = tx.clone();
        let done = Done::new(move |outcome| {
            // A handle dropped while unwinding must not beat the panic report.
            if !thread::panicking() {
                let _ = tx.send(outcome);
            }
        });
        thread::spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || unit(done))) {
                let _ = panic_tx.send(Err(JsonTestError::Raised {
                    message: format!("panicked: {}", panic_message(&*payload)),
                    kind: Some("panic".to_string()),
                }));
            }
        });
        let received = match limit {
            Some(limit) => rx.recv_timeout(limit),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(JsonTestError::Timeout {
                millis: limit.map(|d| d.as_millis() as u64).unwrap_or_default(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(JsonTestError::NotCompleted),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
