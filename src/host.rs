//! Interface to the host test framework.
//!
//! The engine never schedules anything itself. It registers suites, hooks and cases through
//! [`Host`] and [`SuiteScope`], and each unit of work reports back exactly once through a
//! [`Done`] handle.

use std::path::Path;
use std::sync::mpsc::{self, Receiver};

use crate::JsonTestError;

/// What a unit of work reports: `Ok(())` passes, `Err` carries the captured failure.
pub type Completion = Result<(), JsonTestError>;

pub type TestFn = Box<dyn FnOnce(Done) + Send + 'static>;
pub type SetupHook = Box<dyn FnOnce(Done) + Send + 'static>;
pub type TeardownHook = Box<dyn FnOnce() + Send + 'static>;

/// Registration surface for the cases and hooks of one suite.
pub trait SuiteScope {
    /// Runs once before the suite's first case; the suite waits for `done`.
    fn before(&mut self, hook: SetupHook);
    /// Runs once after the suite's last case.
    fn after(&mut self, hook: TeardownHook);
    /// Declares one case. Cases run in declaration order.
    fn it(&mut self, title: String, test: TestFn);
}

/// The host test framework.
pub trait Host {
    /// Declares a suite; `body` registers its hooks and cases.
    fn describe(&mut self, title: String, body: Box<dyn FnOnce(&mut dyn SuiteScope) + '_>);
    /// Reports a document that yielded no suite.
    fn skip_suite(&mut self, source_file: &Path, reason: &str);
}

/// One-shot completion handle.
///
/// Consuming `self` rules out double completion. A handle dropped without being
/// completed reports [`JsonTestError::NotCompleted`], so a unit never finishes silently.
pub struct Done {
    callback: Option<Box<dyn FnOnce(Completion) + Send + 'static>>,
}

impl Done {
    pub fn new(callback: impl FnOnce(Completion) + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// A handle whose completion arrives on the returned receiver.
    pub fn channel() -> (Self, Receiver<Completion>) {
        let (tx, rx) = mpsc::channel();
        let done = Self::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (done, rx)
    }

    pub fn pass(self) {
        self.complete(Ok(()));
    }

    pub fn fail(self, error: JsonTestError) {
        self.complete(Err(error));
    }

    pub fn complete(mut self, outcome: Completion) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl Drop for Done {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(Err(JsonTestError::NotCompleted));
        }
    }
}

impl std::fmt::Debug for Done {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn completes_exactly_once() {
        let (done, rx) = Done::channel();
        done.pass();
        assert!(matches!(rx.recv(), Ok(Ok(()))));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn dropped_handle_reports_not_completed() {
        let (done, rx) = Done::channel();
        drop(done);
        let outcome = rx.recv().unwrap();
        assert_eq!(outcome.unwrap_err().kind(), ErrorKind::NotCompleted);
    }

    #[test]
    fn completion_may_come_from_another_thread() {
        let (done, rx) = Done::channel();
        std::thread::spawn(move || done.fail(crate::err_msg!(Transport, "refused")));
        let outcome = rx.recv().unwrap();
        assert_eq!(outcome.unwrap_err().kind(), ErrorKind::Transport);
    }
}
