//! Execution strategies and their dispatcher.
//!
//! - **`class`**: constructs a registered class and reads properties / calls methods
//! - **`factory`**: hands each case to a registered factory function
//! - **`request`**: issues an HTTP request and checks the response
//!
//! The variant is chosen once per suite from [`SuiteSpec::kind`].

use std::sync::Arc;

use crate::host::{Done, SuiteScope};
use crate::registry::Registry;
use crate::spec::{StrategyKind, SuiteSpec, TestCaseSpec};
use crate::{err_msg, JsonTestError};

pub mod class;
pub mod factory;
pub mod request;

pub use class::ClassStrategy;
pub use factory::FactoryStrategy;
pub use request::{HttpRequest, HttpResponse, HttpTransport, RequestStrategy, ReqwestTransport};

/// A suite's execution strategy. Clones share state.
#[derive(Clone, Debug)]
pub enum Strategy {
    Class(ClassStrategy),
    Factory(FactoryStrategy),
    Request(RequestStrategy),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Class(_) => StrategyKind::Class,
            Strategy::Factory(_) => StrategyKind::Factory,
            Strategy::Request(_) => StrategyKind::Request,
        }
    }

    /// Registers one case with the host.
    pub fn add_test(&self, scope: &mut dyn SuiteScope, case: TestCaseSpec) {
        match self {
            Strategy::Class(s) => s.add_test(scope, case),
            Strategy::Factory(s) => s.add_test(scope, case),
            Strategy::Request(s) => s.add_test(scope, case),
        }
    }

    /// Suite setup hook; only request suites do any work here.
    pub fn set_up(&self, done: Done) {
        match self {
            Strategy::Request(s) => s.lifecycle().set_up(done),
            _ => done.pass(),
        }
    }

    pub fn tear_down(&self) {
        if let Strategy::Request(s) = self {
            s.lifecycle().tear_down();
        }
    }
}

/// Builds the strategy `suite.kind` names.
///
/// Fails with a configuration error when the variant's mandatory fields are missing or
/// its `class`/`factory` path does not resolve.
pub fn select(
    suite: &SuiteSpec,
    registry: &Registry,
    transport: &Arc<dyn HttpTransport>,
) -> Result<Strategy, JsonTestError> {
    match suite.kind {
        StrategyKind::Factory => {
            let path = required_target(suite, "factory")?;
            let factory = registry.resolve_factory(path, &suite.meta.source_dir)?;
            Ok(Strategy::Factory(FactoryStrategy::new(suite.clone(), factory)))
        }
        StrategyKind::Class => {
            let path = required_target(suite, "class")?;
            let class = registry.resolve_class(path, &suite.meta.source_dir)?;
            Ok(Strategy::Class(ClassStrategy::new(class, suite.construct.as_deref())))
        }
        StrategyKind::Request => Ok(Strategy::Request(RequestStrategy::new(
            Arc::clone(transport),
            suite.server.clone(),
        ))),
    }
}

fn required_target<'a>(suite: &'a SuiteSpec, field: &str) -> Result<&'a str, JsonTestError> {
    suite
        .target
        .as_deref()
        .filter(|path| !path.is_empty())
        .ok_or_else(|| err_msg!(Configuration, "`{}` must name a path", field))
}
