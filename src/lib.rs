pub use crate::diagnostics::{ErrorKind, JsonTestError};
pub use crate::host::{Completion, Done, Host, SuiteScope};
pub use crate::registry::{ClassDescriptor, Registry, Subject};
pub use crate::spec::{SuiteSpec, TestCaseSpec};
pub use crate::suite::{Registration, SuiteLoader};

pub mod cli;
pub mod compare;
pub mod diagnostics;
pub mod discovery;
pub mod harness;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod registry;
pub mod spec;
pub mod strategy;
pub mod suite;
