//! The `json-tests` command-line interface.
//!
//! Discovers suite documents, registers them with the built-in [`SequentialHost`] and
//! prints the report.
//!
//! # Exit Codes
//! - `0`: every case passed
//! - `1`: a case failed, a document could not be loaded, or a suite names an unknown class
//!   or factory
//! - `2`: nothing to run, or the runner itself could not start

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};

use crate::cli::args::JsonTestsArgs;
use crate::discovery::{common_root, default_dirs, discover_suite_files};
use crate::harness::{write_report, SequentialHost};
use crate::registry::Registry;
use crate::suite::SuiteLoader;
use crate::{logging, JsonTestError};

pub mod args;

/// Entry point of the bare binary: no classes or factories are registered.
pub fn run() -> ExitCode {
    run_with(Registry::new())
}

/// Entry point for programs that register their own classes and factories.
pub fn run_with(registry: Registry) -> ExitCode {
    run_args(JsonTestsArgs::parse(), registry)
}

pub fn run_args(args: JsonTestsArgs, registry: Registry) -> ExitCode {
    logging::init();

    let dirs = match resolve_dirs(&args) {
        Ok(dirs) => dirs,
        Err(e) => {
            report_error(e);
            return ExitCode::from(2);
        }
    };
    let files = match discover_suite_files(&dirs) {
        Ok(files) => files,
        Err(e) => {
            report_error(e);
            return ExitCode::from(2);
        }
    };
    let loader = match SuiteLoader::new(registry) {
        Ok(loader) => loader,
        Err(e) => {
            report_error(e);
            return ExitCode::from(2);
        }
    };

    let root = common_root(&dirs);
    tracing::debug!(root = %root.display(), files = files.len(), "suite documents discovered");

    let config = args.harness_config();
    let choice = if config.use_colors {
        ColorChoice::Always
    } else {
        ColorChoice::Never
    };
    let mut host = SequentialHost::new(config);
    let suite_errors = register_all(&loader, &mut host, &files, &root);

    let report = host.run();
    let mut stdout = StandardStream::stdout(choice);
    if let Err(e) = write_report(&mut stdout, &report) {
        eprintln!("Error: failed to write report: {}", e);
        return ExitCode::from(2);
    }

    if report.summary().is_success() && suite_errors == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Registers every file; a broken document is reported and the rest still run.
///
/// Returns how many documents failed to load or named an unresolvable strategy target.
fn register_all(loader: &SuiteLoader, host: &mut SequentialHost, files: &[PathBuf], root: &Path) -> usize {
    let mut errors = 0;
    for file in files {
        match loader.register_file(host, file, root) {
            Ok(registration) if registration.is_error() => errors += 1,
            Ok(_) => {}
            Err(e) => {
                errors += 1;
                report_error(e);
            }
        }
    }
    errors
}

fn resolve_dirs(args: &JsonTestsArgs) -> Result<Vec<PathBuf>, JsonTestError> {
    let dirs = args.suite_dirs();
    if !dirs.is_empty() {
        return Ok(dirs);
    }
    let cwd = std::env::current_dir()?;
    let defaults = default_dirs(&cwd);
    if defaults.is_empty() {
        return Err(JsonTestError::Configuration {
            message: format!("no test directory found in {}", cwd.display()),
            help: Some("pass directories as arguments or with --json-tests-dir, or create ./test or ./tests".to_string()),
        });
    }
    Ok(defaults)
}

fn report_error(error: JsonTestError) {
    eprintln!("{:?}", miette::Report::new(error));
}
