//! Command-line arguments of the `json-tests` runner.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use regex::Regex;

use crate::harness::HarnessConfig;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "json-tests",
    version,
    about = "Runs declarative JSON test suites."
)]
pub struct JsonTestsArgs {
    /// Directories to scan for `*.json` suite documents.
    #[arg(value_name = "DIRS")]
    pub dirs: Vec<PathBuf>,

    /// Additional suite directory; may be repeated.
    #[arg(long = "json-tests-dir", value_name = "DIR")]
    pub json_tests_dir: Vec<PathBuf>,

    /// Only run cases whose "<suite> <case>" title matches this regex.
    #[arg(long, value_name = "REGEX", value_parser = parse_regex)]
    pub grep: Option<Regex>,

    /// Per-case completion timeout in milliseconds; 0 disables it.
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub timeout: u64,

    /// When to color the report.
    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Stop after the first suite with a failing case.
    #[arg(long)]
    pub bail: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn enabled(self) -> bool {
        match self {
            ColorMode::Auto => atty::is(atty::Stream::Stdout),
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn parse_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}

impl JsonTestsArgs {
    /// Positional directories first, then every `--json-tests-dir`.
    pub fn suite_dirs(&self) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .chain(self.json_tests_dir.iter())
            .cloned()
            .collect()
    }

    pub fn harness_config(&self) -> HarnessConfig {
        HarnessConfig {
            test_timeout: (self.timeout > 0).then(|| Duration::from_millis(self.timeout)),
            grep: self.grep.clone(),
            use_colors: self.color.enabled(),
            bail: self.bail,
        }
    }
}
