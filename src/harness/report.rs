//! Colored PASS/FAIL/SKIP report of a run.

use std::io;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorSpec, WriteColor};

use super::{RunReport, TestResult};

/// Pass/fail/skip counts of a run. Skipped documents count as skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn of(report: &RunReport) -> Self {
        let mut summary = RunSummary::default();
        for result in &report.results {
            match result {
                TestResult::Pass { .. } => summary.passed += 1,
                TestResult::Fail { .. } => summary.failed += 1,
                TestResult::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary.skipped += report.skipped_suites.len();
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

fn paint(out: &mut dyn WriteColor, text: &str, color: Color) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(out, "{}", text)?;
    out.reset()
}

/// Writes one line per case, failure details with diffs, then the summary.
pub fn write_report(out: &mut dyn WriteColor, report: &RunReport) -> io::Result<()> {
    for skipped in &report.skipped_suites {
        paint(out, "SKIP", Color::Yellow)?;
        writeln!(out, ": {} ({})", skipped.file.display(), skipped.reason)?;
    }

    for result in &report.results {
        match result {
            TestResult::Pass { suite, name } => {
                paint(out, "PASS", Color::Green)?;
                writeln!(out, ": {} [{}]", name, suite)?;
            }
            TestResult::Fail { suite, name, failure } => {
                paint(out, "FAIL", Color::Red)?;
                writeln!(out, ": {} [{}]", name, suite)?;
                writeln!(out, "  Error: {}", failure.message)?;
                if let Some(help) = &failure.help {
                    writeln!(out, "  Help: {}", help)?;
                }
                if let Some((expected, actual)) = &failure.diff {
                    writeln!(out, "  Diff (-expected +actual):")?;
                    write_diff(out, expected, actual)?;
                }
            }
            TestResult::Skipped { suite, name, reason } => {
                paint(out, "SKIP", Color::Yellow)?;
                writeln!(out, ": {} [{}] ({})", name, suite, reason)?;
            }
        }
    }

    let summary = report.summary();
    write!(out, "\nTest summary: total {}, ", summary.total())?;
    paint(out, "passed", Color::Green)?;
    write!(out, " {}, ", summary.passed)?;
    paint(out, "failed", Color::Red)?;
    write!(out, " {}, ", summary.failed)?;
    paint(out, "skipped", Color::Yellow)?;
    writeln!(out, " {}", summary.skipped)?;

    if summary.failed > 0 {
        writeln!(out, "\nFailed tests:")?;
        for result in report.results.iter().filter(|r| r.is_failure()) {
            if let TestResult::Fail { suite, name, .. } = result {
                writeln!(out, "  - {} {}", suite, name)?;
            }
        }
    }
    Ok(())
}

fn write_diff(out: &mut dyn WriteColor, expected: &str, actual: &str) -> io::Result<()> {
    let changeset = Changeset::new(expected, actual, "\n");
    for diff in &changeset.diffs {
        let (sign, color, text) = match diff {
            Difference::Same(x) => (' ', None, x),
            Difference::Rem(x) => ('-', Some(Color::Red), x),
            Difference::Add(x) => ('+', Some(Color::Green), x),
        };
        for line in text.lines() {
            out.set_color(ColorSpec::new().set_fg(color))?;
            write!(out, "    {}{}", sign, line)?;
            out.reset()?;
            writeln!(out)?;
        }
    }
    Ok(())
}
