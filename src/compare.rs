//! Deep structural comparison of JSON values.
//!
//! [`check`] never panics and never propagates: the outcome is always returned,
//! with the first divergence captured as a [`JsonTestError::Mismatch`].

use serde_json::Value;

use crate::JsonTestError;

/// Outcome of a single comparison. `Ok(())` is the success marker.
pub type CheckResult = Result<(), JsonTestError>;

/// Compares `actual` against `expected` recursively.
///
/// Numbers compare by value, so `1` and `1.0` are equal. Objects compare key-wise
/// regardless of key order; arrays compare element-wise and by length.
pub fn check(actual: &Value, expected: &Value) -> CheckResult {
    check_at(actual, expected, "$")
}

/// Like [`check`], with mismatch paths rooted at `root` instead of `$`.
pub fn check_at(actual: &Value, expected: &Value, root: &str) -> CheckResult {
    match find_divergence(actual, expected, root.to_string()) {
        None => Ok(()),
        Some(divergence) => Err(divergence.into_error()),
    }
}

/// For a value that may be absent (a missing header, a missing property).
pub fn check_optional_at(actual: Option<&Value>, expected: &Value, root: &str) -> CheckResult {
    check_at(actual.unwrap_or(&Value::Null), expected, root)
}

struct Divergence {
    path: String,
    reason: String,
    actual: String,
    expected: String,
}

impl Divergence {
    fn new(path: String, reason: impl Into<String>, actual: &Value, expected: &Value) -> Self {
        Self {
            path,
            reason: reason.into(),
            actual: render(actual),
            expected: render(expected),
        }
    }

    fn into_error(self) -> JsonTestError {
        let message = format!(
            "{} at {}: expected {}, got {}",
            self.reason,
            self.path,
            compact(&self.expected),
            compact(&self.actual)
        );
        JsonTestError::Mismatch {
            message,
            path: self.path,
            expected: self.expected,
            actual: self.actual,
            status: None,
        }
    }
}

fn find_divergence(actual: &Value, expected: &Value, path: String) -> Option<Divergence> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => {
            if numbers_equal(a, e) {
                None
            } else {
                Some(Divergence::new(path, "values differ", actual, expected))
            }
        }
        (Value::Array(a), Value::Array(e)) => {
            for (i, (av, ev)) in a.iter().zip(e.iter()).enumerate() {
                if let Some(d) = find_divergence(av, ev, format!("{}[{}]", path, i)) {
                    return Some(d);
                }
            }
            if a.len() != e.len() {
                let reason = format!("array lengths differ ({} vs {})", a.len(), e.len());
                return Some(Divergence::new(path, reason, actual, expected));
            }
            None
        }
        (Value::Object(a), Value::Object(e)) => {
            for (key, ev) in e {
                let child = format!("{}.{}", path, key);
                match a.get(key) {
                    Some(av) => {
                        if let Some(d) = find_divergence(av, ev, child) {
                            return Some(d);
                        }
                    }
                    None => {
                        return Some(Divergence::new(child, "missing key", &Value::Null, ev));
                    }
                }
            }
            if let Some((key, av)) = a.iter().find(|(k, _)| !e.contains_key(*k)) {
                let child = format!("{}.{}", path, key);
                return Some(Divergence::new(child, "unexpected key", av, &Value::Null));
            }
            None
        }
        _ if actual == expected => None,
        _ if std::mem::discriminant(actual) != std::mem::discriminant(expected) => Some(
            Divergence::new(path, "types differ", actual, expected),
        ),
        _ => Some(Divergence::new(path, "values differ", actual, expected)),
    }
}

fn numbers_equal(a: &serde_json::Number, e: &serde_json::Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), e.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), e.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), e.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Pretty JSON, used for diffs in failure reports.
fn render(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn compact(rendered: &str) -> String {
    const LIMIT: usize = 80;
    let flat: String = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > LIMIT {
        let cut: String = flat.chars().take(LIMIT).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
