//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use json_tests::registry::{raise, unknown_method};
use json_tests::strategy::FactoryStrategy;
use json_tests::{ClassDescriptor, Done, JsonTestError, Registry, Subject, SuiteSpec, TestCaseSpec};
use serde_json::{json, Value};

/// Running total; `sum` adds its params, `reset` zeroes it, `pause` sleeps for `params[0]` ms.
pub struct Accumulator {
    total: f64,
}

impl Subject for Accumulator {
    fn property(&self, name: &str) -> Result<Value, JsonTestError> {
        Ok(match name {
            "total" => json!(self.total),
            _ => Value::Null,
        })
    }

    fn call(&mut self, method: &str, params: &[Value]) -> Result<Value, JsonTestError> {
        match method {
            "sum" => {
                self.total += params.iter().filter_map(Value::as_f64).sum::<f64>();
                Ok(json!(self.total))
            }
            "pause" => {
                let millis = params.first().and_then(Value::as_u64).unwrap_or(0);
                std::thread::sleep(std::time::Duration::from_millis(millis));
                Ok(Value::Null)
            }
            "reset" => {
                self.total = 0.0;
                Ok(Value::Null)
            }
            "divide" => match params.first().and_then(Value::as_f64) {
                Some(d) if d != 0.0 => Ok(json!(self.total / d)),
                _ => Err(raise("division by zero")),
            },
            _ => Err(unknown_method(method)),
        }
    }
}

pub fn accumulator() -> ClassDescriptor {
    ClassDescriptor::new("Accumulator", |args: &[Value]| {
        Ok(Accumulator {
            total: args.first().and_then(Value::as_f64).unwrap_or(0.0),
        })
    })
}

/// `name` → greeting, `params` → maximum.
pub fn greeter(test: &FactoryStrategy, done: Done, _suite: &SuiteSpec, case: &TestCaseSpec) {
    let actual = if let Some(name) = case.get("name").and_then(Value::as_str) {
        json!(format!("Hello {}", name))
    } else {
        let params = case.params().unwrap_or_default();
        json!(params.iter().filter_map(Value::as_f64).fold(f64::NEG_INFINITY, f64::max))
    };
    done.complete(test.check(&actual, case.expected()));
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_class("accumulator", accumulator());
    registry.register_factory("greeter", greeter);
    registry
}

/// Writes `document` to `dir/relative`, creating parent directories.
pub fn write_suite(dir: &Path, relative: &str, document: &Value) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}
