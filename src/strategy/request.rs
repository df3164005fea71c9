//! Request suites: one HTTP request per case, checked against `expected`.
//!
//! A case's `options` describe the request (`method`, `url`, `headers`, `body`, `timeout`)
//! and `expected` the response (`statusCode`, optional `headers`, optional `body`). Checks
//! run status first, then headers in declaration order, then body, and stop at the first
//! mismatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::compare::{check_at, check_optional_at};
use crate::host::{Completion, SuiteScope};
use crate::lifecycle::{ServerSpec, SuiteLifecycle};
use crate::spec::{type_name, TestCaseSpec};
use crate::{err_msg, JsonTestError};

const REDIRECT_LIMIT: usize = 10;

/// A request ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    /// Builds the request a case's `options` describe.
    ///
    /// `body` is sent as its JSON text, with `content-type: application/json` unless the
    /// options set a content type themselves.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, JsonTestError> {
        let url = match options.get("url") {
            Some(Value::String(url)) if !url.is_empty() => url.clone(),
            Some(other) if !other.is_string() && !other.is_null() => {
                return Err(err_msg!(Configuration, "`options.url` must be a string, found {}", type_name(other)))
            }
            _ => {
                return Err(JsonTestError::Configuration {
                    message: "request case has no `options.url`".to_string(),
                    help: Some("set `options.url` in the case or in `common`".to_string()),
                })
            }
        };
        let method = match options.get("method") {
            None | Some(Value::Null) => "GET".to_string(),
            Some(Value::String(method)) => method.to_uppercase(),
            Some(other) => {
                return Err(err_msg!(Configuration, "`options.method` must be a string, found {}", type_name(other)))
            }
        };

        let mut headers = Vec::new();
        match options.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    headers.push((name.clone(), header_text(value)));
                }
            }
            Some(other) => {
                return Err(err_msg!(Configuration, "`options.headers` must be an object, found {}", type_name(other)))
            }
        }

        let body = match options.get("body") {
            None => None,
            Some(value) => {
                let text = serde_json::to_string(value)
                    .map_err(|e| err_msg!(Configuration, "`options.body` cannot be serialized: {}", e))?;
                if !headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("content-type")) {
                    headers.push(("content-type".to_string(), "application/json".to_string()));
                }
                Some(text)
            }
        };

        let timeout = match options.get("timeout") {
            None | Some(Value::Null) => None,
            Some(value) => Some(Duration::from_millis(value.as_u64().ok_or_else(|| {
                err_msg!(Configuration, "`options.timeout` must be milliseconds")
            })?)),
        };

        Ok(Self {
            method,
            url,
            headers,
            body,
            timeout,
        })
    }
}

/// A received response. Header names are lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Sends requests on behalf of request suites.
///
/// Errors are [`JsonTestError::Transport`] when nothing was received and
/// [`JsonTestError::Configuration`] when the request itself is malformed.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, JsonTestError>;
}

/// Blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, JsonTestError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))
            .build()
            .map_err(|e| JsonTestError::Transport {
                message: format!("failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, JsonTestError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| err_msg!(Configuration, "invalid HTTP method `{}`: {}", request.method, e))?;
        let headers = build_headers(&request.headers)?;

        let mut builder = self.client.request(method, &request.url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let failed = |e: reqwest::Error| JsonTestError::Transport {
            message: format!("{} {} failed: {}", request.method, request.url, e),
            source: Some(Box::new(e)),
        };
        let response = builder.send().map_err(failed)?;
        let status_code = response.status().as_u16();

        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_string())
                .and_modify(|joined: &mut String| {
                    joined.push_str(", ");
                    joined.push_str(&value);
                })
                .or_insert_with(|| value.clone());
        }
        let content_type = headers.get(CONTENT_TYPE.as_str()).cloned();
        let text = response.text().map_err(failed)?;
        tracing::debug!(status = status_code, url = %request.url, "response received");

        Ok(HttpResponse {
            status_code,
            headers,
            body: decode_body(content_type.as_deref(), text),
        })
    }
}

fn build_headers(input: &[(String, String)]) -> Result<HeaderMap, JsonTestError> {
    let mut headers = HeaderMap::new();
    for (name, value) in input {
        if name.is_empty() {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| err_msg!(Configuration, "invalid header name `{}`: {}", name, e))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| err_msg!(Configuration, "invalid header value for `{}`: {}", name, e))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// JSON content types are parsed; anything else, or unparsable JSON, stays text.
pub fn decode_body(content_type: Option<&str>, text: String) -> Value {
    let is_json = content_type.is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        essence == "application/json" || essence.ends_with("+json")
    });
    if is_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return value;
        }
    }
    Value::String(text)
}

fn header_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
pub struct RequestStrategy {
    transport: Arc<dyn HttpTransport>,
    lifecycle: SuiteLifecycle,
}

impl RequestStrategy {
    pub fn new(transport: Arc<dyn HttpTransport>, server: Option<ServerSpec>) -> Self {
        Self {
            transport,
            lifecycle: SuiteLifecycle::new(server),
        }
    }

    /// The suite's server process, shared by every clone.
    pub fn lifecycle(&self) -> &SuiteLifecycle {
        &self.lifecycle
    }

    pub fn add_test(&self, scope: &mut dyn SuiteScope, case: TestCaseSpec) {
        let strategy = self.clone();
        scope.it(
            case.title(),
            Box::new(move |done| done.complete(strategy.run_case(&case))),
        );
    }

    pub fn run_case(&self, case: &TestCaseSpec) -> Completion {
        let exception = case.exception()?;
        let request = HttpRequest::from_options(&case.options()?)?;
        tracing::debug!(method = %request.method, url = %request.url, case = %case.title(), "sending request");
        match self.transport.send(request) {
            Ok(response) => check_response(&response, case.expected()),
            Err(e) if exception.as_ref().is_some_and(|x| x.matches(&e)) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, case = %case.title(), "request failed");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for RequestStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStrategy")
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Status, then each expected header, then body.
pub fn check_response(response: &HttpResponse, expected: &Value) -> Completion {
    let Value::Object(expected) = expected else {
        return Err(err_msg!(
            Configuration,
            "`expected` of a request case must be an object, found {}",
            type_name(expected)
        ));
    };
    let Some(status) = expected.get("statusCode") else {
        return Err(JsonTestError::Configuration {
            message: "`expected.statusCode` is missing".to_string(),
            help: Some("request cases always compare the response status".to_string()),
        });
    };
    let code = response.status_code;
    check_at(&Value::from(code), status, "statusCode").map_err(|e| e.with_status(code))?;

    match expected.get("headers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(headers)) => {
            for (name, value) in headers {
                let lower = name.to_ascii_lowercase();
                let actual = response.header(&lower).map(|v| Value::String(v.to_string()));
                let wanted = match value {
                    Value::Number(_) | Value::Bool(_) => Value::String(value.to_string()),
                    other => other.clone(),
                };
                check_optional_at(actual.as_ref(), &wanted, &format!("headers.{}", lower))
                    .map_err(|e| e.with_status(code))?;
            }
        }
        Some(other) => {
            return Err(err_msg!(
                Configuration,
                "`expected.headers` must be an object, found {}",
                type_name(other)
            ))
        }
    }

    if let Some(body) = expected.get("body") {
        check_at(&response.body, body, "body").map_err(|e| e.with_status(code))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;

    /// Replays one canned response and records what was sent.
    struct Canned {
        response: HttpResponse,
        sent: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(status_code: u16, headers: &[(&str, &str)], body: Value) -> Arc<Self> {
            Arc::new(Self {
                response: HttpResponse {
                    status_code,
                    headers: headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                    body,
                },
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl HttpTransport for Canned {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, JsonTestError> {
            self.sent.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    struct Refused;

    impl HttpTransport for Refused {
        fn send(&self, request: HttpRequest) -> Result<HttpResponse, JsonTestError> {
            Err(err_msg!(Transport, "{} {} failed: connection refused", request.method, request.url))
        }
    }

    fn case(value: Value) -> TestCaseSpec {
        let Value::Object(fields) = value else { unreachable!() };
        TestCaseSpec::new(0, fields)
    }

    fn mismatch_path(result: Completion) -> String {
        match result {
            Err(JsonTestError::Mismatch { path, .. }) => path,
            other => panic!("expected a mismatch, got {:?}", other),
        }
    }

    #[test]
    fn headers_match_case_insensitively_then_body_is_checked() {
        let transport = Canned::new(200, &[("x-a", "1")], json!({"id": 1}));
        let strategy = RequestStrategy::new(transport, None);
        let passing = case(json!({
            "options": {"url": "http://localhost/items/1"},
            "expected": {"statusCode": 200, "headers": {"X-A": "1"}, "body": {"id": 1}}
        }));
        assert!(strategy.run_case(&passing).is_ok());

        let failing = case(json!({
            "options": {"url": "http://localhost/items/1"},
            "expected": {"statusCode": 200, "headers": {"X-A": "1"}, "body": {"id": 2}}
        }));
        let path = mismatch_path(strategy.run_case(&failing));
        assert!(path.starts_with("body"), "{}", path);
    }

    #[test]
    fn status_is_checked_before_anything_else() {
        let strategy = RequestStrategy::new(Canned::new(404, &[], json!({"id": 2})), None);
        let err = strategy
            .run_case(&case(json!({
                "options": {"url": "http://localhost/"},
                "expected": {"statusCode": 200, "body": {"id": 1}}
            })))
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert!(matches!(err, JsonTestError::Mismatch { ref path, .. } if path == "statusCode"));
    }

    #[test]
    fn missing_header_and_scalar_header_values() {
        let strategy = RequestStrategy::new(Canned::new(200, &[("content-length", "12")], json!("")), None);
        let numeric = case(json!({
            "options": {"url": "http://localhost/"},
            "expected": {"statusCode": 200, "headers": {"Content-Length": 12}}
        }));
        assert!(strategy.run_case(&numeric).is_ok());
        let absent = case(json!({
            "options": {"url": "http://localhost/"},
            "expected": {"statusCode": 200, "headers": {"X-Trace": "abc"}}
        }));
        assert_eq!(mismatch_path(strategy.run_case(&absent)), "headers.x-trace");
    }

    #[test]
    fn body_is_serialized_with_a_json_content_type() {
        let transport = Canned::new(201, &[], Value::Null);
        let strategy = RequestStrategy::new(transport.clone(), None);
        let posting = case(json!({
            "options": {"method": "post", "url": "http://localhost/items", "body": {"name": "x"}, "timeout": 50},
            "expected": {"statusCode": 201}
        }));
        assert!(strategy.run_case(&posting).is_ok());
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].method, "POST");
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"name":"x"}"#));
        assert!(sent[0].headers.contains(&("content-type".to_string(), "application/json".to_string())));
        assert_eq!(sent[0].timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let mut options = Map::new();
        options.insert("url".into(), json!("http://localhost/"));
        options.insert("headers".into(), json!({"Content-Type": "text/plain"}));
        options.insert("body".into(), json!("hi"));
        let request = HttpRequest::from_options(&options).unwrap();
        assert_eq!(request.headers, vec![("Content-Type".to_string(), "text/plain".to_string())]);
        assert_eq!(request.body.as_deref(), Some("\"hi\""));
    }

    #[test]
    fn transport_failures_carry_no_status() {
        let strategy = RequestStrategy::new(Arc::new(Refused), None);
        let err = strategy
            .run_case(&case(json!({"options": {"url": "http://localhost:1/"}, "expected": {"statusCode": 200}})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn expected_transport_failure_passes() {
        let strategy = RequestStrategy::new(Arc::new(Refused), None);
        let tolerated = case(json!({
            "options": {"url": "http://localhost:1/"},
            "exception": {"kind": "TransportError"}
        }));
        assert!(strategy.run_case(&tolerated).is_ok());
    }

    #[test]
    fn misconfigured_cases() {
        let strategy = RequestStrategy::new(Canned::new(200, &[], Value::Null), None);
        let no_url = strategy.run_case(&case(json!({"expected": {"statusCode": 200}}))).unwrap_err();
        assert_eq!(no_url.kind(), ErrorKind::Configuration);
        let no_status = strategy
            .run_case(&case(json!({"options": {"url": "http://x/"}, "expected": {"body": 1}})))
            .unwrap_err();
        assert!(no_status.to_string().contains("statusCode"));
    }

    #[test]
    fn body_decoding_follows_content_type() {
        assert_eq!(decode_body(Some("application/json; charset=utf-8"), "[1]".into()), json!([1]));
        assert_eq!(decode_body(Some("application/problem+json"), "{}".into()), json!({}));
        assert_eq!(decode_body(Some("text/plain"), "[1]".into()), json!("[1]"));
        assert_eq!(decode_body(Some("application/json"), "oops".into()), json!("oops"));
        assert_eq!(decode_body(None, "".into()), json!(""));
    }

    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{}/items/1", addr)
    }

    #[test]
    fn reqwest_transport_over_loopback() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nX-A: 1\r\nContent-Length: 8\r\nConnection: close\r\n\r\n{\"id\":1}",
        );
        let transport = ReqwestTransport::new().unwrap();
        let response = transport.send(HttpRequest::get(url)).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.header("X-A"), Some("1"));
        assert_eq!(response.body, json!({"id": 1}));
    }

    #[test]
    fn reqwest_transport_reports_refused_connections() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .send(HttpRequest::get(format!("http://{}/", addr)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
