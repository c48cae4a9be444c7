//! Remote execution back end.
//!
//! Submits learner source text to the external code-execution service over
//! HTTP, maps the submission status to a trace or a diagnostic, and parses
//! the action-event lines the program printed back into actions. The remote
//! service is the only process/network boundary in the engine and is
//! treated as unreliable and slow.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::capability::{CallArg, TraceRecorder};
use super::diagnostic::Diagnostic;
use super::types::ProgramTrace;
use super::world::WorldState;

pub const ENV_EXEC_BASE_URL: &str = "CODEQUEST_EXEC_BASE_URL";
pub const ENV_EXEC_TIMEOUT_MS: &str = "CODEQUEST_EXEC_TIMEOUT_MS";
pub const ENV_EXEC_BASE64: &str = "CODEQUEST_EXEC_BASE64";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 10_000;

/// The only language the execution service is allowed to run for us.
pub const PYTHON_LANGUAGE_ID: u32 = 71;

/// Marker printed by the host-side helper functions, one line per
/// primitive invocation.
pub const ACTION_EVENT_PREFIX: &str = "@cq ";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteExecConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub base64_encoded: bool,
}

impl RemoteExecConfig {
    /// Read configuration from `config.toml` in the working directory if
    /// present, otherwise from the environment.
    pub fn from_default_sources() -> Result<Self, RemoteExecConfigError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Self::from_env()
    }

    pub fn from_config_file(path: &Path) -> Result<Self, RemoteExecConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| RemoteExecConfigError::ReadConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| RemoteExecConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;
        let table = value
            .as_table()
            .ok_or_else(|| RemoteExecConfigError::ParseConfigFile {
                path: path.display().to_string(),
                message: "root is not a TOML table".to_string(),
            })?;

        Self::from_env_with(|key| {
            table
                .get(key)
                .and_then(toml_value_to_string)
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_env() -> Result<Self, RemoteExecConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_env_with<F>(mut getter: F) -> Result<Self, RemoteExecConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = getter(ENV_EXEC_BASE_URL)
            .filter(|value| !value.trim().is_empty())
            .ok_or(RemoteExecConfigError::MissingEnv {
                key: ENV_EXEC_BASE_URL,
            })?;
        let timeout_ms = match getter(ENV_EXEC_TIMEOUT_MS) {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| RemoteExecConfigError::InvalidTimeout { value })?,
            None => DEFAULT_EXEC_TIMEOUT_MS,
        };
        let base64_encoded = match getter(ENV_EXEC_BASE64) {
            Some(value) => value
                .parse::<bool>()
                .map_err(|_| RemoteExecConfigError::InvalidFlag { value })?,
            None => false,
        };

        Ok(Self {
            base_url,
            timeout_ms,
            base64_encoded,
        })
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteExecConfigError {
    MissingEnv { key: &'static str },
    InvalidTimeout { value: String },
    InvalidFlag { value: String },
    ReadConfigFile { path: String, message: String },
    ParseConfigFile { path: String, message: String },
}

impl fmt::Display for RemoteExecConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteExecConfigError::MissingEnv { key } => {
                write!(f, "missing env variable: {key}")
            }
            RemoteExecConfigError::InvalidTimeout { value } => {
                write!(f, "invalid timeout value: {value}")
            }
            RemoteExecConfigError::InvalidFlag { value } => {
                write!(f, "invalid boolean value: {value}")
            }
            RemoteExecConfigError::ReadConfigFile { path, message } => {
                write!(f, "read config file failed ({path}): {message}")
            }
            RemoteExecConfigError::ParseConfigFile { path, message } => {
                write!(f, "parse config file failed ({path}): {message}")
            }
        }
    }
}

impl Error for RemoteExecConfigError {}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubmissionRequest<'a> {
    source_code: &'a str,
    language_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmissionStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

/// Submission status ids of the execution service.
pub mod status_id {
    pub const IN_QUEUE: u32 = 1;
    pub const PROCESSING: u32 = 2;
    pub const ACCEPTED: u32 = 3;
    pub const TIME_LIMIT_EXCEEDED: u32 = 5;
    pub const COMPILATION_ERROR: u32 = 6;
    pub const INTERNAL_ERROR: u32 = 13;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

// ============================================================================
// Execution Client
// ============================================================================

/// Transport seam for the execution service. The HTTP implementation is
/// used in production; tests substitute a scripted fake.
pub trait ExecutionClient {
    fn submit(&self, source_code: &str, language_id: u32)
        -> Result<SubmissionResponse, ExecClientError>;

    /// Health probe. Informs the UI affordance, not correctness.
    fn about(&self) -> Result<(), ExecClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecClientError {
    BuildClient { message: String },
    Http { message: String },
    HttpStatus { code: u16, message: String },
    DecodeResponse { message: String },
}

impl fmt::Display for ExecClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecClientError::BuildClient { message } => {
                write!(f, "client build failed: {message}")
            }
            ExecClientError::Http { message } => write!(f, "http request failed: {message}"),
            ExecClientError::HttpStatus { code, message } => {
                write!(f, "http status {code}: {message}")
            }
            ExecClientError::DecodeResponse { message } => {
                write!(f, "decode response failed: {message}")
            }
        }
    }
}

impl Error for ExecClientError {}

#[derive(Debug, Clone)]
pub struct HttpExecutionClient {
    base_url: String,
    base64_encoded: bool,
    client: Client,
}

impl HttpExecutionClient {
    pub fn from_config(config: &RemoteExecConfig) -> Result<Self, ExecClientError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|err| ExecClientError::BuildClient {
                message: err.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            base64_encoded: config.base64_encoded,
            client,
        })
    }

    fn decode_field(&self, field: Option<String>) -> Result<Option<String>, ExecClientError> {
        let Some(value) = field else {
            return Ok(None);
        };
        if !self.base64_encoded {
            return Ok(Some(value));
        }
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|err| ExecClientError::DecodeResponse {
                message: err.to_string(),
            })?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|err| ExecClientError::DecodeResponse {
                message: err.to_string(),
            })
    }
}

impl ExecutionClient for HttpExecutionClient {
    fn submit(
        &self,
        source_code: &str,
        language_id: u32,
    ) -> Result<SubmissionResponse, ExecClientError> {
        let url = format!(
            "{}/submissions?base64_encoded={}&wait=true",
            self.base_url, self.base64_encoded
        );
        let encoded_source;
        let source_code = if self.base64_encoded {
            encoded_source = BASE64.encode(source_code.as_bytes());
            encoded_source.as_str()
        } else {
            source_code
        };
        let payload = SubmissionRequest {
            source_code,
            language_id,
        };

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .map_err(|err| ExecClientError::Http {
                message: err.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let message = response.text().unwrap_or_else(|_| "<no body>".to_string());
            return Err(ExecClientError::HttpStatus {
                code: status.as_u16(),
                message,
            });
        }

        let mut submission: SubmissionResponse =
            response
                .json()
                .map_err(|err| ExecClientError::DecodeResponse {
                    message: err.to_string(),
                })?;
        submission.stdout = self.decode_field(submission.stdout)?;
        submission.stderr = self.decode_field(submission.stderr)?;
        Ok(submission)
    }

    fn about(&self) -> Result<(), ExecClientError> {
        let url = format!("{}/about", self.base_url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ExecClientError::Http {
                message: err.to_string(),
            })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ExecClientError::HttpStatus {
                code: status.as_u16(),
                message: "health probe failed".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Remote Executor
// ============================================================================

/// The source front end: executes learner source remotely and re-parses the
/// emitted action events into a trace.
#[derive(Debug)]
pub struct RemoteExecutor<C: ExecutionClient> {
    client: C,
}

impl<C: ExecutionClient> RemoteExecutor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether the remote service answers its health probe right now.
    pub fn probe(&self) -> bool {
        self.client.about().is_ok()
    }

    /// Execute learner source against the remote service.
    ///
    /// The trace is parsed from stdout in printed order. A clean exit with
    /// output on stderr is a runtime failure that still carries the parsed
    /// partial trace. Transport failures are `SandboxUnavailable`; a
    /// submission the service could not finish in time is `Timeout`.
    pub fn execute(
        &self,
        source_code: &str,
        language_id: u32,
        start: &WorldState,
    ) -> Result<ProgramTrace, Diagnostic> {
        if language_id != PYTHON_LANGUAGE_ID {
            return Err(Diagnostic::compile(format!(
                "unsupported language id {language_id}, expected {PYTHON_LANGUAGE_ID}"
            )));
        }

        let submission = self
            .client
            .submit(source_code, language_id)
            .map_err(|err| Diagnostic::unavailable(err.to_string()))?;

        tracing::debug!(
            status = submission.status.id,
            description = submission.status.description.as_str(),
            "remote submission finished"
        );

        match submission.status.id {
            status_id::ACCEPTED => {
                let stdout = submission.stdout.as_deref().unwrap_or("");
                let trace = parse_action_events(stdout, start)?;
                match submission.stderr.as_deref() {
                    Some(stderr) if !stderr.trim().is_empty() => Err(runtime_with_location(
                        format!("program wrote to stderr: {}", stderr.trim()),
                        stderr,
                        trace,
                    )),
                    _ => Ok(trace),
                }
            }
            status_id::IN_QUEUE | status_id::PROCESSING | status_id::TIME_LIMIT_EXCEEDED => {
                Err(Diagnostic::timeout(format!(
                    "remote execution did not complete: {}",
                    describe_status(&submission.status)
                )))
            }
            status_id::COMPILATION_ERROR => {
                let stderr = submission.stderr.unwrap_or_default();
                let mut diagnostic = Diagnostic::compile(format!(
                    "remote compilation failed: {}",
                    first_meaningful_line(&stderr).unwrap_or("no compiler output")
                ));
                diagnostic.location = parse_error_location(&stderr);
                Err(diagnostic)
            }
            status_id::INTERNAL_ERROR => Err(Diagnostic::unavailable(format!(
                "execution service internal error: {}",
                describe_status(&submission.status)
            ))),
            _ => {
                // Every remaining status id is a runtime failure class
                // (signalled, non-zero exit, output mismatch variants).
                let stdout = submission.stdout.as_deref().unwrap_or("");
                let trace = parse_action_events(stdout, start)?;
                let stderr = submission.stderr.unwrap_or_default();
                Err(runtime_with_location(
                    format!(
                        "remote execution failed ({}): {}",
                        describe_status(&submission.status),
                        first_meaningful_line(&stderr).unwrap_or("no error output")
                    ),
                    &stderr,
                    trace,
                ))
            }
        }
    }
}

fn describe_status(status: &SubmissionStatus) -> String {
    if status.description.is_empty() {
        format!("status {}", status.id)
    } else {
        status.description.clone()
    }
}

fn first_meaningful_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

fn runtime_with_location(message: String, stderr: &str, partial: ProgramTrace) -> Diagnostic {
    let mut diagnostic = Diagnostic::runtime(message, partial);
    diagnostic.location = parse_error_location(stderr);
    diagnostic
}

/// Best-effort extraction of `line N` from interpreter error output.
fn parse_error_location(stderr: &str) -> Option<super::diagnostic::SourceLocation> {
    for line in stderr.lines().rev() {
        if let Some(rest) = line.split(", line ").nth(1) {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(line) = digits.parse::<u32>() {
                return Some(super::diagnostic::SourceLocation { line, column: 1 });
            }
        }
    }
    None
}

// ============================================================================
// Action-Event Parsing
// ============================================================================

/// Map the action-event lines a remote program printed back into a trace.
///
/// Each recognized line is `@cq <primitive> <args...>`; integer tokens
/// become int arguments, a token starting with `"` consumes the rest of the
/// line as one JSON-encoded string, and anything else is a bare text
/// argument. Unrecognized lines are inert. A rejected primitive aborts with
/// a runtime diagnostic carrying the trace parsed so far.
pub fn parse_action_events(stdout: &str, start: &WorldState) -> Result<ProgramTrace, Diagnostic> {
    let mut recorder = TraceRecorder::new(start);
    let mut ignored: usize = 0;

    for line in stdout.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix(ACTION_EVENT_PREFIX) else {
            if !line.trim().is_empty() {
                ignored += 1;
            }
            continue;
        };
        let rest = rest.trim();
        let Some((primitive, raw_args)) = split_event(rest) else {
            ignored += 1;
            continue;
        };
        let args = match parse_event_args(raw_args) {
            Some(args) => args,
            None => {
                ignored += 1;
                continue;
            }
        };
        if let Err(err) = recorder.call(primitive, &args) {
            return Err(Diagnostic::runtime(err.to_string(), recorder.partial()));
        }
    }

    if ignored > 0 {
        tracing::debug!(ignored, "ignored non-action output lines");
    }
    Ok(recorder.finish())
}

fn split_event(rest: &str) -> Option<(&str, &str)> {
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((primitive, raw_args)) => Some((primitive, raw_args.trim_start())),
        None => Some((rest, "")),
    }
}

fn parse_event_args(mut raw: &str) -> Option<Vec<CallArg>> {
    let mut args = Vec::new();
    loop {
        raw = raw.trim_start();
        if raw.is_empty() {
            return Some(args);
        }
        if raw.starts_with('"') {
            // A quoted token is one JSON string spanning the rest of the
            // line; only trailing text arguments are ever quoted.
            let text: String = serde_json::from_str(raw.trim_end()).ok()?;
            args.push(CallArg::Text(text));
            return Some(args);
        }
        let token = match raw.split_once(char::is_whitespace) {
            Some((token, tail)) => {
                raw = tail;
                token
            }
            None => {
                let token = raw;
                raw = "";
                token
            }
        };
        match token.parse::<i64>() {
            Ok(value) => args.push(CallArg::Int(value)),
            Err(_) => args.push(CallArg::Text(token.to_string())),
        }
    }
}
