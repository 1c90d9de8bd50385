//! Common executor trait and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// Language kinds the engine can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LanguageKind {
    /// Plain Python on the public slim image
    Python,
    /// Python on the locally built image with plotting libraries
    #[serde(alias = "python-chart")]
    PythonWithCharts,
    /// Node.js
    Node,
}

impl LanguageKind {
    /// All language kinds, in table order
    pub const ALL: [LanguageKind; 3] = [
        LanguageKind::Python,
        LanguageKind::PythonWithCharts,
        LanguageKind::Node,
    ];

    /// File name the source is written to inside the input directory
    pub fn source_filename(&self) -> &'static str {
        match self {
            LanguageKind::Python | LanguageKind::PythonWithCharts => "main.py",
            LanguageKind::Node => "main.js",
        }
    }
}

impl std::str::FromStr for LanguageKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(LanguageKind::Python),
            "python-with-charts" | "python-chart" | "chart" => Ok(LanguageKind::PythonWithCharts),
            "node" | "javascript" | "js" => Ok(LanguageKind::Node),
            _ => Err(Error::InvalidInput(format!(
                "Unsupported language: {}. Supported: python, python-with-charts, node",
                s
            ))),
        }
    }
}

impl std::fmt::Display for LanguageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LanguageKind::Python => write!(f, "python"),
            LanguageKind::PythonWithCharts => write!(f, "python-with-charts"),
            LanguageKind::Node => write!(f, "node"),
        }
    }
}

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// The source to execute
    pub source_code: String,
    /// Which runtime to execute it with
    pub language_kind: LanguageKind,
}

impl ExecutionRequest {
    /// Create a new execution request
    pub fn new(source_code: impl Into<String>, language_kind: LanguageKind) -> Self {
        ExecutionRequest {
            source_code: source_code.into(),
            language_kind,
        }
    }
}

/// How an output file's content is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeKind {
    /// Base64-encoded binary image
    Image,
    /// UTF-8 text
    Text,
}

/// A file produced by the executed code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: String,
    pub content: String,
    /// MIME type, e.g. `image/png` or `text/plain`
    #[serde(rename = "type")]
    pub mime_type: String,
    pub kind: MimeKind,
}

/// Result of code execution
///
/// Every field is populated on every path; failures carry empty output and
/// files rather than a missing record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// True if and only if the container exited with status zero
    pub success: bool,
    /// Captured standard output
    pub output: String,
    /// Human-readable failure description
    pub error: Option<String>,
    /// Failure class, when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Collected artifacts
    pub files: Vec<OutputFile>,
    /// Elapsed wall-clock time in milliseconds
    #[serde(rename = "executionTime")]
    pub execution_time_millis: u64,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(output: String, files: Vec<OutputFile>, elapsed: Duration) -> Self {
        ExecutionResult {
            success: true,
            output,
            error: None,
            error_kind: None,
            files,
            execution_time_millis: elapsed.as_millis() as u64,
        }
    }

    /// Create a failure result from an engine error
    pub fn failure(error: &Error, elapsed: Duration) -> Self {
        ExecutionResult {
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            files: Vec::new(),
            execution_time_millis: elapsed.as_millis() as u64,
        }
    }

    /// Keep partial output and artifacts on a failure result
    pub fn with_partial(mut self, output: String, files: Vec<OutputFile>) -> Self {
        self.output = output;
        self.files = files;
        self
    }

    /// Replace the error message while keeping the failure class
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

/// Trait for code execution backends
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Get the executor name
    fn name(&self) -> &str;

    /// Check if a language is supported
    fn supports_language(&self, language: LanguageKind) -> bool;

    /// Execute code. Expected sandbox failures are reported in the result.
    async fn execute(&self, request: ExecutionRequest) -> ExecutionResult;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<LanguageKind> {
        LanguageKind::ALL
            .into_iter()
            .filter(|l| self.supports_language(*l))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("python".parse::<LanguageKind>().unwrap(), LanguageKind::Python);
        assert_eq!("py".parse::<LanguageKind>().unwrap(), LanguageKind::Python);
        assert_eq!(
            "python-chart".parse::<LanguageKind>().unwrap(),
            LanguageKind::PythonWithCharts
        );
        assert_eq!("JS".parse::<LanguageKind>().unwrap(), LanguageKind::Node);
        assert!("ruby".parse::<LanguageKind>().is_err());
    }

    #[test]
    fn test_language_serde_names() {
        let kind: LanguageKind = serde_json::from_str("\"python-chart\"").unwrap();
        assert_eq!(kind, LanguageKind::PythonWithCharts);
        assert_eq!(
            serde_json::to_string(&LanguageKind::PythonWithCharts).unwrap(),
            "\"python-with-charts\""
        );
    }

    #[test]
    fn test_source_filenames() {
        assert_eq!(LanguageKind::Python.source_filename(), "main.py");
        assert_eq!(LanguageKind::PythonWithCharts.source_filename(), "main.py");
        assert_eq!(LanguageKind::Node.source_filename(), "main.js");
    }

    #[test]
    fn test_failure_result_shape() {
        let result = ExecutionResult::failure(
            &Error::ExecutionTimeout(30_000),
            Duration::from_millis(30_012),
        );
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert!(result.files.is_empty());
        assert_eq!(result.error_kind, Some(ErrorKind::ExecutionTimeout));
        assert_eq!(result.execution_time_millis, 30_012);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["executionTime"], 30_012);
        assert_eq!(json["errorKind"], "executionTimeout");
        assert_eq!(json["files"], serde_json::json!([]));
    }

    #[test]
    fn test_success_result_omits_error_kind() {
        let result = ExecutionResult::success("hi".into(), Vec::new(), Duration::from_millis(5));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error"], serde_json::Value::Null);
        assert!(json.get("errorKind").is_none());
    }
}
