//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` method
//! instead of string matching on Debug format.

use thiserror::Error;

/// AWS error categories surfaced to the operator.
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (e.g., an instance already terminated)
    #[error("Resource not found: {resource_id}")]
    NotFound { resource_id: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    Throttled,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::Throttled => {
                Some("AWS API rate limit hit. Wait a moment and re-run.")
            }
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_id: message,
        },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an error from an anyhow::Error by extracting the AWS error code.
///
/// Walks the error chain using `ProvideErrorMetadata` to extract `.code()`
/// and `.message()` from any EC2 SDK error the reaper issues. Falls back to
/// string matching on the Debug representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_ec2::error::ProvideErrorMetadata;

    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::describe_instances::DescribeInstancesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::terminate_instances::TerminateInstancesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::modify_instance_attribute::ModifyInstanceAttributeError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
    }

    // Fallback: extract error code from debug string representation
    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// All known AWS error codes for extraction from debug strings
const ALL_KNOWN_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidInstanceID.Malformed",
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "OperationNotPermitted",
    "UnauthorizedOperation",
];

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in ALL_KNOWN_CODES {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "OperationNotPermitted",
        "The instance may have termination protection enabled. \
         Set REAPER_IGNORE_TERMINATION_PROTECTION=true to override it.",
    ),
    (
        "UnauthorizedOperation",
        "The current credentials lack ec2:DescribeInstances, \
         ec2:TerminateInstances, or ec2:ModifyInstanceAttribute permissions.",
    ),
    (
        "Throttling",
        "AWS API rate limit hit. Wait a moment and re-run.",
    ),
    (
        "ThrottlingException",
        "AWS API rate limit hit. Wait a moment and re-run.",
    ),
    (
        "RequestLimitExceeded",
        "AWS API rate limit hit. Wait a moment and re-run.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS.iter().find(|(c, _)| *c == code).map(|(_, s)| *s)
}
