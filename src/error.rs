//! Pipeline error types
//!
//! Every stage of the transformation pipeline reports failures through
//! [`TransformError`]. Errors propagate to the orchestrator unmodified; the
//! only places that swallow a failure are the content-type guards of the
//! post-processors and the animated GIF → WebP encode fallback.

use std::fmt;

use crate::store::StoreError;

/// Why a single loader declined a source id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderFailure {
    /// Configured name of the loader
    pub loader: String,
    /// Failure message reported by the loader
    pub message: String,
}

impl fmt::Display for LoaderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=[{}]", self.loader, self.message)
    }
}

/// Errors that can occur while resolving, transforming or storing an image
#[derive(Debug)]
pub enum TransformError {
    // === Source resolution ===
    /// Every configured loader failed to resolve the source id
    SourceNotResolvable {
        source_id: String,
        loaders: Vec<String>,
        failures: Vec<LoaderFailure>,
    },

    // === Stack configuration ===
    /// No stack is configured under this name
    StackNotFound { stack: String },
    /// The stack references filters or post-processors missing from the registries
    UnknownFilterOrPostProcessor {
        filters: Vec<String>,
        post_processors: Vec<String>,
    },
    /// A filter or post-processor option is missing or malformed
    InvalidOption {
        component: String,
        option: String,
        message: String,
    },

    // === Pixel pipeline ===
    /// The source payload could not be decoded
    DecodeFailed { message: String },
    /// A filter failed while transforming the decoded image
    FilterFailed { filter: String, message: String },
    /// Encoding to the target format failed
    EncodeFailed { format: String, message: String },
    /// The format string does not name a supported format
    UnsupportedFormat { format: String },

    // === Post-processing ===
    /// An external optimizer exited unsuccessfully or timed out
    ExternalProcessFailed { tool: String, reason: String },

    // === Orchestration ===
    /// `warmup_cache` was called without any stack names
    NoStacksSpecified,
    /// The image store failed
    Store(StoreError),
    /// A worker task panicked or was cancelled
    Internal(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::SourceNotResolvable {
                source_id,
                loaders,
                failures,
            } => {
                let failures = failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "Source image not resolvable \"{}\" using \"{}\" {} loaders (internal exceptions: {})",
                    source_id,
                    loaders.join(", "),
                    loaders.len(),
                    failures
                )
            }
            TransformError::StackNotFound { stack } => {
                write!(f, "Stack \"{}\" is not configured", stack)
            }
            TransformError::UnknownFilterOrPostProcessor {
                filters,
                post_processors,
            } => {
                let mut parts = Vec::new();
                if !filters.is_empty() {
                    parts.push(format!("Could not find filter(s): {}", quote_all(filters)));
                }
                if !post_processors.is_empty() {
                    parts.push(format!(
                        "Could not find post processor(s): {}",
                        quote_all(post_processors)
                    ));
                }
                write!(f, "{}", parts.join("; "))
            }
            TransformError::InvalidOption {
                component,
                option,
                message,
            } => {
                write!(f, "Invalid option '{}' for {}: {}", option, component, message)
            }
            TransformError::DecodeFailed { message } => {
                write!(f, "Failed to decode image: {}", message)
            }
            TransformError::FilterFailed { filter, message } => {
                write!(f, "Filter '{}' failed: {}", filter, message)
            }
            TransformError::EncodeFailed { format, message } => {
                write!(f, "Failed to encode to {}: {}", format, message)
            }
            TransformError::UnsupportedFormat { format } => {
                write!(f, "Unsupported image format: {}", format)
            }
            TransformError::ExternalProcessFailed { tool, reason } => {
                write!(f, "External process '{}' failed: {}", tool, reason)
            }
            TransformError::NoStacksSpecified => {
                write!(
                    f,
                    "No stacks specified: warming up every configured stack is not supported"
                )
            }
            TransformError::Store(err) => write!(f, "Image store error: {}", err),
            TransformError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransformError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TransformError {
    fn from(err: StoreError) -> Self {
        TransformError::Store(err)
    }
}

fn quote_all(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl TransformError {
    /// Maps pipeline errors to HTTP status codes for an outer HTTP layer
    ///
    /// Status mapping:
    /// - SourceNotResolvable, StackNotFound → 404
    /// - InvalidOption, UnsupportedFormat, NoStacksSpecified, DecodeFailed → 400
    /// - ExternalProcessFailed (timeout) → 504
    /// - everything else → 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            TransformError::SourceNotResolvable { .. } | TransformError::StackNotFound { .. } => {
                404
            }

            TransformError::InvalidOption { .. }
            | TransformError::UnsupportedFormat { .. }
            | TransformError::NoStacksSpecified
            | TransformError::DecodeFailed { .. } => 400,

            TransformError::ExternalProcessFailed { reason, .. }
                if reason.starts_with("timed out") =>
            {
                504
            }

            TransformError::UnknownFilterOrPostProcessor { .. }
            | TransformError::FilterFailed { .. }
            | TransformError::EncodeFailed { .. }
            | TransformError::ExternalProcessFailed { .. }
            | TransformError::Store(_)
            | TransformError::Internal(_) => 500,
        }
    }

    /// Short, stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::SourceNotResolvable { .. } => "source_not_resolvable",
            TransformError::StackNotFound { .. } => "stack_not_found",
            TransformError::UnknownFilterOrPostProcessor { .. } => "unknown_filter",
            TransformError::InvalidOption { .. } => "invalid_option",
            TransformError::DecodeFailed { .. } => "decode_failed",
            TransformError::FilterFailed { .. } => "filter_failed",
            TransformError::EncodeFailed { .. } => "encode_failed",
            TransformError::UnsupportedFormat { .. } => "unsupported_format",
            TransformError::ExternalProcessFailed { .. } => "external_process_failed",
            TransformError::NoStacksSpecified => "no_stacks_specified",
            TransformError::Store(_) => "store",
            TransformError::Internal(_) => "internal",
        }
    }

    pub fn stack_not_found(stack: impl Into<String>) -> Self {
        TransformError::StackNotFound {
            stack: stack.into(),
        }
    }

    pub fn decode_failed(message: impl Into<String>) -> Self {
        TransformError::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn filter_failed(filter: impl Into<String>, message: impl Into<String>) -> Self {
        TransformError::FilterFailed {
            filter: filter.into(),
            message: message.into(),
        }
    }

    pub fn encode_failed(format: impl Into<String>, message: impl Into<String>) -> Self {
        TransformError::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_format(format: impl Into<String>) -> Self {
        TransformError::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn invalid_option(
        component: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        TransformError::InvalidOption {
            component: component.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn external_process(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        TransformError::ExternalProcessFailed {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}
