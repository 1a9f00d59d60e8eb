use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

/// The scene document is not valid YAML or does not match the schema.
pub const SCENE_PARSE: &str = "SCENE_PARSE";
/// The scene parsed but a value is out of range or inconsistent.
pub const SCENE_INVALID: &str = "SCENE_INVALID";
/// A color reference is neither `#rrggbb` nor a palette name.
pub const SCENE_UNKNOWN_COLOR: &str = "SCENE_UNKNOWN_COLOR";
/// The scene has no beats, so it would produce no frames.
pub const SCENE_EMPTY: &str = "SCENE_EMPTY";
/// Anything that reached the CLI without a code of its own.
pub const INTERNAL: &str = "INTERNAL";

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl CodedError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Envelope for any error: the innermost coded error if there is one,
/// otherwise `INTERNAL` with the full context chain as the message.
pub fn envelope_for(error: &Error) -> ErrorEnvelope {
    match find_coded_error(error) {
        Some(coded) => {
            let mut envelope = coded.envelope();
            let outer = format!("{error:#}");
            if outer != coded.to_string() {
                envelope.error.details.get_or_insert_with(|| Value::String(outer));
            }
            envelope
        }
        None => CodedError::new(INTERNAL, format!("{error:#}")).envelope(),
    }
}
