//! NIP-90 job model.
//!
//! On-demand computation over the relay network: a customer publishes a job
//! request (kind 5000-5999), the service provider streams feedback (kind
//! 7000) and finally publishes a result whose kind is the request kind plus
//! 1000.

use crate::error::ProtoError;
use crate::event::EventTemplate;

/// Lowest job request kind.
pub const JOB_REQUEST_KIND_MIN: u16 = 5000;
/// Highest job request kind.
pub const JOB_REQUEST_KIND_MAX: u16 = 5999;
/// Lowest job result kind.
pub const JOB_RESULT_KIND_MIN: u16 = 6000;
/// Highest job result kind.
pub const JOB_RESULT_KIND_MAX: u16 = 6999;
/// Job feedback: out-of-band status updates.
pub const KIND_JOB_FEEDBACK: u16 = 7000;
/// RAG retrieval over a document set.
pub const KIND_JOB_RAG: u16 = 5003;

/// Whether `kind` is in the job request range.
pub const fn is_job_request_kind(kind: u16) -> bool {
    kind >= JOB_REQUEST_KIND_MIN && kind <= JOB_REQUEST_KIND_MAX
}

/// Whether `kind` is in the job result range.
pub const fn is_job_result_kind(kind: u16) -> bool {
    kind >= JOB_RESULT_KIND_MIN && kind <= JOB_RESULT_KIND_MAX
}

/// Whether `kind` is the feedback kind.
pub const fn is_job_feedback_kind(kind: u16) -> bool {
    kind == KIND_JOB_FEEDBACK
}

/// The result kind paired with a request kind.
pub fn result_kind_for(request_kind: u16) -> Result<u16, ProtoError> {
    if !is_job_request_kind(request_kind) {
        return Err(ProtoError::NotARequestKind(request_kind));
    }
    Ok(request_kind + 1000)
}

/// Status values carried by feedback events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Progress line from the provider.
    Log,
    /// Remote-side failure; the job may still complete.
    Error,
    /// Terminal: the paired result event is available.
    Success,
}

impl JobStatus {
    /// Parse a `status` tag value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "log" => Some(Self::Log),
            "error" => Some(Self::Error),
            "success" => Some(Self::Success),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

/// An input reference carried in an `i` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInput {
    pub value: String,
    pub input_type: String,
    pub relay: String,
    pub marker: String,
}

impl JobInput {
    /// A URL input.
    pub fn url(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            input_type: "url".into(),
            relay: String::new(),
            marker: String::new(),
        }
    }

    /// A direct text input.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            input_type: "text".into(),
            relay: String::new(),
            marker: String::new(),
        }
    }

    /// Tag the input with a marker (e.g. `passage`, `query`).
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// The full `i` tag for this input.
    pub fn to_tag(&self) -> Vec<String> {
        vec![
            "i".into(),
            self.value.clone(),
            self.input_type.clone(),
            self.relay.clone(),
            self.marker.clone(),
        ]
    }
}

/// Builder for a job request event.
#[derive(Debug, Clone)]
pub struct JobRequest {
    kind: u16,
    params: Vec<(String, String)>,
    inputs: Vec<JobInput>,
    expiration: Option<u64>,
}

impl JobRequest {
    /// Start a request of the given kind.
    pub fn new(kind: u16) -> Result<Self, ProtoError> {
        if !is_job_request_kind(kind) {
            return Err(ProtoError::NotARequestKind(kind));
        }
        Ok(Self {
            kind,
            params: Vec::new(),
            inputs: Vec::new(),
            expiration: None,
        })
    }

    pub const fn kind(&self) -> u16 {
        self.kind
    }

    /// Add a `param` key/value.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add an input.
    pub fn input(mut self, input: JobInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Set an absolute expiration timestamp (unix seconds).
    pub const fn expires_at(mut self, unix_seconds: u64) -> Self {
        self.expiration = Some(unix_seconds);
        self
    }

    pub const fn expiration(&self) -> Option<u64> {
        self.expiration
    }

    /// The `param` and `i` tags, in insertion order.
    ///
    /// These are the fields the envelope codec seals when a provider is
    /// designated, so they are exposed separately from the full tag set.
    pub fn payload_tags(&self) -> Vec<Vec<String>> {
        let mut tags: Vec<Vec<String>> = self
            .params
            .iter()
            .map(|(k, v)| vec!["param".into(), k.clone(), v.clone()])
            .collect();
        tags.extend(self.inputs.iter().map(JobInput::to_tag));
        tags
    }

    /// Build the unsigned event: payload tags plus the expiration tag.
    pub fn to_template(&self) -> EventTemplate {
        let mut tags = self.payload_tags();
        if let Some(expiration) = self.expiration {
            tags.push(vec!["expiration".into(), expiration.to_string()]);
        }
        EventTemplate::new(self.kind, tags, "")
    }

    /// Build the unsigned event for an encrypted request: the payload tags are
    /// replaced by the sealed payload in the content, plus `p` and `encrypted`
    /// markers so the provider knows whose key to use and that decryption is
    /// expected.
    pub fn to_sealed_template(&self, sealed_payload: String, provider_hex: &str) -> EventTemplate {
        let mut tags = vec![
            vec!["p".into(), provider_hex.into()],
            vec!["encrypted".into()],
        ];
        if let Some(expiration) = self.expiration {
            tags.push(vec!["expiration".into(), expiration.to_string()]);
        }
        EventTemplate::new(self.kind, tags, sealed_payload)
    }
}
