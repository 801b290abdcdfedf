//! Per-version envelope schema registry.
//!
//! Validation is strict and synchronous: unknown fields are rejected at the
//! top level and inside content objects, every violation is reported with its
//! field path, and an unrecognized version fails hard rather than being
//! silently accepted.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::envelope::MessageEnvelope;

/// MIME types accepted for FILE content.
const ALLOWED_FILE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/plain",
    "application/json",
];

const TOP_LEVEL_FIELDS: &[&str] = &[
    "threadId",
    "contentType",
    "version",
    "content",
    "timestamp",
    "metadata",
];

fn percentage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-9][0-9]*$").unwrap())
}

fn data_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^data:[A-Za-z0-9.+-]+/[A-Za-z0-9.+-]+(;[A-Za-z0-9-]+=[^;,]*)*(;base64)?,")
            .unwrap()
    })
}

/// One structural or semantic failure, qualified by field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// All violations found in one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub violations: Vec<SchemaViolation>,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for SchemaError {}

type KindValidator = fn(&Value, &mut Vec<SchemaViolation>);

/// Validator table keyed by (version, content kind).
pub struct SchemaRegistry {
    versions: HashMap<&'static str, HashMap<&'static str, KindValidator>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        let mut kinds: HashMap<&'static str, KindValidator> = HashMap::new();
        kinds.insert("STRING", validate_string_v1);
        kinds.insert("FILE", validate_file_v1);
        kinds.insert("PROPOSAL", validate_proposal_v1);
        kinds.insert("COUNTER_PROPOSAL", validate_proposal_v1);
        kinds.insert("ACCEPT_PROPOSAL", validate_accept_v1);
        kinds.insert("ESCALATE_DISPUTE", validate_escalate_v1);

        let mut versions = HashMap::new();
        versions.insert("0.0.1", kinds);
        Self { versions }
    }

    /// Strict validation of a raw envelope payload.
    pub fn validate(&self, payload: &Value) -> Result<(), SchemaError> {
        let mut out = Vec::new();
        self.collect(payload, &mut out);
        if out.is_empty() {
            Ok(())
        } else {
            Err(SchemaError { violations: out })
        }
    }

    /// Non-throwing form of [`validate`](Self::validate).
    pub fn is_valid(&self, payload: &Value) -> bool {
        self.validate(payload).is_ok()
    }

    /// Validate an already-typed envelope through its wire representation.
    pub fn validate_envelope(&self, envelope: &MessageEnvelope) -> Result<(), SchemaError> {
        let payload = serde_json::to_value(envelope).map_err(|e| SchemaError {
            violations: vec![SchemaViolation::new("$", e.to_string())],
        })?;
        self.validate(&payload)
    }

    fn collect(&self, payload: &Value, out: &mut Vec<SchemaViolation>) {
        let Some(obj) = payload.as_object() else {
            out.push(SchemaViolation::new("$", "envelope must be a JSON object"));
            return;
        };

        reject_unknown_fields(obj, TOP_LEVEL_FIELDS, "$", out);
        validate_thread_id(obj.get("threadId"), out);

        if let Some(timestamp) = obj.get("timestamp") {
            if !timestamp.is_i64() && !timestamp.is_u64() {
                out.push(SchemaViolation::new("timestamp", "must be an integer"));
            }
        }
        if let Some(metadata) = obj.get("metadata") {
            if !metadata.is_object() {
                out.push(SchemaViolation::new("metadata", "must be an object"));
            }
        }

        // Version dispatch gates content validation: an unknown version fails
        // hard and nothing downstream runs.
        let version = match obj.get("version") {
            Some(Value::String(v)) => v.as_str(),
            Some(_) => {
                out.push(SchemaViolation::new("version", "must be a string"));
                return;
            }
            None => {
                out.push(SchemaViolation::new("version", "is required"));
                return;
            }
        };
        let Some(kinds) = self.versions.get(version) else {
            out.push(SchemaViolation::new(
                "version",
                format!("Unsupported message version={version}"),
            ));
            return;
        };

        let kind = match obj.get("contentType") {
            Some(Value::String(k)) => k.as_str(),
            Some(_) => {
                out.push(SchemaViolation::new("contentType", "must be a string"));
                return;
            }
            None => {
                out.push(SchemaViolation::new("contentType", "is required"));
                return;
            }
        };
        let Some(validator) = kinds.get(kind) else {
            out.push(SchemaViolation::new(
                "contentType",
                format!("unknown content type '{kind}' for version={version}"),
            ));
            return;
        };

        match obj.get("content") {
            Some(content) => validator(content, out),
            None => out.push(SchemaViolation::new("content", "is required")),
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn reject_unknown_fields(
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            out.push(SchemaViolation::new(
                format!("{path}.{key}"),
                "unknown field",
            ));
        }
    }
}

fn validate_thread_id(value: Option<&Value>, out: &mut Vec<SchemaViolation>) {
    let Some(value) = value else {
        out.push(SchemaViolation::new("threadId", "is required"));
        return;
    };
    let Some(obj) = value.as_object() else {
        out.push(SchemaViolation::new("threadId", "must be an object"));
        return;
    };
    reject_unknown_fields(obj, &["exchangeId", "buyerId", "sellerId"], "threadId", out);
    for field in ["exchangeId", "buyerId", "sellerId"] {
        require_non_empty_string(obj, field, "threadId", out);
    }
}

/// Require `obj[field]` to be a non-empty string; record a violation otherwise.
fn require_non_empty_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    match obj.get(field) {
        Some(Value::String(s)) if !s.is_empty() => {}
        Some(Value::String(_)) => {
            out.push(SchemaViolation::new(
                format!("{path}.{field}"),
                "must be a non-empty string",
            ));
        }
        Some(_) => {
            out.push(SchemaViolation::new(
                format!("{path}.{field}"),
                "must be a string",
            ));
        }
        None => {
            out.push(SchemaViolation::new(
                format!("{path}.{field}"),
                "is required",
            ));
        }
    }
}

/// Unwrap the `{value: ...}` wrapper every content kind shares.
fn content_value<'a>(
    content: &'a Value,
    out: &mut Vec<SchemaViolation>,
) -> Option<&'a Value> {
    let Some(obj) = content.as_object() else {
        out.push(SchemaViolation::new("content", "must be an object"));
        return None;
    };
    reject_unknown_fields(obj, &["value"], "content", out);
    match obj.get("value") {
        Some(value) => Some(value),
        None => {
            out.push(SchemaViolation::new("content.value", "is required"));
            None
        }
    }
}

fn validate_string_v1(content: &Value, out: &mut Vec<SchemaViolation>) {
    let Some(obj) = content.as_object() else {
        out.push(SchemaViolation::new("content", "must be an object"));
        return;
    };
    reject_unknown_fields(obj, &["value"], "content", out);
    require_non_empty_string(obj, "value", "content", out);
}

fn validate_file_v1(content: &Value, out: &mut Vec<SchemaViolation>) {
    let Some(value) = content_value(content, out) else {
        return;
    };
    let Some(file) = value.as_object() else {
        out.push(SchemaViolation::new("content.value", "must be an object"));
        return;
    };
    reject_unknown_fields(
        file,
        &["fileName", "fileType", "fileSize", "encodedContent"],
        "content.value",
        out,
    );
    require_non_empty_string(file, "fileName", "content.value", out);

    match file.get("fileType") {
        Some(Value::String(mime)) if ALLOWED_FILE_TYPES.contains(&mime.as_str()) => {}
        Some(Value::String(mime)) => out.push(SchemaViolation::new(
            "content.value.fileType",
            format!("'{mime}' is not an allowed file type"),
        )),
        Some(_) => out.push(SchemaViolation::new(
            "content.value.fileType",
            "must be a string",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.fileType",
            "is required",
        )),
    }

    match file.get("fileSize") {
        Some(size) if size.as_u64().is_some_and(|n| n > 0) => {}
        Some(_) => out.push(SchemaViolation::new(
            "content.value.fileSize",
            "must be a positive integer",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.fileSize",
            "is required",
        )),
    }

    match file.get("encodedContent") {
        Some(Value::String(data)) if data_url_re().is_match(data) => {}
        Some(Value::String(_)) => out.push(SchemaViolation::new(
            "content.value.encodedContent",
            "must be a valid data URL",
        )),
        Some(_) => out.push(SchemaViolation::new(
            "content.value.encodedContent",
            "must be a string",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.encodedContent",
            "is required",
        )),
    }
}

fn validate_proposal_v1(content: &Value, out: &mut Vec<SchemaViolation>) {
    let Some(value) = content_value(content, out) else {
        return;
    };
    let Some(details) = value.as_object() else {
        out.push(SchemaViolation::new("content.value", "must be an object"));
        return;
    };
    reject_unknown_fields(
        details,
        &["title", "description", "disputeContext", "proposals"],
        "content.value",
        out,
    );
    require_non_empty_string(details, "title", "content.value", out);
    require_non_empty_string(details, "description", "content.value", out);

    match details.get("disputeContext") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                if !item.is_string() {
                    out.push(SchemaViolation::new(
                        format!("content.value.disputeContext[{i}]"),
                        "must be a string",
                    ));
                }
            }
        }
        Some(_) => out.push(SchemaViolation::new(
            "content.value.disputeContext",
            "must be an array of strings",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.disputeContext",
            "is required",
        )),
    }

    match details.get("proposals") {
        Some(Value::Array(items)) if !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                validate_proposal_item(item, &format!("content.value.proposals[{i}]"), out);
            }
        }
        Some(Value::Array(_)) => out.push(SchemaViolation::new(
            "content.value.proposals",
            "must contain at least one proposal",
        )),
        Some(_) => out.push(SchemaViolation::new(
            "content.value.proposals",
            "must be an array",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.proposals",
            "is required",
        )),
    }
}

fn validate_proposal_item(item: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let Some(obj) = item.as_object() else {
        out.push(SchemaViolation::new(path, "must be an object"));
        return;
    };
    reject_unknown_fields(obj, &["type", "percentageAmount", "signature"], path, out);
    require_non_empty_string(obj, "type", path, out);
    require_non_empty_string(obj, "signature", path, out);

    match obj.get("percentageAmount") {
        Some(Value::String(amount)) if percentage_re().is_match(amount) => {}
        Some(Value::String(_)) => out.push(SchemaViolation::new(
            format!("{path}.percentageAmount"),
            "must be a positive integer with no leading zeros or decimals",
        )),
        Some(_) => out.push(SchemaViolation::new(
            format!("{path}.percentageAmount"),
            "must be a string holding a positive integer",
        )),
        None => out.push(SchemaViolation::new(
            format!("{path}.percentageAmount"),
            "is required",
        )),
    }
}

fn validate_accept_v1(content: &Value, out: &mut Vec<SchemaViolation>) {
    let Some(value) = content_value(content, out) else {
        return;
    };
    let Some(details) = value.as_object() else {
        out.push(SchemaViolation::new("content.value", "must be an object"));
        return;
    };
    reject_unknown_fields(
        details,
        &["title", "proposal", "icon", "heading", "body"],
        "content.value",
        out,
    );
    for field in ["title", "icon", "heading", "body"] {
        require_non_empty_string(details, field, "content.value", out);
    }
    match details.get("proposal") {
        Some(item) => validate_proposal_item(item, "content.value.proposal", out),
        None => out.push(SchemaViolation::new(
            "content.value.proposal",
            "is required",
        )),
    }
}

fn validate_escalate_v1(content: &Value, out: &mut Vec<SchemaViolation>) {
    let Some(value) = content_value(content, out) else {
        return;
    };
    let Some(details) = value.as_object() else {
        out.push(SchemaViolation::new("content.value", "must be an object"));
        return;
    };
    reject_unknown_fields(
        details,
        &[
            "title",
            "description",
            "disputeResolverInfo",
            "icon",
            "heading",
            "body",
        ],
        "content.value",
        out,
    );
    for field in ["title", "description", "icon", "heading", "body"] {
        require_non_empty_string(details, field, "content.value", out);
    }
    match details.get("disputeResolverInfo") {
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                let path = format!("content.value.disputeResolverInfo[{i}]");
                let Some(obj) = item.as_object() else {
                    out.push(SchemaViolation::new(path, "must be an object"));
                    continue;
                };
                reject_unknown_fields(obj, &["label", "value"], &path, out);
                require_non_empty_string(obj, "label", &path, out);
                require_non_empty_string(obj, "value", &path, out);
            }
        }
        Some(_) => out.push(SchemaViolation::new(
            "content.value.disputeResolverInfo",
            "must be an array",
        )),
        None => out.push(SchemaViolation::new(
            "content.value.disputeResolverInfo",
            "is required",
        )),
    }
}
