//! Webhook triggers, their data schemas and the envelope sent to subscribers.
//!
//! Event data arrives as loosely structured JSON from whichever part of the system raised
//! the event. Building an [`Envelope`] validates it against the typed schema for its
//! trigger and re-serializes it from those types, so field order (and therefore the signed
//! bytes) depends only on the event, never on how the caller assembled its JSON.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::WebhookError;

/// Envelope format version, always the first field of the serialized envelope.
pub const ENVELOPE_VERSION: &str = "2024-10-01";

/// Events subscribers can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookTrigger {
    #[serde(rename = "link.created")]
    LinkCreated,
    #[serde(rename = "link.updated")]
    LinkUpdated,
    #[serde(rename = "document.created")]
    DocumentCreated,
    #[serde(rename = "document.updated")]
    DocumentUpdated,
    #[serde(rename = "document.deleted")]
    DocumentDeleted,
    #[serde(rename = "dataroom.created")]
    DataroomCreated,
    #[serde(rename = "link.viewed")]
    LinkViewed,
    #[serde(rename = "document.viewed")]
    DocumentViewed,
    #[serde(rename = "dataroom.viewed")]
    DataroomViewed,
}

impl WebhookTrigger {
    pub const ALL: [WebhookTrigger; 9] = [
        Self::LinkCreated,
        Self::LinkUpdated,
        Self::DocumentCreated,
        Self::DocumentUpdated,
        Self::DocumentDeleted,
        Self::DataroomCreated,
        Self::LinkViewed,
        Self::DocumentViewed,
        Self::DataroomViewed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinkCreated => "link.created",
            Self::LinkUpdated => "link.updated",
            Self::DocumentCreated => "document.created",
            Self::DocumentUpdated => "document.updated",
            Self::DocumentDeleted => "document.deleted",
            Self::DataroomCreated => "dataroom.created",
            Self::LinkViewed => "link.viewed",
            Self::DocumentViewed => "document.viewed",
            Self::DataroomViewed => "dataroom.viewed",
        }
    }
}

impl std::fmt::Display for WebhookTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WebhookTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == s)
            .ok_or_else(|| format!("Unknown webhook trigger: {}", s))
    }
}

// --- Data schemas ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LinkInfo {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_password: bool,
    #[serde(default)]
    pub allow_download: bool,
    #[serde(default)]
    pub email_protected: bool,
    #[serde(default)]
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_pages: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DataroomInfo {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ViewInfo {
    pub id: String,
    pub viewed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_email: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// Data for `link.created` / `link.updated`. A link shares either a document or a dataroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEventData {
    pub link: LinkInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataroom: Option<DataroomInfo>,
}

/// Data for `document.created` / `document.updated` / `document.deleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentEventData {
    pub document: DocumentInfo,
}

/// Data for `dataroom.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataroomEventData {
    pub dataroom: DataroomInfo,
}

/// Data for the `*.viewed` triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewEventData {
    pub view: ViewInfo,
    pub link: LinkInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataroom: Option<DataroomInfo>,
}

/// Validated, normalized event data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Link(LinkEventData),
    Document(DocumentEventData),
    Dataroom(DataroomEventData),
    View(ViewEventData),
}

impl EventData {
    /// Validate raw event data against the schema of `trigger`.
    pub fn parse(trigger: WebhookTrigger, data: &Value) -> Result<Self, WebhookError> {
        use WebhookTrigger::*;

        let parsed = match trigger {
            LinkCreated | LinkUpdated => {
                let data: LinkEventData = parse_schema(trigger, data)?;
                if data.document.is_some() && data.dataroom.is_some() {
                    return Err(violation(trigger, "a link targets either a document or a dataroom, not both"));
                }
                EventData::Link(data)
            }
            DocumentCreated | DocumentUpdated | DocumentDeleted => EventData::Document(parse_schema(trigger, data)?),
            DataroomCreated => EventData::Dataroom(parse_schema(trigger, data)?),
            LinkViewed | DocumentViewed | DataroomViewed => {
                let data: ViewEventData = parse_schema(trigger, data)?;
                match trigger {
                    DocumentViewed if data.document.is_none() => {
                        return Err(violation(trigger, "missing field `document`"));
                    }
                    DataroomViewed if data.dataroom.is_none() => {
                        return Err(violation(trigger, "missing field `dataroom`"));
                    }
                    _ if data.document.is_some() && data.dataroom.is_some() => {
                        return Err(violation(trigger, "a view targets either a document or a dataroom, not both"));
                    }
                    _ => {}
                }
                EventData::View(data)
            }
        };

        Ok(parsed)
    }
}

fn parse_schema<T: DeserializeOwned>(trigger: WebhookTrigger, data: &Value) -> Result<T, WebhookError> {
    T::deserialize(data).map_err(|e| violation(trigger, e.to_string()))
}

fn violation(trigger: WebhookTrigger, message: impl Into<String>) -> WebhookError {
    WebhookError::SchemaViolation {
        trigger,
        message: message.into(),
    }
}

// --- Event & envelope ---

/// An event raised somewhere in the system. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: String,
    trigger: WebhookTrigger,
    created_at: DateTime<Utc>,
    data: Value,
}

impl Event {
    /// Create a new event, assigning its id and timestamp.
    pub fn new(trigger: WebhookTrigger, data: Value) -> Self {
        Self {
            id: format!("evt_{}", Uuid::new_v4().simple()),
            trigger,
            created_at: Utc::now(),
            data,
        }
    }

    /// Rebuild an event that already has an id and timestamp (e.g. when replaying).
    pub fn from_parts(id: impl Into<String>, trigger: WebhookTrigger, created_at: DateTime<Utc>, data: Value) -> Self {
        Self {
            id: id.into(),
            trigger,
            created_at,
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trigger(&self) -> WebhookTrigger {
        self.trigger
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}

/// The canonical payload delivered to every destination of an event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub version: &'static str,
    pub id: String,
    pub event: WebhookTrigger,
    pub created_at: DateTime<Utc>,
    pub data: EventData,
}

impl Envelope {
    /// Build the envelope for an event. Pure: the same event always yields the same envelope.
    pub fn build(event: &Event) -> Result<Self, WebhookError> {
        Ok(Self {
            version: ENVELOPE_VERSION,
            id: event.id.clone(),
            event: event.trigger,
            created_at: event.created_at,
            data: EventData::parse(event.trigger, &event.data)?,
        })
    }

    /// The exact bytes that get signed and sent.
    pub fn to_canonical_json(&self) -> Result<String, WebhookError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Create an event for `trigger` and build its envelope in one step.
///
/// Each call creates a new [`Event`], so the `id` and `createdAt` differ between calls
/// with the same input. Use [`Envelope::build`] on a single event for repeatable bytes.
pub fn build_envelope(trigger: WebhookTrigger, data: Value) -> Result<Envelope, WebhookError> {
    Envelope::build(&Event::new(trigger, data))
}
