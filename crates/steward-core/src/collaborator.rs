//! Collaborator ports the built-in action handlers call through.
//!
//! Every external effect the engine produces (looking up a contact, sending
//! a message, mutating a record, calling a webhook) goes through one of these
//! narrow traits. They are object-safe (`BoxFuture` instead of RPITIT) so a
//! `Collaborators` set can hold them as `Arc<dyn ...>` and be swapped per
//! deployment or per test.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use steward_types::error::ActionError;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure reported by a collaborator.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The referenced record (member, user, group) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collaborator refused the request as malformed.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or timed out.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<CollaboratorError> for ActionError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::NotFound(msg) => ActionError::RecipientNotFound(msg),
            CollaboratorError::Rejected(msg) => ActionError::InvalidConfig(msg),
            CollaboratorError::Unavailable(msg) => ActionError::DownstreamUnavailable(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Identity lookup
// ---------------------------------------------------------------------------

/// A person the engine can address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SubjectRef {
    User(String),
    Member(String),
}

impl SubjectRef {
    pub fn id(&self) -> &str {
        match self {
            SubjectRef::User(id) | SubjectRef::Member(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SubjectRef::User(_) => "user",
            SubjectRef::Member(_) => "member",
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// Contact details resolved for a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

pub trait IdentityLookup: Send + Sync {
    /// Resolve a subject to contact details. Absent subjects are `NotFound`.
    fn resolve<'a>(&'a self, subject: &'a SubjectRef)
    -> BoxFuture<'a, Result<Contact, CollaboratorError>>;
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Notification,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Notification => "notification",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: Channel,
    pub recipient: Contact,
    /// Channel address used (email address, phone number, or contact id).
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
    pub execution_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

/// One sender per channel.
pub trait MessageSender: Send + Sync {
    fn send<'a>(
        &'a self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>>;
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Where a message's text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// A named template from the library.
    Library(String),
    /// Text given directly in the action config.
    Inline {
        subject: Option<String>,
        body: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// Renders templates against a variable mapping.
///
/// Unresolved variables render as empty text, never as an error.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: &TemplateRef,
        variables: &Value,
    ) -> Result<RenderedMessage, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Domain mutators
// ---------------------------------------------------------------------------

pub trait GroupMembership: Send + Sync {
    /// Add a member to a group, or update their role if already present.
    /// Returns `true` when the membership is new.
    fn upsert_member<'a>(
        &'a self,
        group_id: &'a str,
        member_id: &'a str,
        role: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, CollaboratorError>>;
}

pub trait RecordMutator: Send + Sync {
    /// Set one field on the subject's record.
    fn update_field<'a>(
        &'a self,
        subject: &'a SubjectRef,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub execution_id: Uuid,
}

pub trait TaskCreator: Send + Sync {
    /// Create a follow-up task. Returns the new task's id.
    fn create_task<'a>(&'a self, task: &'a NewTask)
    -> BoxFuture<'a, Result<String, CollaboratorError>>;
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Single HTTP call, no retries. Implementations enforce their own timeout
/// and report it as `Unavailable`.
pub trait WebhookTransport: Send + Sync {
    fn call<'a>(
        &'a self,
        request: &'a WebhookRequest,
    ) -> BoxFuture<'a, Result<WebhookResponse, CollaboratorError>>;
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// The full set of collaborators the built-in handlers need.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityLookup>,
    pub email: Arc<dyn MessageSender>,
    pub sms: Arc<dyn MessageSender>,
    pub notifications: Arc<dyn MessageSender>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub groups: Arc<dyn GroupMembership>,
    pub records: Arc<dyn RecordMutator>,
    pub tasks: Arc<dyn TaskCreator>,
    pub webhooks: Arc<dyn WebhookTransport>,
}

impl Collaborators {
    pub fn sender(&self, channel: Channel) -> &Arc<dyn MessageSender> {
        match channel {
            Channel::Email => &self.email,
            Channel::Sms => &self.sms,
            Channel::Notification => &self.notifications,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
