//! Ticket storage trait.
//!
//! All state-gated writes take the state observed by the caller's
//! pre-check as `expected_state`; implementations re-validate it inside
//! the transaction (row lock or equivalent) and abort with
//! [`crate::SupportError::InvalidState`] if a concurrent writer got
//! there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{AuthorRole, Message, Ticket, TicketPriority, TicketState};
use crate::Result;

/// Row payload for a ticket insert. Ids are generated by the engine
/// before any upload so blob paths can embed them; tickets always start
/// in [`TicketState::New`].
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub id: Uuid,
    pub subject: String,
    pub reporter_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub type_id: i32,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
}

/// Row payload for a message insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub author_role: AuthorRole,
    pub body: String,
    pub attachment_refs: Vec<String>,
    pub internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Keyset cursor position of a message within its thread.
///
/// Messages are ordered by `(created_at, id)`; the id breaks timestamp
/// ties deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Message> for MessageCursor {
    fn from(message: &Message) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id,
        }
    }
}

/// Transactional persistence for tickets and messages.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a ticket and its initial message in one transaction.
    async fn create_ticket(
        &self,
        ticket: NewTicket,
        first_message: NewMessage,
    ) -> Result<(Ticket, Message)>;

    /// Fetch an active ticket. Soft-deleted tickets are not returned.
    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>>;

    /// Insert a message and move the ticket to `next_state`, bumping
    /// `updated_at` and `last_message_at`, in one transaction. Aborts
    /// with InvalidState when the row's state no longer matches
    /// `expected_state`.
    async fn append_message(
        &self,
        expected_state: TicketState,
        next_state: TicketState,
        message: NewMessage,
    ) -> Result<(Ticket, Message)>;

    /// Transition a ticket to Open.
    async fn open_ticket(&self, ticket_id: Uuid, expected_state: TicketState) -> Result<Ticket>;

    /// Transition a ticket to Closed, storing the closure reason and the
    /// closing user, and append `note` (a system-authored closure record)
    /// in the same transaction.
    async fn close_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        reason: &str,
        closed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket>;

    /// Transition a ticket to Resolved, storing the completing user, and
    /// append `note` in the same transaction.
    async fn complete_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        completed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket>;

    /// Fetch one message of a ticket's thread, for cursor resolution.
    async fn find_message(&self, ticket_id: Uuid, message_id: Uuid) -> Result<Option<Message>>;

    /// Up to `limit` messages strictly before `cursor` (or the latest
    /// page when `cursor` is `None`), ascending. `include_internal=false`
    /// filters internal messages before the limit applies.
    async fn list_messages_before(
        &self,
        ticket_id: Uuid,
        cursor: Option<MessageCursor>,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>>;

    /// Up to `limit` messages strictly after `cursor`, ascending.
    async fn list_messages_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>>;

    /// Cheap existence check: any visible message strictly before `cursor`.
    async fn has_message_before(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool>;

    /// Cheap existence check: any visible message strictly after `cursor`.
    async fn has_message_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool>;
}
