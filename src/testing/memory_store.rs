//! In-memory [`TicketStore`] with the same transactional semantics as the
//! PostgreSQL store: every write re-validates the ticket state under the
//! store lock and either applies completely or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Message, Ticket, TicketState};
use crate::store::{MessageCursor, NewMessage, NewTicket, TicketStore};
use crate::{Result, SupportError};

#[derive(Default)]
struct Inner {
    tickets: HashMap<Uuid, Ticket>,
    messages: Vec<Message>,
    fail_next_commit: bool,
}

impl Inner {
    fn take_failure(&mut self) -> Result<()> {
        if self.fail_next_commit {
            self.fail_next_commit = false;
            return Err(SupportError::Database(
                "simulated transaction failure".to_string(),
            ));
        }
        Ok(())
    }

    fn locked_check(&mut self, ticket_id: Uuid, expected: TicketState) -> Result<()> {
        let ticket = self
            .tickets
            .get(&ticket_id)
            .filter(|t| t.active)
            .ok_or(SupportError::TicketNotFound(ticket_id))?;
        if ticket.state != expected {
            return Err(SupportError::InvalidState(format!(
                "ticket {} moved to {:?} since the pre-check",
                ticket_id, ticket.state
            )));
        }
        Ok(())
    }

    fn push_message(&mut self, message: &NewMessage) -> Message {
        let stored = Message {
            id: message.id,
            ticket_id: message.ticket_id,
            author_id: message.author_id,
            author_role: message.author_role,
            body: message.body.clone(),
            attachment_refs: message.attachment_refs.clone(),
            internal: message.internal,
            created_at: message.created_at,
        };
        self.messages.push(stored.clone());
        stored
    }

    /// Thread messages visible under the internal filter, ascending by
    /// `(created_at, id)`.
    fn visible_sorted(&self, ticket_id: Uuid, include_internal: bool) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.ticket_id == ticket_id && (include_internal || !m.internal))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        messages
    }
}

/// In-memory mock of the [`TicketStore`] trait with failure injection and
/// direct state manipulation for concurrency tests.
#[derive(Default)]
pub struct InMemoryTicketStore {
    inner: Mutex<Inner>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transactional write fail after its checks pass.
    pub async fn fail_next_commit(&self) {
        self.inner.lock().await.fail_next_commit = true;
    }

    /// Force a ticket's state, bypassing the lifecycle. Simulates a
    /// concurrent writer landing between pre-check and commit.
    pub async fn force_state(&self, ticket_id: Uuid, state: TicketState) {
        if let Some(ticket) = self.inner.lock().await.tickets.get_mut(&ticket_id) {
            ticket.state = state;
        }
    }

    /// Soft-delete a ticket (external moderation path).
    pub async fn deactivate(&self, ticket_id: Uuid) {
        if let Some(ticket) = self.inner.lock().await.tickets.get_mut(&ticket_id) {
            ticket.active = false;
        }
    }

    /// Insert a message row directly, bypassing lifecycle checks. For
    /// seeding pagination fixtures with controlled timestamps.
    pub async fn seed_message(&self, message: Message) {
        self.inner.lock().await.messages.push(message);
    }

    /// Every message of a ticket, ascending, internal included.
    pub async fn all_messages(&self, ticket_id: Uuid) -> Vec<Message> {
        self.inner.lock().await.visible_sorted(ticket_id, true)
    }

    /// Number of ticket rows, soft-deleted included.
    pub async fn ticket_count(&self) -> usize {
        self.inner.lock().await.tickets.len()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn create_ticket(
        &self,
        ticket: NewTicket,
        first_message: NewMessage,
    ) -> Result<(Ticket, Message)> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;

        let stored = Ticket {
            id: ticket.id,
            subject: ticket.subject,
            reporter_id: ticket.reporter_id,
            assigned_agent_id: ticket.assigned_agent_id,
            type_id: ticket.type_id,
            state: TicketState::New,
            priority: ticket.priority,
            created_at: ticket.created_at,
            updated_at: ticket.created_at,
            last_message_at: ticket.created_at,
            closure_reason: None,
            closed_by_user_id: None,
            completed_by_user_id: None,
            active: true,
            metadata: serde_json::json!({}),
        };
        inner.tickets.insert(stored.id, stored.clone());
        let message = inner.push_message(&first_message);
        Ok((stored, message))
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>> {
        let inner = self.inner.lock().await;
        Ok(inner.tickets.get(&ticket_id).filter(|t| t.active).cloned())
    }

    async fn append_message(
        &self,
        expected_state: TicketState,
        next_state: TicketState,
        message: NewMessage,
    ) -> Result<(Ticket, Message)> {
        let mut inner = self.inner.lock().await;
        inner.locked_check(message.ticket_id, expected_state)?;
        inner.take_failure()?;

        let stored = inner.push_message(&message);
        let ticket = inner
            .tickets
            .get_mut(&message.ticket_id)
            .expect("checked above");
        ticket.state = next_state;
        ticket.updated_at = message.created_at;
        ticket.last_message_at = ticket.last_message_at.max(message.created_at);
        Ok((ticket.clone(), stored))
    }

    async fn open_ticket(&self, ticket_id: Uuid, expected_state: TicketState) -> Result<Ticket> {
        let mut inner = self.inner.lock().await;
        inner.locked_check(ticket_id, expected_state)?;
        inner.take_failure()?;

        let ticket = inner.tickets.get_mut(&ticket_id).expect("checked above");
        ticket.state = TicketState::Open;
        ticket.updated_at = Utc::now();
        Ok(ticket.clone())
    }

    async fn close_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        reason: &str,
        closed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket> {
        let mut inner = self.inner.lock().await;
        inner.locked_check(ticket_id, expected_state)?;
        inner.take_failure()?;

        inner.push_message(&note);
        let ticket = inner.tickets.get_mut(&ticket_id).expect("checked above");
        ticket.state = TicketState::Closed;
        ticket.closure_reason = Some(reason.to_string());
        ticket.closed_by_user_id = Some(closed_by);
        ticket.updated_at = note.created_at;
        ticket.last_message_at = ticket.last_message_at.max(note.created_at);
        Ok(ticket.clone())
    }

    async fn complete_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        completed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket> {
        let mut inner = self.inner.lock().await;
        inner.locked_check(ticket_id, expected_state)?;
        inner.take_failure()?;

        inner.push_message(&note);
        let ticket = inner.tickets.get_mut(&ticket_id).expect("checked above");
        ticket.state = TicketState::Resolved;
        ticket.completed_by_user_id = Some(completed_by);
        ticket.updated_at = note.created_at;
        ticket.last_message_at = ticket.last_message_at.max(note.created_at);
        Ok(ticket.clone())
    }

    async fn find_message(&self, ticket_id: Uuid, message_id: Uuid) -> Result<Option<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .messages
            .iter()
            .find(|m| m.ticket_id == ticket_id && m.id == message_id)
            .cloned())
    }

    async fn list_messages_before(
        &self,
        ticket_id: Uuid,
        cursor: Option<MessageCursor>,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.lock().await;
        let mut messages = inner.visible_sorted(ticket_id, include_internal);
        if let Some(cursor) = cursor {
            messages.retain(|m| (m.created_at, m.id) < (cursor.created_at, cursor.id));
        }
        let skip = messages.len().saturating_sub(limit.max(0) as usize);
        Ok(messages.split_off(skip))
    }

    async fn list_messages_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>> {
        let inner = self.inner.lock().await;
        let messages = inner.visible_sorted(ticket_id, include_internal);
        Ok(messages
            .into_iter()
            .filter(|m| (m.created_at, m.id) > (cursor.created_at, cursor.id))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn has_message_before(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.iter().any(|m| {
            m.ticket_id == ticket_id
                && (include_internal || !m.internal)
                && (m.created_at, m.id) < (cursor.created_at, cursor.id)
        }))
    }

    async fn has_message_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.messages.iter().any(|m| {
            m.ticket_id == ticket_id
                && (include_internal || !m.internal)
                && (m.created_at, m.id) > (cursor.created_at, cursor.id)
        }))
    }
}
