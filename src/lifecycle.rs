//! Ticket lifecycle engine: state machine, authorization and the
//! attachment saga, orchestrated per request.
//!
//! Every operation runs as one pre-check followed by one transaction.
//! Attachment uploads complete before the transaction opens; the store
//! re-validates the pre-checked state under a row lock, so a concurrent
//! writer surfaces as [`SupportError::InvalidState`] instead of a lost
//! update.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::assignment::AgentAssignment;
use crate::blob::{AttachmentUpload, BlobStorage};
use crate::models::{AuthorRole, CreateTicketInput, Message, Ticket, TicketPriority, TicketState};
use crate::policy::{self, AttachmentPolicy};
use crate::saga::AttachmentSaga;
use crate::store::{NewMessage, NewTicket, TicketStore};
use crate::{Result, SupportError};

/// Tunables for the lifecycle engine. The defaults match production use;
/// tests tighten the timeouts.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub attachment_policy: AttachmentPolicy,
    /// Bound on each blob put/delete.
    pub upload_timeout: Duration,
    /// Bound on each relational transaction.
    pub transaction_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            attachment_policy: AttachmentPolicy::default(),
            upload_timeout: Duration::from_secs(30),
            transaction_timeout: Duration::from_secs(10),
        }
    }
}

pub struct TicketLifecycle {
    store: Arc<dyn TicketStore>,
    assignment: Arc<dyn AgentAssignment>,
    saga: AttachmentSaga,
    transaction_timeout: Duration,
}

impl TicketLifecycle {
    pub fn new(
        store: Arc<dyn TicketStore>,
        blobs: Arc<dyn BlobStorage>,
        assignment: Arc<dyn AgentAssignment>,
        config: LifecycleConfig,
    ) -> Self {
        let saga = AttachmentSaga::new(blobs, config.attachment_policy, config.upload_timeout);
        Self {
            store,
            assignment,
            saga,
            transaction_timeout: config.transaction_timeout,
        }
    }

    /// Create a ticket with its initial reporter message.
    ///
    /// Attachments are validated as a batch, uploaded, and only then
    /// committed together with the ticket and message rows; a failed
    /// commit deletes the uploaded blobs again.
    pub async fn create_ticket(
        &self,
        reporter_id: Uuid,
        input: CreateTicketInput,
        attachments: Vec<AttachmentUpload>,
    ) -> Result<Ticket> {
        policy::validate_subject(&input.subject)?;
        policy::validate_body(&input.body)?;
        self.saga.validate(&attachments)?;

        let assigned_agent_id = self.assignment.pick_agent().await;

        let ticket_id = Uuid::new_v4();
        let attachment_refs = self.saga.upload_all(ticket_id, &attachments).await?;

        let now = Utc::now();
        let ticket = NewTicket {
            id: ticket_id,
            subject: input.subject.trim().to_string(),
            reporter_id,
            assigned_agent_id,
            type_id: input.type_id,
            priority: input.priority.unwrap_or(TicketPriority::Normal),
            created_at: now,
        };
        let first_message = NewMessage {
            id: Uuid::new_v4(),
            ticket_id,
            author_id: reporter_id,
            author_role: AuthorRole::Reporter,
            body: input.body,
            attachment_refs: attachment_refs.clone(),
            internal: false,
            created_at: now,
        };

        match self
            .transact(self.store.create_ticket(ticket, first_message))
            .await
        {
            Ok((ticket, _)) => {
                tracing::info!(ticket_id = %ticket.id, "Created support ticket");
                Ok(ticket)
            }
            Err(e) => {
                self.saga.compensate(&attachment_refs).await;
                Err(e)
            }
        }
    }

    /// Transition a New ticket to Open. Only the assigned agent may open
    /// a ticket.
    pub async fn open_ticket(&self, ticket_id: Uuid, agent_id: Uuid) -> Result<Ticket> {
        let ticket = self.fetch_ticket(ticket_id).await?;

        if ticket.state != TicketState::New {
            return Err(SupportError::InvalidState(format!(
                "ticket {} is not new",
                ticket_id
            )));
        }
        if ticket.assigned_agent_id != Some(agent_id) {
            return Err(SupportError::Forbidden(
                "only the assigned agent may open this ticket".to_string(),
            ));
        }

        let opened = self
            .transact(self.store.open_ticket(ticket_id, ticket.state))
            .await?;
        tracing::info!(ticket_id = %ticket_id, agent_id = %agent_id, "Opened support ticket");
        Ok(opened)
    }

    /// Post a message on a ticket's thread.
    ///
    /// Non-internal posts are authorized against the caller's identity
    /// and the ticket's turn state; internal notes are an agent-only side
    /// channel that skips both. Posting flips the turn to the other
    /// party.
    pub async fn post_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        author_role: AuthorRole,
        body: String,
        attachments: Vec<AttachmentUpload>,
        internal: bool,
    ) -> Result<Message> {
        let ticket = self.fetch_ticket(ticket_id).await?;

        if ticket.state.is_terminal() {
            return Err(SupportError::InvalidState(format!(
                "ticket {} accepts no further messages",
                ticket_id
            )));
        }
        if !internal {
            match author_role {
                AuthorRole::Agent if ticket.assigned_agent_id != Some(author_id) => {
                    return Err(SupportError::Forbidden(
                        "only the assigned agent may reply".to_string(),
                    ));
                }
                AuthorRole::Reporter if ticket.reporter_id != author_id => {
                    return Err(SupportError::Forbidden(
                        "only the reporter may reply".to_string(),
                    ));
                }
                _ => {}
            }
        }
        policy::authorize_post(author_role, ticket.state, internal)?;

        policy::validate_body(&body)?;
        self.saga.validate(&attachments)?;

        let attachment_refs = self.saga.upload_all(ticket_id, &attachments).await?;

        let next_state = policy::next_state_after_post(author_role).ok_or_else(|| {
            SupportError::Forbidden("system messages cannot be posted directly".to_string())
        })?;
        let message = NewMessage {
            id: Uuid::new_v4(),
            ticket_id,
            author_id,
            author_role,
            body,
            attachment_refs: attachment_refs.clone(),
            internal,
            created_at: Utc::now(),
        };

        match self
            .transact(self.store.append_message(ticket.state, next_state, message))
            .await
        {
            Ok((_, message)) => {
                tracing::debug!(
                    ticket_id = %ticket_id,
                    message_id = %message.id,
                    internal,
                    "Posted ticket message"
                );
                Ok(message)
            }
            Err(e) => {
                self.saga.compensate(&attachment_refs).await;
                Err(e)
            }
        }
    }

    /// Close a ticket with a reason. Terminal; the thread records a
    /// system note in the same transaction.
    pub async fn close_ticket(
        &self,
        ticket_id: Uuid,
        by_user_id: Uuid,
        reason: &str,
    ) -> Result<Ticket> {
        policy::validate_reason(reason)?;
        let ticket = self.fetch_ticket(ticket_id).await?;

        if !policy::can_finalize(ticket.state) {
            return Err(SupportError::InvalidState(format!(
                "ticket {} cannot be closed from {:?}",
                ticket_id, ticket.state
            )));
        }

        let reason = reason.trim();
        let note = self.system_note(ticket_id, by_user_id, format!("Ticket closed: {}", reason));
        let closed = self
            .transact(
                self.store
                    .close_ticket(ticket_id, ticket.state, reason, by_user_id, note),
            )
            .await?;
        tracing::info!(ticket_id = %ticket_id, by = %by_user_id, "Closed support ticket");
        Ok(closed)
    }

    /// Mark a ticket resolved. Terminal, like close, but records the
    /// completing user instead of a closure reason.
    pub async fn complete_ticket(&self, ticket_id: Uuid, by_user_id: Uuid) -> Result<Ticket> {
        let ticket = self.fetch_ticket(ticket_id).await?;

        if !policy::can_finalize(ticket.state) {
            return Err(SupportError::InvalidState(format!(
                "ticket {} cannot be completed from {:?}",
                ticket_id, ticket.state
            )));
        }

        let note = self.system_note(ticket_id, by_user_id, "Ticket marked as resolved".to_string());
        let completed = self
            .transact(
                self.store
                    .complete_ticket(ticket_id, ticket.state, by_user_id, note),
            )
            .await?;
        tracing::info!(ticket_id = %ticket_id, by = %by_user_id, "Completed support ticket");
        Ok(completed)
    }

    /// Fetch an active ticket or fail with NotFound.
    pub async fn fetch_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.store
            .find_ticket(ticket_id)
            .await?
            .ok_or(SupportError::TicketNotFound(ticket_id))
    }

    fn system_note(&self, ticket_id: Uuid, author_id: Uuid, body: String) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            ticket_id,
            author_id,
            author_role: AuthorRole::System,
            body,
            attachment_refs: Vec::new(),
            internal: false,
            created_at: Utc::now(),
        }
    }

    /// Bound a transactional store call; timing out surfaces as a
    /// database error.
    async fn transact<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.transaction_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(SupportError::Database("transaction timed out".to_string())),
        }
    }
}
