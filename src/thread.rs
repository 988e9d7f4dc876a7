//! Cursor-based, role-filtered retrieval of a ticket's message history.
//!
//! Pages are keyset-paginated on `(created_at, id)` and always returned
//! ascending. Internal messages are filtered out server-side for
//! reporter readers before the limit applies, so a reporter can neither
//! see nor infer agent notes through page shapes.

use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Message, ThreadPage, ThreadPageInfo, ThreadQuery, Ticket};
use crate::store::{MessageCursor, TicketStore};
use crate::{Result, SupportError};

pub const DEFAULT_PAGE_LIMIT: i64 = 15;
pub const MAX_PAGE_LIMIT: i64 = 100;

pub struct ThreadPaginator {
    store: Arc<dyn TicketStore>,
}

impl ThreadPaginator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Fetch one page of a ticket's thread.
    ///
    /// `before_id` returns up to `limit` messages immediately preceding
    /// that message, `after_id` the ones immediately following it; with
    /// neither, the latest `limit` messages. `has_more` is only computed
    /// for cursor queries whose page came back full.
    pub async fn get_thread(
        &self,
        ticket_id: Uuid,
        requester_id: Uuid,
        query: ThreadQuery,
    ) -> Result<ThreadPage> {
        let ticket = self
            .store
            .find_ticket(ticket_id)
            .await?
            .ok_or(SupportError::TicketNotFound(ticket_id))?;

        let include_internal = self.reader_visibility(&ticket, requester_id, &query)?;

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(SupportError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        if query.before_id.is_some() && query.after_id.is_some() {
            return Err(SupportError::Validation(
                "before_id and after_id are mutually exclusive".to_string(),
            ));
        }

        let (messages, has_more) = if let Some(before_id) = query.before_id {
            let cursor = self.resolve_cursor(ticket_id, before_id).await?;
            let messages = self
                .store
                .list_messages_before(ticket_id, Some(cursor), limit, include_internal)
                .await?;
            // Existence is checked against the cursor, so a page that
            // exactly drains the remaining history still reports more.
            let has_more = messages.len() as i64 == limit
                && self
                    .store
                    .has_message_before(ticket_id, cursor, include_internal)
                    .await?;
            (messages, has_more)
        } else if let Some(after_id) = query.after_id {
            let cursor = self.resolve_cursor(ticket_id, after_id).await?;
            let messages = self
                .store
                .list_messages_after(ticket_id, cursor, limit, include_internal)
                .await?;
            let has_more = messages.len() as i64 == limit
                && self
                    .store
                    .has_message_after(ticket_id, cursor, include_internal)
                    .await?;
            (messages, has_more)
        } else {
            let messages = self
                .store
                .list_messages_before(ticket_id, None, limit, include_internal)
                .await?;
            (messages, false)
        };

        Ok(ThreadPage {
            page_info: page_info(&messages, has_more),
            messages,
        })
    }

    /// Participant check plus the server-side internal-message rule: a
    /// reporter reader never sees internal messages, whatever the
    /// request asked for.
    fn reader_visibility(
        &self,
        ticket: &Ticket,
        requester_id: Uuid,
        query: &ThreadQuery,
    ) -> Result<bool> {
        if requester_id == ticket.reporter_id {
            return Ok(false);
        }
        if ticket.assigned_agent_id == Some(requester_id) {
            return Ok(query.include_internal.unwrap_or(true));
        }
        Err(SupportError::Forbidden(
            "only ticket participants may read the thread".to_string(),
        ))
    }

    async fn resolve_cursor(&self, ticket_id: Uuid, message_id: Uuid) -> Result<MessageCursor> {
        let message = self
            .store
            .find_message(ticket_id, message_id)
            .await?
            .ok_or(SupportError::MessageNotFound(message_id))?;
        Ok(MessageCursor::from(&message))
    }
}

fn page_info(messages: &[Message], has_more: bool) -> ThreadPageInfo {
    ThreadPageInfo {
        has_more,
        start_cursor: messages.first().map(|m| m.id),
        end_cursor: messages.last().map(|m| m.id),
    }
}
