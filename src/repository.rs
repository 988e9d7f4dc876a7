use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Message, Ticket, TicketState};
use crate::store::{MessageCursor, NewMessage, NewTicket, TicketStore};
use crate::{Result, SupportError};

/// PostgreSQL-backed [`TicketStore`].
///
/// State-gated writes take a `FOR UPDATE` lock on the ticket row and
/// re-check the state inside the transaction, so two concurrent posts
/// that both passed the lifecycle pre-check cannot both commit.
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run support schema migrations: {}", e);
                SupportError::Database(e.to_string())
            })
    }

    /// Lock the ticket row and verify it is still in `expected_state`.
    async fn lock_and_check(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        ticket_id: Uuid,
        expected_state: TicketState,
    ) -> Result<Ticket> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM support_tickets WHERE id = $1 AND active FOR UPDATE",
        )
        .bind(ticket_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(SupportError::TicketNotFound(ticket_id))?;

        if ticket.state != expected_state {
            return Err(SupportError::InvalidState(format!(
                "ticket {} moved to {:?} since the pre-check",
                ticket_id, ticket.state
            )));
        }
        Ok(ticket)
    }

    async fn insert_message(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message: &NewMessage,
    ) -> Result<Message> {
        let inserted = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO ticket_messages (
                id, ticket_id, author_id, author_role, body, attachment_refs, internal, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.ticket_id)
        .bind(message.author_id)
        .bind(message.author_role)
        .bind(&message.body)
        .bind(&message.attachment_refs)
        .bind(message.internal)
        .bind(message.created_at)
        .fetch_one(&mut **tx)
        .await?;

        Ok(inserted)
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn create_ticket(
        &self,
        ticket: NewTicket,
        first_message: NewMessage,
    ) -> Result<(Ticket, Message)> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            tracing::error!("Failed to open ticket transaction: {}", e);
            SupportError::from(e)
        })?;

        let inserted = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO support_tickets (
                id, subject, reporter_id, assigned_agent_id, type_id, state, priority,
                created_at, updated_at, last_message_at, active, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8, TRUE, '{}'::JSONB)
            RETURNING *
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.subject)
        .bind(ticket.reporter_id)
        .bind(ticket.assigned_agent_id)
        .bind(ticket.type_id)
        .bind(TicketState::New)
        .bind(ticket.priority)
        .bind(ticket.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert support ticket: {}", e);
            SupportError::from(e)
        })?;

        let message = self.insert_message(&mut tx, &first_message).await?;

        tx.commit().await?;
        Ok((inserted, message))
    }

    async fn find_ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>> {
        let ticket = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM support_tickets WHERE id = $1 AND active",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch support ticket: {}", e);
            SupportError::from(e)
        })?;

        Ok(ticket)
    }

    async fn append_message(
        &self,
        expected_state: TicketState,
        next_state: TicketState,
        message: NewMessage,
    ) -> Result<(Ticket, Message)> {
        let now = message.created_at;
        let mut tx = self.pool.begin().await?;

        self.lock_and_check(&mut tx, message.ticket_id, expected_state)
            .await?;
        let inserted = self.insert_message(&mut tx, &message).await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE support_tickets SET
                state = $2,
                updated_at = $3,
                last_message_at = GREATEST(last_message_at, $3)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message.ticket_id)
        .bind(next_state)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((ticket, inserted))
    }

    async fn open_ticket(&self, ticket_id: Uuid, expected_state: TicketState) -> Result<Ticket> {
        let mut tx = self.pool.begin().await?;
        self.lock_and_check(&mut tx, ticket_id, expected_state).await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE support_tickets SET state = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(TicketState::Open)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    async fn close_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        reason: &str,
        closed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket> {
        let now = note.created_at;
        let mut tx = self.pool.begin().await?;

        self.lock_and_check(&mut tx, ticket_id, expected_state).await?;
        self.insert_message(&mut tx, &note).await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE support_tickets SET
                state = $2,
                closure_reason = $3,
                closed_by_user_id = $4,
                updated_at = $5,
                last_message_at = GREATEST(last_message_at, $5)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(TicketState::Closed)
        .bind(reason)
        .bind(closed_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    async fn complete_ticket(
        &self,
        ticket_id: Uuid,
        expected_state: TicketState,
        completed_by: Uuid,
        note: NewMessage,
    ) -> Result<Ticket> {
        let now = note.created_at;
        let mut tx = self.pool.begin().await?;

        self.lock_and_check(&mut tx, ticket_id, expected_state).await?;
        self.insert_message(&mut tx, &note).await?;

        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE support_tickets SET
                state = $2,
                completed_by_user_id = $3,
                updated_at = $4,
                last_message_at = GREATEST(last_message_at, $4)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(TicketState::Resolved)
        .bind(completed_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    async fn find_message(&self, ticket_id: Uuid, message_id: Uuid) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM ticket_messages WHERE ticket_id = $1 AND id = $2",
        )
        .bind(ticket_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn list_messages_before(
        &self,
        ticket_id: Uuid,
        cursor: Option<MessageCursor>,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>> {
        // Page backwards, then restore ascending order for the caller.
        let mut messages = match cursor {
            Some(cursor) => {
                sqlx::query_as::<_, Message>(
                    r#"
                    SELECT * FROM ticket_messages
                    WHERE ticket_id = $1
                      AND (internal = FALSE OR $2)
                      AND (created_at, id) < ($3, $4)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $5
                    "#,
                )
                .bind(ticket_id)
                .bind(include_internal)
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Message>(
                    r#"
                    SELECT * FROM ticket_messages
                    WHERE ticket_id = $1
                      AND (internal = FALSE OR $2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "#,
                )
                .bind(ticket_id)
                .bind(include_internal)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        messages.reverse();
        Ok(messages)
    }

    async fn list_messages_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        limit: i64,
        include_internal: bool,
    ) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM ticket_messages
            WHERE ticket_id = $1
              AND (internal = FALSE OR $2)
              AND (created_at, id) > ($3, $4)
            ORDER BY created_at ASC, id ASC
            LIMIT $5
            "#,
        )
        .bind(ticket_id)
        .bind(include_internal)
        .bind(cursor.created_at)
        .bind(cursor.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn has_message_before(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ticket_messages
                WHERE ticket_id = $1
                  AND (internal = FALSE OR $2)
                  AND (created_at, id) < ($3, $4)
            )
            "#,
        )
        .bind(ticket_id)
        .bind(include_internal)
        .bind(cursor.created_at)
        .bind(cursor.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn has_message_after(
        &self,
        ticket_id: Uuid,
        cursor: MessageCursor,
        include_internal: bool,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM ticket_messages
                WHERE ticket_id = $1
                  AND (internal = FALSE OR $2)
                  AND (created_at, id) > ($3, $4)
            )
            "#,
        )
        .bind(ticket_id)
        .bind(include_internal)
        .bind(cursor.created_at)
        .bind(cursor.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
