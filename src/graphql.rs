//! GraphQL API for the ticket lifecycle engine.
//!
//! Provides SupportQueries and SupportMutations that can be integrated
//! into any service's GraphQL schema.
//!
//! ## Usage in Services
//!
//! Services should validate the session, build an [`AuthContext`] for the
//! request, and provide it in the GraphQL context together with
//! `Arc<TicketLifecycle>` and `Arc<ThreadPaginator>`. The resolvers
//! enforce group gating for agent-only operations; everything below that
//! (state machine, ownership, internal-message visibility) is enforced by
//! the engine itself.

use std::io::Read;
use std::sync::Arc;

use async_graphql::{Context, Error, ErrorExtensions, Object, Result as GraphQLResult, Upload};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::blob::AttachmentUpload;
use crate::lifecycle::TicketLifecycle;
use crate::models::{
    AuthorRole, CreateTicketInput, Message, PostMessageInput, ThreadPage, ThreadQuery, Ticket,
};
use crate::thread::ThreadPaginator;
use crate::SupportError;

pub struct SupportQueries;

#[Object(name = "Query", extends)]
impl SupportQueries {
    /// Get a single support ticket by ID. Restricted to the ticket's
    /// participants and support agents.
    async fn support_ticket(&self, ctx: &Context<'_>, id: Uuid) -> GraphQLResult<Ticket> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = ctx.data::<AuthContext>()?;

        let ticket = lifecycle.fetch_ticket(id).await.map_err(to_graphql_error)?;
        let participant = ticket.reporter_id == auth.user_id
            || ticket.assigned_agent_id == Some(auth.user_id);
        if !participant && !auth.is_support_agent() {
            return Err(to_graphql_error(SupportError::Forbidden(
                "not a participant of this ticket".to_string(),
            )));
        }
        Ok(ticket)
    }

    /// One page of a ticket's message thread, ascending by creation time.
    async fn ticket_thread(
        &self,
        ctx: &Context<'_>,
        ticket_id: Uuid,
        query: Option<ThreadQuery>,
    ) -> GraphQLResult<ThreadPage> {
        let paginator = ctx.data::<Arc<ThreadPaginator>>()?;
        let auth = ctx.data::<AuthContext>()?;

        paginator
            .get_thread(ticket_id, auth.user_id, query.unwrap_or_default())
            .await
            .map_err(to_graphql_error)
    }
}

pub struct SupportMutations;

#[Object(name = "Mutation", extends)]
impl SupportMutations {
    /// Create a new support ticket; the caller becomes its reporter.
    async fn create_support_ticket(
        &self,
        ctx: &Context<'_>,
        input: CreateTicketInput,
        attachments: Option<Vec<Upload>>,
    ) -> GraphQLResult<Ticket> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = ctx.data::<AuthContext>()?;
        let attachments = read_uploads(ctx, attachments)?;

        lifecycle
            .create_ticket(auth.user_id, input, attachments)
            .await
            .map_err(to_graphql_error)
    }

    /// Open a new ticket. Support agents only; the engine additionally
    /// requires the caller to be the assigned agent.
    async fn open_support_ticket(&self, ctx: &Context<'_>, ticket_id: Uuid) -> GraphQLResult<Ticket> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = require_agent(ctx)?;

        lifecycle
            .open_ticket(ticket_id, auth.user_id)
            .await
            .map_err(to_graphql_error)
    }

    /// Post a message on a ticket's thread. The caller's group decides
    /// the author role; `internal` is settable only by agent callers.
    async fn post_ticket_message(
        &self,
        ctx: &Context<'_>,
        input: PostMessageInput,
        attachments: Option<Vec<Upload>>,
    ) -> GraphQLResult<Message> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = ctx.data::<AuthContext>()?;

        let author_role = if auth.is_support_agent() {
            AuthorRole::Agent
        } else {
            AuthorRole::Reporter
        };
        let internal = input.internal.unwrap_or(false);
        if internal && author_role != AuthorRole::Agent {
            return Err(to_graphql_error(SupportError::Forbidden(
                "internal notes are restricted to agents".to_string(),
            )));
        }

        let attachments = read_uploads(ctx, attachments)?;
        lifecycle
            .post_message(
                input.ticket_id,
                auth.user_id,
                author_role,
                input.body,
                attachments,
                internal,
            )
            .await
            .map_err(to_graphql_error)
    }

    /// Close a ticket with a reason. Support agents only.
    async fn close_support_ticket(
        &self,
        ctx: &Context<'_>,
        ticket_id: Uuid,
        reason: String,
    ) -> GraphQLResult<Ticket> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = require_agent(ctx)?;

        lifecycle
            .close_ticket(ticket_id, auth.user_id, &reason)
            .await
            .map_err(to_graphql_error)
    }

    /// Mark a ticket resolved. Support agents only.
    async fn complete_support_ticket(
        &self,
        ctx: &Context<'_>,
        ticket_id: Uuid,
    ) -> GraphQLResult<Ticket> {
        let lifecycle = ctx.data::<Arc<TicketLifecycle>>()?;
        let auth = require_agent(ctx)?;

        lifecycle
            .complete_ticket(ticket_id, auth.user_id)
            .await
            .map_err(to_graphql_error)
    }
}

fn require_agent<'a>(ctx: &'a Context<'_>) -> GraphQLResult<&'a AuthContext> {
    let auth = ctx.data::<AuthContext>()?;
    if !auth.is_support_agent() {
        return Err(to_graphql_error(SupportError::Forbidden(
            "support agent group required".to_string(),
        )));
    }
    Ok(auth)
}

/// Drain multipart uploads into in-memory attachment payloads for the
/// engine. Size limits are enforced by the attachment policy downstream.
fn read_uploads(
    ctx: &Context<'_>,
    uploads: Option<Vec<Upload>>,
) -> GraphQLResult<Vec<AttachmentUpload>> {
    let mut attachments = Vec::new();
    for upload in uploads.unwrap_or_default() {
        let value = upload.value(ctx)?;
        let filename = value.filename.clone();
        let content_type = value
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let mut bytes = Vec::new();
        value
            .into_read()
            .read_to_end(&mut bytes)
            .map_err(|e| Error::new(format!("failed to read upload '{}': {}", filename, e)))?;
        attachments.push(AttachmentUpload {
            filename,
            content_type,
            bytes,
        });
    }
    Ok(attachments)
}

/// Map engine errors to the API surface: a stable code and status class,
/// with storage-level detail masked out of 500-class messages.
fn to_graphql_error(e: SupportError) -> Error {
    let message = match &e {
        SupportError::Upload(_) => "attachment upload failed".to_string(),
        SupportError::Database(_) => "internal storage error".to_string(),
        other => other.to_string(),
    };
    Error::new(message).extend_with(|_, ext| {
        ext.set("code", e.code());
        ext.set("status", e.status_code() as i64);
    })
}
