use async_graphql::{Enum, InputObject, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, SimpleObject)]
pub struct Ticket {
    pub id: Uuid,
    pub subject: String,
    pub reporter_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub type_id: i32,
    pub state: TicketState,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub closure_reason: Option<String>,
    pub closed_by_user_id: Option<Uuid>,
    pub completed_by_user_id: Option<Uuid>,
    pub active: bool,
    #[graphql(skip)]
    pub metadata: sqlx::types::JsonValue,
}

#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    New,
    Open,
    PendingReporter,
    PendingAgent,
    Waiting,
    Resolved,
    Closed,
}

impl TicketState {
    /// Terminal states accept no further transitions or messages.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketState::Resolved | TicketState::Closed)
    }

    pub const ALL: [TicketState; 7] = [
        TicketState::New,
        TicketState::Open,
        TicketState::PendingReporter,
        TicketState::PendingAgent,
        TicketState::Waiting,
        TicketState::Resolved,
        TicketState::Closed,
    ];
}

/// Three-level priority, persisted as its own enum type (1 = Low .. 3 = High).
#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ticket_priority", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, Enum, Eq, PartialEq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "author_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorRole {
    Reporter,
    Agent,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, SimpleObject)]
pub struct Message {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub author_role: AuthorRole,
    pub body: String,
    /// Ordered blob storage references for this message's attachments.
    pub attachment_refs: Vec<String>,
    pub internal: bool,
    pub created_at: DateTime<Utc>,
}

// Input types
#[derive(Debug, Clone, InputObject)]
pub struct CreateTicketInput {
    pub subject: String,
    pub type_id: i32,
    pub body: String,
    pub priority: Option<TicketPriority>,
}

#[derive(Debug, Clone, InputObject)]
pub struct PostMessageInput {
    pub ticket_id: Uuid,
    pub body: String,
    /// Agent-only; rejected for other callers.
    pub internal: Option<bool>,
}

/// Cursor query over a ticket's thread. `before_id` and `after_id` are
/// mutually exclusive; with neither, the latest page is returned.
#[derive(Debug, Clone, Default, InputObject)]
pub struct ThreadQuery {
    pub before_id: Option<Uuid>,
    pub after_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub include_internal: Option<bool>,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct ThreadPage {
    /// Page content, always ascending by creation time.
    pub messages: Vec<Message>,
    pub page_info: ThreadPageInfo,
}

#[derive(Debug, Clone, SimpleObject)]
pub struct ThreadPageInfo {
    /// Whether more messages exist beyond this page in the paging
    /// direction. Only computed for cursor queries that filled the page.
    pub has_more: bool,
    /// Id of the earliest message in the page, if any.
    pub start_cursor: Option<Uuid>,
    /// Id of the latest message in the page, if any.
    pub end_cursor: Option<Uuid>,
}
