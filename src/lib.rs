//! # support-core
//!
//! Support ticket lifecycle and threaded messaging engine.
//!
//! ## Features
//!
//! - **Ticket Lifecycle** - Finite state machine over ticket states with
//!   per-role, per-state posting authorization
//! - **Threaded Messaging** - Reporter/agent conversation threads with
//!   agent-only internal notes
//! - **Attachment Saga** - Upload-then-commit consistency between blob
//!   storage and the relational store, with best-effort compensation
//! - **Cursor Pagination** - Bidirectional keyset pagination over a
//!   ticket's message history
//! - **GraphQL API** - Queries and mutations for ticket management
//! - **Repository Pattern** - PostgreSQL data access layer behind a
//!   storage trait, with in-memory test doubles
//!
//! ## Usage
//!
//! ### In a Service
//!
//! ```rust,no_run
//! use support_core::{
//!     LifecycleConfig, PgTicketStore, ThreadPaginator, TicketLifecycle,
//! };
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     db_pool: PgPool,
//! #     blobs: Arc<dyn support_core::BlobStorage>,
//! #     assignment: Arc<dyn support_core::AgentAssignment>,
//! # ) {
//! let store = Arc::new(PgTicketStore::new(db_pool));
//! let lifecycle = Arc::new(TicketLifecycle::new(
//!     store.clone(),
//!     blobs,
//!     assignment,
//!     LifecycleConfig::default(),
//! ));
//! let paginator = Arc::new(ThreadPaginator::new(store));
//!
//! // Add to GraphQL context alongside the per-request AuthContext
//! // Schema::build(QueryRoot, MutationRoot, EmptySubscription)
//! //     .data(lifecycle)
//! //     .data(paginator)
//! //     .finish()
//! # }
//! ```
//!
//! ### Models
//!
//! ```rust
//! use support_core::{CreateTicketInput, TicketPriority};
//!
//! let input = CreateTicketInput {
//!     subject: "Payment missing".to_string(),
//!     type_id: 2,
//!     body: "Where is my payment?".to_string(),
//!     priority: Some(TicketPriority::High),
//! };
//! ```

pub mod assignment;
pub mod auth;
pub mod blob;
pub mod graphql;
pub mod lifecycle;
pub mod models;
pub mod policy;
pub mod repository;
pub mod saga;
pub mod store;
pub mod testing;
pub mod thread;

// Re-export commonly used types
pub use assignment::AgentAssignment;
pub use auth::{AuthContext, SUPPORT_AGENT_GROUP};
pub use blob::{AttachmentUpload, BlobStorage};
pub use graphql::{SupportMutations, SupportQueries};
pub use lifecycle::{LifecycleConfig, TicketLifecycle};
pub use models::*;
pub use repository::PgTicketStore;
pub use store::{NewMessage, NewTicket, TicketStore};
pub use thread::ThreadPaginator;

use thiserror::Error;
use uuid::Uuid;

/// Support system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupportError {
    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Message not found: {0}")]
    MessageNotFound(Uuid),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Attachment upload failed: {0}")]
    Upload(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl SupportError {
    /// HTTP status class an API layer should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            SupportError::TicketNotFound(_) | SupportError::MessageNotFound(_) => 404,
            SupportError::InvalidState(_) | SupportError::Validation(_) => 400,
            SupportError::Forbidden(_) => 403,
            SupportError::Upload(_) | SupportError::Database(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SupportError::TicketNotFound(_) => "NOT_FOUND",
            SupportError::MessageNotFound(_) => "MESSAGE_NOT_FOUND",
            SupportError::InvalidState(_) => "INVALID_STATE",
            SupportError::Forbidden(_) => "FORBIDDEN",
            SupportError::Validation(_) => "VALIDATION_FAILED",
            SupportError::Upload(_) => "UPLOAD_FAILED",
            SupportError::Database(_) => "DB_ERROR",
        }
    }
}

impl From<sqlx::Error> for SupportError {
    fn from(e: sqlx::Error) -> Self {
        SupportError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SupportError>;
