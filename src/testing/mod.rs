//! Testing utilities and mock implementations of the collaborator traits.
//!
//! These allow exercising the full lifecycle without real blob storage or
//! a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use support_core::testing::{InMemoryTicketStore, MockAgentAssignment, MockBlobStorage};
//!
//! let store = Arc::new(InMemoryTicketStore::new());
//! let blobs = Arc::new(MockBlobStorage::new());
//! let assignment = Arc::new(MockAgentAssignment::with_agent(agent_id));
//!
//! // Configure failure injection
//! blobs.fail_put_at(2).await;
//! store.fail_next_commit().await;
//! ```

mod memory_store;
mod mock_assignment;
mod mock_blob;

pub use memory_store::InMemoryTicketStore;
pub use mock_assignment::MockAgentAssignment;
pub use mock_blob::MockBlobStorage;
