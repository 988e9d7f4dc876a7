//! Agent assignment collaborator boundary.

use async_trait::async_trait;
use uuid::Uuid;

/// External load-balancing policy that picks a support agent for a new
/// ticket. The policy is opaque to the engine; `None` leaves the ticket
/// unassigned.
#[async_trait]
pub trait AgentAssignment: Send + Sync {
    async fn pick_agent(&self) -> Option<Uuid>;
}
