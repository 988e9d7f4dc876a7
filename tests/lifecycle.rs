//! End-to-end lifecycle tests against the in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use support_core::testing::{InMemoryTicketStore, MockAgentAssignment, MockBlobStorage};
use support_core::{
    AttachmentUpload, AuthorRole, CreateTicketInput, LifecycleConfig, SupportError, Ticket,
    TicketLifecycle, TicketPriority, TicketState,
};
use tokio_test::assert_ok;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryTicketStore>,
    blobs: Arc<MockBlobStorage>,
    assignment: Arc<MockAgentAssignment>,
    lifecycle: TicketLifecycle,
    reporter: Uuid,
    agent: Uuid,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryTicketStore::new());
    let blobs = Arc::new(MockBlobStorage::new());
    let agent = Uuid::new_v4();
    let assignment = Arc::new(MockAgentAssignment::with_agent(agent));
    let lifecycle = TicketLifecycle::new(
        store.clone(),
        blobs.clone(),
        assignment.clone(),
        LifecycleConfig {
            upload_timeout: Duration::from_secs(2),
            transaction_timeout: Duration::from_secs(2),
            ..LifecycleConfig::default()
        },
    );
    Harness {
        store,
        blobs,
        assignment,
        lifecycle,
        reporter: Uuid::new_v4(),
        agent,
    }
}

fn input(subject: &str, body: &str) -> CreateTicketInput {
    CreateTicketInput {
        subject: subject.to_string(),
        type_id: 2,
        body: body.to_string(),
        priority: None,
    }
}

fn png(name: &str, bytes: &[u8]) -> AttachmentUpload {
    AttachmentUpload {
        filename: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: bytes.to_vec(),
    }
}

impl Harness {
    async fn create(&self) -> Ticket {
        self.lifecycle
            .create_ticket(
                self.reporter,
                input("Payment missing", "Where is my payment?"),
                vec![],
            )
            .await
            .unwrap()
    }

    /// Create and open, leaving the ticket ready for replies.
    async fn create_open(&self) -> Ticket {
        let ticket = self.create().await;
        self.lifecycle
            .open_ticket(ticket.id, self.agent)
            .await
            .unwrap()
    }

    async fn agent_reply(&self, ticket_id: Uuid, body: &str) {
        self.lifecycle
            .post_message(ticket_id, self.agent, AuthorRole::Agent, body.to_string(), vec![], false)
            .await
            .unwrap();
    }

    async fn reporter_reply(&self, ticket_id: Uuid, body: &str) {
        self.lifecycle
            .post_message(
                ticket_id,
                self.reporter,
                AuthorRole::Reporter,
                body.to_string(),
                vec![],
                false,
            )
            .await
            .unwrap();
    }
}

// Scenario: createTicket("Payment missing", ...) leaves a New ticket with
// exactly one reporter message.
#[tokio::test]
async fn create_ticket_starts_new_with_reporter_message() {
    let h = harness();
    let ticket = h.create().await;

    assert_eq!(ticket.state, TicketState::New);
    assert_eq!(ticket.subject, "Payment missing");
    assert_eq!(ticket.reporter_id, h.reporter);
    assert_eq!(ticket.assigned_agent_id, Some(h.agent));
    assert_eq!(ticket.type_id, 2);
    assert!(ticket.active);
    assert_eq!(ticket.last_message_at, ticket.created_at);

    let messages = h.store.all_messages(ticket.id).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].author_role, AuthorRole::Reporter);
    assert_eq!(messages[0].author_id, h.reporter);
    assert_eq!(messages[0].body, "Where is my payment?");
    assert!(!messages[0].internal);
}

#[tokio::test]
async fn create_ticket_without_available_agent_stays_unassigned() {
    let h = harness();
    h.assignment.set_agent(None).await;

    let ticket = h.create().await;
    assert_eq!(ticket.assigned_agent_id, None);

    // an unassigned ticket cannot be opened by anyone
    let err = h.lifecycle.open_ticket(ticket.id, h.agent).await.unwrap_err();
    assert!(matches!(err, SupportError::Forbidden(_)));
}

#[tokio::test]
async fn create_ticket_rejects_blank_subject() {
    let h = harness();
    let err = h
        .lifecycle
        .create_ticket(h.reporter, input("   ", "body"), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::Validation(_)));
    assert_eq!(h.store.ticket_count().await, 0);
}

// Scenario: six attachments fail validation before any upload call.
#[tokio::test]
async fn create_ticket_rejects_oversized_batch_before_uploading() {
    let h = harness();
    let six: Vec<_> = (0..6).map(|i| png(&format!("f{i}.png"), b"x")).collect();

    let err = h
        .lifecycle
        .create_ticket(h.reporter, input("Subject", "body"), six)
        .await
        .unwrap_err();

    assert!(matches!(err, SupportError::Validation(_)));
    assert_eq!(h.blobs.put_calls().await, 0);
    assert_eq!(h.store.ticket_count().await, 0);
}

#[tokio::test]
async fn failed_upload_aborts_create_without_db_write() {
    let h = harness();
    h.blobs.fail_put_at(2).await;

    let err = h
        .lifecycle
        .create_ticket(
            h.reporter,
            input("Subject", "body"),
            vec![png("a.png", b"a"), png("b.png", b"b"), png("c.png", b"c")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SupportError::Upload(_)));
    assert_eq!(h.store.ticket_count().await, 0);
    // the first upload was compensated, the third never attempted
    assert!(h.blobs.stored_refs().await.is_empty());
    assert_eq!(h.blobs.put_calls().await, 2);
}

// Round-trip property: blobs of a committed ticket are retrievable;
// blobs of a create that failed at the commit step are not.
#[tokio::test]
async fn committed_attachments_are_retrievable() {
    let h = harness();
    let ticket = h
        .lifecycle
        .create_ticket(
            h.reporter,
            input("Subject", "body"),
            vec![png("proof.png", b"payload")],
        )
        .await
        .unwrap();

    let messages = h.store.all_messages(ticket.id).await;
    assert_eq!(messages[0].attachment_refs.len(), 1);
    let blob_ref = &messages[0].attachment_refs[0];
    assert_eq!(h.blobs.get(blob_ref).await.as_deref(), Some(b"payload".as_ref()));
    assert_eq!(
        h.blobs.content_type(blob_ref).await.as_deref(),
        Some("image/png")
    );
}

#[tokio::test]
async fn commit_failure_compensates_uploaded_attachments() {
    let h = harness();
    h.store.fail_next_commit().await;

    let err = h
        .lifecycle
        .create_ticket(
            h.reporter,
            input("Subject", "body"),
            vec![png("a.png", b"a"), png("b.png", b"b")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SupportError::Database(_)));
    assert_eq!(h.store.ticket_count().await, 0);
    assert!(h.blobs.stored_refs().await.is_empty());
    assert_eq!(h.blobs.deleted_refs().await.len(), 2);
}

// Scenario: the assigned agent opens a New ticket; a different agent is
// rejected.
#[tokio::test]
async fn only_the_assigned_agent_may_open() {
    let h = harness();
    let ticket = h.create().await;

    let other = Uuid::new_v4();
    let err = h.lifecycle.open_ticket(ticket.id, other).await.unwrap_err();
    assert!(matches!(err, SupportError::Forbidden(_)));

    let opened = h.lifecycle.open_ticket(ticket.id, h.agent).await.unwrap();
    assert_eq!(opened.state, TicketState::Open);

    // opening twice is an invalid transition
    let err = h.lifecycle.open_ticket(ticket.id, h.agent).await.unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn open_unknown_ticket_is_not_found() {
    let h = harness();
    let err = h
        .lifecycle
        .open_ticket(Uuid::new_v4(), h.agent)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::TicketNotFound(_)));
}

#[tokio::test]
async fn fetching_a_created_ticket_round_trips() {
    let h = harness();
    let ticket = h.create().await;

    let fetched = assert_ok!(h.lifecycle.fetch_ticket(ticket.id).await);
    assert_eq!(fetched.id, ticket.id);
    assert_eq!(fetched.state, TicketState::New);
    assert_eq!(fetched.priority, TicketPriority::Normal);
}

// Scenario: agent reply -> PendingReporter, reporter reply ->
// PendingAgent, close stores the reason.
#[tokio::test]
async fn conversation_flips_turn_and_close_is_terminal() {
    let h = harness();
    let ticket = h.create_open().await;

    h.agent_reply(ticket.id, "Looking into it").await;
    let after_agent = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert_eq!(after_agent.state, TicketState::PendingReporter);

    h.reporter_reply(ticket.id, "Thanks, any update?").await;
    let after_reporter = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert_eq!(after_reporter.state, TicketState::PendingAgent);

    let closed = h
        .lifecycle
        .close_ticket(ticket.id, h.agent, "resolved by workaround")
        .await
        .unwrap();
    assert_eq!(closed.state, TicketState::Closed);
    assert_eq!(closed.closure_reason.as_deref(), Some("resolved by workaround"));
    assert_eq!(closed.closed_by_user_id, Some(h.agent));

    // the thread records the closure as a system note
    let messages = h.store.all_messages(ticket.id).await;
    let last = messages.last().unwrap();
    assert_eq!(last.author_role, AuthorRole::System);
    assert!(!last.internal);
    assert!(last.body.contains("resolved by workaround"));

    // terminal: no further messages of any kind
    let err = h
        .lifecycle
        .post_message(ticket.id, h.agent, AuthorRole::Agent, "late".into(), vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
    let err = h
        .lifecycle
        .post_message(ticket.id, h.agent, AuthorRole::Agent, "note".into(), vec![], true)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn complete_marks_resolved_and_is_terminal() {
    let h = harness();
    let ticket = h.create_open().await;
    h.agent_reply(ticket.id, "Fixed in the next release").await;

    let resolved = h.lifecycle.complete_ticket(ticket.id, h.agent).await.unwrap();
    assert_eq!(resolved.state, TicketState::Resolved);
    assert_eq!(resolved.completed_by_user_id, Some(h.agent));
    assert!(resolved.closure_reason.is_none());

    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            h.reporter,
            AuthorRole::Reporter,
            "hello?".into(),
            vec![],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn finalize_requires_a_pending_or_waiting_state() {
    let h = harness();
    let ticket = h.create().await;

    // New is not closeable
    let err = h
        .lifecycle
        .close_ticket(ticket.id, h.agent, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));

    // Open is not closeable either; a reply has to land first
    let opened = h.lifecycle.open_ticket(ticket.id, h.agent).await.unwrap();
    assert_eq!(opened.state, TicketState::Open);
    let err = h.lifecycle.complete_ticket(ticket.id, h.agent).await.unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn close_requires_a_reason() {
    let h = harness();
    let ticket = h.create_open().await;
    h.agent_reply(ticket.id, "update").await;

    let err = h.lifecycle.close_ticket(ticket.id, h.agent, "  ").await.unwrap_err();
    assert!(matches!(err, SupportError::Validation(_)));

    let long = "x".repeat(600);
    let err = h.lifecycle.close_ticket(ticket.id, h.agent, &long).await.unwrap_err();
    assert!(matches!(err, SupportError::Validation(_)));
}

#[tokio::test]
async fn turn_gating_rejects_out_of_turn_posts() {
    let h = harness();
    let ticket = h.create_open().await;

    h.agent_reply(ticket.id, "your turn").await;
    // waiting on reporter: the agent cannot post again
    let err = h
        .lifecycle
        .post_message(ticket.id, h.agent, AuthorRole::Agent, "again".into(), vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));

    h.reporter_reply(ticket.id, "my turn").await;
    // waiting on agent: the reporter cannot post again
    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            h.reporter,
            AuthorRole::Reporter,
            "again".into(),
            vec![],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn posting_on_a_new_ticket_is_rejected() {
    let h = harness();
    let ticket = h.create().await;

    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            h.reporter,
            AuthorRole::Reporter,
            "anyone there?".into(),
            vec![],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));
}

#[tokio::test]
async fn strangers_cannot_post() {
    let h = harness();
    let ticket = h.create_open().await;

    let stranger = Uuid::new_v4();
    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            stranger,
            AuthorRole::Reporter,
            "hi".into(),
            vec![],
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::Forbidden(_)));

    // an agent who is not assigned to this ticket is rejected too
    let err = h
        .lifecycle
        .post_message(ticket.id, stranger, AuthorRole::Agent, "hi".into(), vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::Forbidden(_)));
}

// Property: internal=true is only ever committed with an agent author,
// and an accepted internal note still flips the turn.
#[tokio::test]
async fn internal_notes_are_agent_only_and_flip_the_turn() {
    let h = harness();
    let ticket = h.create_open().await;

    let note = h
        .lifecycle
        .post_message(
            ticket.id,
            h.agent,
            AuthorRole::Agent,
            "internal context".into(),
            vec![],
            true,
        )
        .await
        .unwrap();
    assert!(note.internal);
    assert_eq!(note.author_role, AuthorRole::Agent);

    let after = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert_eq!(after.state, TicketState::PendingReporter);

    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            h.reporter,
            AuthorRole::Reporter,
            "sneaky".into(),
            vec![],
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::Forbidden(_)));

    for message in h.store.all_messages(ticket.id).await {
        if message.internal {
            assert_eq!(message.author_role, AuthorRole::Agent);
        }
    }
}

// Internal notes skip the turn and ownership gates: they may land on a
// New ticket.
#[tokio::test]
async fn internal_notes_are_allowed_on_new_tickets() {
    let h = harness();
    let ticket = h.create().await;

    let note = h
        .lifecycle
        .post_message(
            ticket.id,
            h.agent,
            AuthorRole::Agent,
            "triage note".into(),
            vec![],
            true,
        )
        .await
        .unwrap();
    assert!(note.internal);
}

#[tokio::test]
async fn last_message_at_is_monotonic() {
    let h = harness();
    let ticket = h.create_open().await;

    let mut previous = ticket.last_message_at;
    h.agent_reply(ticket.id, "one").await;
    let t = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert!(t.last_message_at >= previous);
    previous = t.last_message_at;

    h.reporter_reply(ticket.id, "two").await;
    let t = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert!(t.last_message_at >= previous);
    previous = t.last_message_at;

    h.lifecycle
        .close_ticket(ticket.id, h.agent, "done")
        .await
        .unwrap();
    let messages = h.store.all_messages(ticket.id).await;
    let t_closed = messages.last().unwrap().created_at;
    assert!(t_closed >= previous);
}

// The store re-validates state under its lock: a stale expected state
// aborts instead of committing a lost update.
#[tokio::test]
async fn stale_state_precheck_aborts_the_append() {
    use support_core::{NewMessage, TicketStore};

    let h = harness();
    let ticket = h.create_open().await;

    // a concurrent writer lands between pre-check and commit
    h.store.force_state(ticket.id, TicketState::Closed).await;

    let stale = NewMessage {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        author_id: h.agent,
        author_role: AuthorRole::Agent,
        body: "raced".to_string(),
        attachment_refs: vec![],
        internal: false,
        created_at: chrono::Utc::now(),
    };
    let err = h
        .store
        .append_message(TicketState::Open, TicketState::PendingReporter, stale)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::InvalidState(_)));

    // nothing was written
    assert_eq!(h.store.all_messages(ticket.id).await.len(), 1);
}

#[tokio::test]
async fn post_commit_failure_compensates_uploads() {
    let h = harness();
    let ticket = h.create_open().await;

    h.store.fail_next_commit().await;
    let err = h
        .lifecycle
        .post_message(
            ticket.id,
            h.agent,
            AuthorRole::Agent,
            "with file".into(),
            vec![png("log.png", b"log")],
            false,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SupportError::Database(_)));
    assert!(h.blobs.stored_refs().await.is_empty());
    assert_eq!(h.blobs.deleted_refs().await.len(), 1);
    // ticket untouched
    let t = h.lifecycle.fetch_ticket(ticket.id).await.unwrap();
    assert_eq!(t.state, TicketState::Open);
}

#[tokio::test]
async fn soft_deleted_tickets_are_invisible() {
    let h = harness();
    let ticket = h.create_open().await;
    h.store.deactivate(ticket.id).await;

    let err = h.lifecycle.fetch_ticket(ticket.id).await.unwrap_err();
    assert!(matches!(err, SupportError::TicketNotFound(_)));

    let err = h
        .lifecycle
        .post_message(ticket.id, h.agent, AuthorRole::Agent, "gone".into(), vec![], false)
        .await
        .unwrap_err();
    assert!(matches!(err, SupportError::TicketNotFound(_)));
}

// Every terminal state rejects every subsequent post.
#[tokio::test]
async fn terminal_states_reject_all_posts() {
    for terminal in [TicketState::Resolved, TicketState::Closed] {
        let h = harness();
        let ticket = h.create_open().await;
        h.agent_reply(ticket.id, "wrapping up").await;

        match terminal {
            TicketState::Closed => {
                h.lifecycle.close_ticket(ticket.id, h.agent, "done").await.unwrap();
            }
            _ => {
                h.lifecycle.complete_ticket(ticket.id, h.agent).await.unwrap();
            }
        }

        for (author, role, internal) in [
            (h.reporter, AuthorRole::Reporter, false),
            (h.agent, AuthorRole::Agent, false),
            (h.agent, AuthorRole::Agent, true),
        ] {
            let err = h
                .lifecycle
                .post_message(ticket.id, author, role, "late".into(), vec![], internal)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SupportError::InvalidState(_)),
                "{terminal:?} accepted a post from {role:?}"
            );
        }
    }
}
