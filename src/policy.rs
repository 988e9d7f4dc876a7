//! Posting authorization, state transitions and payload validation.
//!
//! The posting rules form a closed table keyed by
//! `(AuthorRole, TicketState, internal)`. Identity checks (reporter
//! ownership, agent assignment) are separate and live in the lifecycle,
//! since they compare ids rather than roles.

use crate::blob::AttachmentUpload;
use crate::models::{AuthorRole, TicketState};
use crate::{Result, SupportError};

pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_REASON_LEN: usize = 500;

/// Whether a message with the given role/internal flag may be posted on a
/// ticket in the given state.
///
/// Internal notes are an agent-only side channel: they skip the turn
/// rules but never get past a terminal state. System messages are written
/// by the engine itself during close/complete and cannot be posted
/// directly.
pub fn authorize_post(role: AuthorRole, state: TicketState, internal: bool) -> Result<()> {
    if state.is_terminal() {
        return Err(SupportError::InvalidState(format!(
            "ticket is {}: no further messages are accepted",
            state_name(state)
        )));
    }

    if internal {
        return match role {
            AuthorRole::Agent => Ok(()),
            _ => Err(SupportError::Forbidden(
                "internal notes are restricted to agents".to_string(),
            )),
        };
    }

    match (role, state) {
        (AuthorRole::System, _) => Err(SupportError::Forbidden(
            "system messages cannot be posted directly".to_string(),
        )),
        (_, TicketState::New) => Err(SupportError::InvalidState(
            "ticket has not been opened yet".to_string(),
        )),
        (AuthorRole::Agent, TicketState::PendingReporter) => Err(SupportError::InvalidState(
            "waiting on reporter".to_string(),
        )),
        (AuthorRole::Reporter, TicketState::PendingAgent) => Err(SupportError::InvalidState(
            "waiting on agent".to_string(),
        )),
        (
            AuthorRole::Agent,
            TicketState::Open | TicketState::PendingAgent | TicketState::Waiting,
        ) => Ok(()),
        (
            AuthorRole::Reporter,
            TicketState::Open | TicketState::PendingReporter | TicketState::Waiting,
        ) => Ok(()),
        // Terminal states were already rejected above the match.
        (_, TicketState::Resolved | TicketState::Closed) => Err(SupportError::InvalidState(
            format!("ticket is {}: no further messages are accepted", state_name(state)),
        )),
    }
}

/// State the ticket moves to after an accepted post. Posting always flips
/// the turn to the other party; system notes never move the state.
pub fn next_state_after_post(role: AuthorRole) -> Option<TicketState> {
    match role {
        AuthorRole::Agent => Some(TicketState::PendingReporter),
        AuthorRole::Reporter => Some(TicketState::PendingAgent),
        AuthorRole::System => None,
    }
}

/// States from which a ticket may be closed or completed.
pub fn can_finalize(state: TicketState) -> bool {
    matches!(
        state,
        TicketState::PendingReporter | TicketState::PendingAgent | TicketState::Waiting
    )
}

pub fn validate_subject(subject: &str) -> Result<()> {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return Err(SupportError::Validation("subject must not be empty".to_string()));
    }
    if trimmed.len() > MAX_SUBJECT_LEN {
        return Err(SupportError::Validation(format!(
            "subject exceeds {} characters",
            MAX_SUBJECT_LEN
        )));
    }
    Ok(())
}

pub fn validate_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(SupportError::Validation("message body must not be empty".to_string()));
    }
    Ok(())
}

pub fn validate_reason(reason: &str) -> Result<()> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(SupportError::Validation("closure reason is required".to_string()));
    }
    if trimmed.len() > MAX_REASON_LEN {
        return Err(SupportError::Validation(format!(
            "closure reason exceeds {} characters",
            MAX_REASON_LEN
        )));
    }
    Ok(())
}

/// Per-file attachment limits, checked for the whole batch before any
/// upload starts.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_file_bytes: usize,
    pub allowed_content_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_bytes: 10 * 1024 * 1024,
            allowed_content_types: [
                "image/png",
                "image/jpeg",
                "image/gif",
                "image/webp",
                "application/pdf",
                "text/plain",
                "application/zip",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl AttachmentPolicy {
    /// Validate a batch. A single invalid file rejects the batch with no
    /// uploads performed.
    pub fn validate_batch(&self, attachments: &[AttachmentUpload]) -> Result<()> {
        if attachments.len() > self.max_files {
            return Err(SupportError::Validation(format!(
                "at most {} attachments are allowed, got {}",
                self.max_files,
                attachments.len()
            )));
        }
        for upload in attachments {
            if upload.filename.trim().is_empty() {
                return Err(SupportError::Validation(
                    "attachment filename must not be empty".to_string(),
                ));
            }
            if upload.bytes.is_empty() {
                return Err(SupportError::Validation(format!(
                    "attachment '{}' is empty",
                    upload.filename
                )));
            }
            if upload.bytes.len() > self.max_file_bytes {
                return Err(SupportError::Validation(format!(
                    "attachment '{}' exceeds {} bytes",
                    upload.filename, self.max_file_bytes
                )));
            }
            if !self
                .allowed_content_types
                .iter()
                .any(|t| t == &upload.content_type)
            {
                return Err(SupportError::Validation(format!(
                    "attachment '{}' has disallowed content type '{}'",
                    upload.filename, upload.content_type
                )));
            }
        }
        Ok(())
    }
}

fn state_name(state: TicketState) -> &'static str {
    match state {
        TicketState::New => "new",
        TicketState::Open => "open",
        TicketState::PendingReporter => "pending-reporter",
        TicketState::PendingAgent => "pending-agent",
        TicketState::Waiting => "waiting",
        TicketState::Resolved => "resolved",
        TicketState::Closed => "closed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [AuthorRole; 3] = [AuthorRole::Reporter, AuthorRole::Agent, AuthorRole::System];

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Expect {
        Allow,
        InvalidState,
        Forbidden,
    }

    fn expected(role: AuthorRole, state: TicketState, internal: bool) -> Expect {
        use AuthorRole::*;
        use TicketState::*;

        if state.is_terminal() {
            return Expect::InvalidState;
        }
        if internal {
            return if role == Agent {
                Expect::Allow
            } else {
                Expect::Forbidden
            };
        }
        match (role, state) {
            (System, _) => Expect::Forbidden,
            (_, New) => Expect::InvalidState,
            (Agent, PendingReporter) => Expect::InvalidState,
            (Reporter, PendingAgent) => Expect::InvalidState,
            _ => Expect::Allow,
        }
    }

    #[test]
    fn authorization_table_is_exhaustive() {
        for role in ROLES {
            for state in TicketState::ALL {
                for internal in [false, true] {
                    let got = match authorize_post(role, state, internal) {
                        Ok(()) => Expect::Allow,
                        Err(SupportError::InvalidState(_)) => Expect::InvalidState,
                        Err(SupportError::Forbidden(_)) => Expect::Forbidden,
                        Err(other) => panic!("unexpected error kind: {other:?}"),
                    };
                    assert_eq!(
                        got,
                        expected(role, state, internal),
                        "mismatch for ({role:?}, {state:?}, internal={internal})"
                    );
                }
            }
        }
    }

    #[test]
    fn terminal_states_reject_internal_notes_too() {
        for state in [TicketState::Resolved, TicketState::Closed] {
            let err = authorize_post(AuthorRole::Agent, state, true).unwrap_err();
            assert!(matches!(err, SupportError::InvalidState(_)));
        }
    }

    #[test]
    fn posting_flips_the_turn() {
        assert_eq!(
            next_state_after_post(AuthorRole::Agent),
            Some(TicketState::PendingReporter)
        );
        assert_eq!(
            next_state_after_post(AuthorRole::Reporter),
            Some(TicketState::PendingAgent)
        );
        assert_eq!(next_state_after_post(AuthorRole::System), None);
    }

    #[test]
    fn finalize_only_from_pending_or_waiting() {
        for state in TicketState::ALL {
            let want = matches!(
                state,
                TicketState::PendingReporter | TicketState::PendingAgent | TicketState::Waiting
            );
            assert_eq!(can_finalize(state), want, "{state:?}");
        }
    }

    #[test]
    fn subject_and_reason_bounds() {
        assert!(validate_subject("Payment missing").is_ok());
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject(&"x".repeat(MAX_SUBJECT_LEN + 1)).is_err());
        assert!(validate_reason("resolved by workaround").is_ok());
        assert!(validate_reason("").is_err());
        assert!(validate_reason(&"x".repeat(MAX_REASON_LEN + 1)).is_err());
        assert!(validate_body("hello").is_ok());
        assert!(validate_body(" \n").is_err());
    }

    #[test]
    fn attachment_batch_limits() {
        let policy = AttachmentPolicy::default();
        let file = |name: &str, ct: &str, len: usize| AttachmentUpload {
            filename: name.to_string(),
            content_type: ct.to_string(),
            bytes: vec![0u8; len],
        };

        assert!(policy.validate_batch(&[]).is_ok());
        assert!(policy
            .validate_batch(&[file("a.png", "image/png", 10)])
            .is_ok());

        let six: Vec<_> = (0..6).map(|i| file(&format!("f{i}.png"), "image/png", 1)).collect();
        assert!(matches!(
            policy.validate_batch(&six),
            Err(SupportError::Validation(_))
        ));

        assert!(policy
            .validate_batch(&[file("huge.pdf", "application/pdf", 10 * 1024 * 1024 + 1)])
            .is_err());
        assert!(policy
            .validate_batch(&[file("run.exe", "application/x-msdownload", 10)])
            .is_err());
        assert!(policy.validate_batch(&[file("", "image/png", 10)]).is_err());

        // one bad file rejects the whole batch
        let mixed = vec![file("ok.png", "image/png", 10), file("bad.exe", "application/x-exe", 10)];
        assert!(policy.validate_batch(&mixed).is_err());
    }
}
