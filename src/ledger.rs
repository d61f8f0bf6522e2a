use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{PostStatus, PostedContent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("posted content {0} not found")]
    NotFound(Uuid),
    #[error("posted content {0} already resolved")]
    AlreadyResolved(Uuid),
    #[error("pending is not a valid target status")]
    InvalidTransition,
}

/// Audit record of every posting attempt. Entries are written once with
/// status `pending` and resolved exactly once to `posted` or `failed`;
/// there is no way back.
#[derive(Debug, Default)]
pub struct PostLedger {
    entries: RwLock<Vec<PostedContent>>,
}

impl PostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, content: PostedContent) -> Uuid {
        let id = content.id;
        self.entries.write().push(content);
        id
    }

    pub fn update_status(&self, id: Uuid, status: PostStatus) -> Result<(), LedgerError> {
        if status == PostStatus::Pending {
            return Err(LedgerError::InvalidTransition);
        }

        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(LedgerError::NotFound(id))?;

        if entry.status != PostStatus::Pending {
            return Err(LedgerError::AlreadyResolved(id));
        }

        entry.status = status;
        if status == PostStatus::Posted {
            entry.posted_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Newest first, for the review surface.
    pub fn list(&self) -> Vec<PostedContent> {
        let mut entries = self.entries.read().clone();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    pub fn list_for_user(&self, user_id: &str) -> Vec<PostedContent> {
        self.list().into_iter().filter(|e| e.user_id == user_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;
    use pretty_assertions::assert_eq;

    fn pending_record(user_id: &str) -> PostedContent {
        PostedContent {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            generation_id: None,
            cell_letter: None,
            image_url: None,
            caption: "caption".into(),
            hashtags: vec!["#a".into()],
            music_url: None,
            platform: Platform::Instagram,
            status: PostStatus::Pending,
            posted_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn record_then_resolve_once() {
        let ledger = PostLedger::new();
        let id = ledger.record(pending_record("user-1"));

        ledger.update_status(id, PostStatus::Posted).unwrap();
        let entry = &ledger.list()[0];
        assert_eq!(entry.status, PostStatus::Posted);
        assert!(entry.posted_at.is_some());

        // Terminal states never transition again.
        assert_eq!(
            ledger.update_status(id, PostStatus::Failed),
            Err(LedgerError::AlreadyResolved(id))
        );
        assert_eq!(ledger.list()[0].status, PostStatus::Posted);
    }

    #[test]
    fn cannot_move_back_to_pending() {
        let ledger = PostLedger::new();
        let id = ledger.record(pending_record("user-1"));
        assert_eq!(
            ledger.update_status(id, PostStatus::Pending),
            Err(LedgerError::InvalidTransition)
        );
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let ledger = PostLedger::new();
        let missing = Uuid::new_v4();
        assert_eq!(
            ledger.update_status(missing, PostStatus::Failed),
            Err(LedgerError::NotFound(missing))
        );
    }

    #[test]
    fn listing_filters_by_user() {
        let ledger = PostLedger::new();
        ledger.record(pending_record("user-1"));
        ledger.record(pending_record("user-2"));
        ledger.record(pending_record("user-1"));

        assert_eq!(ledger.list().len(), 3);
        assert_eq!(ledger.list_for_user("user-1").len(), 2);
        assert_eq!(ledger.list_for_user("user-3").len(), 0);
    }
}
