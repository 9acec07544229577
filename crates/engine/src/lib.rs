pub mod cart;
pub mod checkout;
pub mod invoice;
pub mod orchestrator;
pub mod products;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use ferrobot_agent::llm::LlmError;
use ferrobot_core::errors::AssistantError;
use ferrobot_db::repositories::RepositoryError;
use ferrobot_db::session::SessionError;
use ferrobot_index::IndexError;

pub use cart::CartHandler;
pub use checkout::CheckoutHandler;
pub use invoice::{InvoiceQueue, RecordingInvoiceQueue};
pub use orchestrator::Orchestrator;
pub use products::ProductHandler;

/// Serializes dispatch per chat id so two interleaved updates cannot
/// corrupt cart or checkout state. Chats never contend with each other.
#[derive(Default)]
pub struct ChatLocks {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn acquire(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(chat_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub(crate) fn from_session(error: SessionError) -> AssistantError {
    match error {
        SessionError::Unavailable(_) => AssistantError::SessionUnavailable,
    }
}

pub(crate) fn from_repository(error: RepositoryError) -> AssistantError {
    match error {
        RepositoryError::Conflict(detail) => AssistantError::conflict(detail),
        RepositoryError::InvalidRequest(detail) => AssistantError::invariant(detail),
        RepositoryError::Decode(detail) => AssistantError::invariant(detail),
        RepositoryError::Database(source) => AssistantError::transient(source),
    }
}

pub(crate) fn from_index(error: IndexError) -> AssistantError {
    match error {
        IndexError::Transport(detail) => AssistantError::transient(detail),
        IndexError::Rejected(detail) => AssistantError::transient(detail),
        mismatch @ IndexError::DimensionMismatch { .. } => AssistantError::invariant(mismatch),
    }
}

pub(crate) fn from_llm(error: LlmError) -> AssistantError {
    match error {
        LlmError::MalformedResponse(detail) => AssistantError::schema(detail),
        other => AssistantError::transient(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::ChatLocks;

    #[tokio::test]
    async fn same_chat_is_serialized_but_chats_run_in_parallel() {
        let locks = Arc::new(ChatLocks::default());

        let guard = locks.acquire(1).await;

        // Another chat id must not block.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2))
            .await
            .expect("different chat must acquire immediately");
        drop(other);

        // The same chat id blocks until the guard is released.
        let contended = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contended.is_finished(), "same chat must wait for the lock");

        drop(guard);
        tokio::time::timeout(Duration::from_millis(100), contended)
            .await
            .expect("lock released")
            .expect("task completes");
    }
}
