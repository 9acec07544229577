use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use ferrobot_core::domain::cart::Cart;
use ferrobot_core::domain::product::Sku;
use ferrobot_core::flows::states::{CheckoutState, CustomerDraft};

/// Retention window for webhook idempotency markers. Delivery is
/// at-least-once; dedup inside this window gives effective exactly-once.
pub const SEEN_UPDATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Per-chat conversational state: cart, recently shown products, and any
/// in-progress checkout. Reads after a completed write observe the write;
/// cross-chat ordering is not guaranteed and not needed (the orchestrator
/// serializes per chat).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_cart(&self, chat_id: i64) -> Result<Cart, SessionError>;
    async fn set_cart(&self, chat_id: i64, cart: &Cart) -> Result<(), SessionError>;
    async fn clear_cart(&self, chat_id: i64) -> Result<(), SessionError>;

    /// Replaces the prior list atomically; the order is the 1-based
    /// presentation order positional references resolve against.
    async fn set_recent_products(&self, chat_id: i64, skus: Vec<Sku>) -> Result<(), SessionError>;
    async fn get_recent_products(&self, chat_id: i64) -> Result<Vec<Sku>, SessionError>;

    async fn get_checkout_state(
        &self,
        chat_id: i64,
    ) -> Result<Option<(CheckoutState, CustomerDraft)>, SessionError>;
    async fn set_checkout_state(
        &self,
        chat_id: i64,
        state: CheckoutState,
        draft: CustomerDraft,
    ) -> Result<(), SessionError>;
    async fn clear_checkout_state(&self, chat_id: i64) -> Result<(), SessionError>;

    /// Returns true iff this update id was not seen within the retention
    /// window; marks it seen either way.
    async fn mark_update_seen(&self, update_id: i64) -> Result<bool, SessionError>;

    /// Discards the whole session for the chat (explicit reset).
    async fn reset(&self, chat_id: i64) -> Result<(), SessionError>;
}

#[derive(Clone, Debug, Default)]
struct ChatSession {
    cart: Cart,
    recent_products: Vec<Sku>,
    checkout: Option<(CheckoutState, CustomerDraft)>,
}

/// In-process store. Single-writer-per-chat consistency is provided by
/// the orchestrator's per-chat lock; this type only guarantees that each
/// operation is atomic.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<i64, ChatSession>>,
    seen_updates: RwLock<HashMap<i64, Instant>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_session<T>(&self, chat_id: i64, read: impl FnOnce(&ChatSession) -> T) -> T {
        let sessions = self.sessions.read().await;
        match sessions.get(&chat_id) {
            Some(session) => read(session),
            None => read(&ChatSession::default()),
        }
    }

    async fn update_session(&self, chat_id: i64, update: impl FnOnce(&mut ChatSession)) {
        let mut sessions = self.sessions.write().await;
        update(sessions.entry(chat_id).or_default());
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_cart(&self, chat_id: i64) -> Result<Cart, SessionError> {
        Ok(self.with_session(chat_id, |session| session.cart.clone()).await)
    }

    async fn set_cart(&self, chat_id: i64, cart: &Cart) -> Result<(), SessionError> {
        self.update_session(chat_id, |session| session.cart = cart.clone()).await;
        Ok(())
    }

    async fn clear_cart(&self, chat_id: i64) -> Result<(), SessionError> {
        self.update_session(chat_id, |session| session.cart.clear()).await;
        Ok(())
    }

    async fn set_recent_products(&self, chat_id: i64, skus: Vec<Sku>) -> Result<(), SessionError> {
        self.update_session(chat_id, |session| session.recent_products = skus).await;
        Ok(())
    }

    async fn get_recent_products(&self, chat_id: i64) -> Result<Vec<Sku>, SessionError> {
        Ok(self.with_session(chat_id, |session| session.recent_products.clone()).await)
    }

    async fn get_checkout_state(
        &self,
        chat_id: i64,
    ) -> Result<Option<(CheckoutState, CustomerDraft)>, SessionError> {
        Ok(self.with_session(chat_id, |session| session.checkout.clone()).await)
    }

    async fn set_checkout_state(
        &self,
        chat_id: i64,
        state: CheckoutState,
        draft: CustomerDraft,
    ) -> Result<(), SessionError> {
        self.update_session(chat_id, |session| session.checkout = Some((state, draft))).await;
        Ok(())
    }

    async fn clear_checkout_state(&self, chat_id: i64) -> Result<(), SessionError> {
        self.update_session(chat_id, |session| session.checkout = None).await;
        Ok(())
    }

    async fn mark_update_seen(&self, update_id: i64) -> Result<bool, SessionError> {
        let now = Instant::now();
        let mut seen = self.seen_updates.write().await;
        seen.retain(|_, first_seen| now.duration_since(*first_seen) < SEEN_UPDATE_TTL);

        match seen.get(&update_id) {
            Some(_) => Ok(false),
            None => {
                seen.insert(update_id, now);
                Ok(true)
            }
        }
    }

    async fn reset(&self, chat_id: i64) -> Result<(), SessionError> {
        self.sessions.write().await.remove(&chat_id);
        Ok(())
    }
}

/// Test double that refuses every operation, for surfacing the
/// store-unavailable path.
#[derive(Default)]
pub struct UnavailableSessionStore;

#[async_trait]
impl SessionStore for UnavailableSessionStore {
    async fn get_cart(&self, _chat_id: i64) -> Result<Cart, SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn set_cart(&self, _chat_id: i64, _cart: &Cart) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn clear_cart(&self, _chat_id: i64) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn set_recent_products(
        &self,
        _chat_id: i64,
        _skus: Vec<Sku>,
    ) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn get_recent_products(&self, _chat_id: i64) -> Result<Vec<Sku>, SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn get_checkout_state(
        &self,
        _chat_id: i64,
    ) -> Result<Option<(CheckoutState, CustomerDraft)>, SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn set_checkout_state(
        &self,
        _chat_id: i64,
        _state: CheckoutState,
        _draft: CustomerDraft,
    ) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn clear_checkout_state(&self, _chat_id: i64) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn mark_update_seen(&self, _update_id: i64) -> Result<bool, SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }

    async fn reset(&self, _chat_id: i64) -> Result<(), SessionError> {
        Err(SessionError::Unavailable("scripted outage".to_string()))
    }
}
