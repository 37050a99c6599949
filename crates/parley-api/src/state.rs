use std::sync::Arc;

use tracing::error;
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::auth::TokenVerifier;
use parley_gateway::connection::GatewayContext;
use parley_gateway::dispatcher::Dispatcher;
use parley_types::events::GatewayEvent;

use crate::error::ApiError;
use crate::push::PushClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub verifier: TokenVerifier,
    pub push: PushClient,
}

impl AppStateInner {
    /// Run blocking DB work off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> parley_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal
            })?
            .map_err(ApiError::from)
    }

    /// Deliver a conversation-scoped event to the given participants.
    pub async fn notify(&self, participants: &[Uuid], event: GatewayEvent) {
        self.dispatcher.send_to_users(participants, event).await;
    }

    /// Deliver an event to everyone currently in its conversation.
    pub async fn notify_conversation(&self, event: GatewayEvent) {
        let Some(conversation_id) = event.conversation_id() else {
            self.dispatcher.broadcast(event);
            return;
        };
        match self.blocking(move |db| db.participant_ids(conversation_id)).await {
            Ok(participants) => self.notify(&participants, event).await,
            Err(e) => error!("Failed to resolve participants of {}: {}", conversation_id, e),
        }
    }

    pub fn gateway_context(&self) -> GatewayContext {
        GatewayContext {
            db: self.db.clone(),
            dispatcher: self.dispatcher.clone(),
            verifier: self.verifier.clone(),
        }
    }
}
