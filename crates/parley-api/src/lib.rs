pub mod conversations;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod push;
pub mod reactions;
pub mod state;
pub mod users;
pub mod views;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All REST routes plus the WebSocket gateway.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Users
        .route("/users/sync", post(users::sync))
        .route("/users/me", get(users::me))
        .route("/users", get(users::list))
        .route("/users/{user_id}", get(users::get))
        // Conversations
        .route("/conversations", get(conversations::list))
        .route("/conversations/direct", post(conversations::create_direct))
        .route("/conversations/groups", post(conversations::create_group))
        .route("/conversations/{conversation_id}", get(conversations::detail))
        .route("/conversations/{conversation_id}/members", get(conversations::members))
        .route("/conversations/{conversation_id}/leave", post(conversations::leave))
        .route("/conversations/{conversation_id}/read", post(conversations::mark_read))
        // Messages
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::list).post(messages::send),
        )
        .route("/conversations/{conversation_id}/messages/search", get(messages::search))
        .route("/messages/{message_id}", patch(messages::edit).delete(messages::delete))
        .route("/messages/{message_id}/forward", post(messages::forward))
        // Reactions
        .route("/messages/{message_id}/reactions", post(reactions::toggle))
        .route("/conversations/{conversation_id}/reactions", get(reactions::for_conversation))
        // Presence and typing
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence", get(presence::map))
        .route("/presence/online", get(presence::online))
        .route(
            "/conversations/{conversation_id}/typing",
            get(presence::typing_users).post(presence::set_typing),
        )
        // Push
        .route("/push/tokens", post(push::register_token).delete(push::unregister_token))
        .route("/notifications/send", post(push::send_notification))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(protected_routes)
        .route("/gateway", get(gateway::upgrade))
        .with_state(state)
}
