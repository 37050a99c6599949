use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use parley_gateway::connection;

use crate::state::AppState;

/// Upgrade to the WebSocket gateway. Authentication happens in the Identify handshake.
pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let ctx = state.gateway_context();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx))
}
