//! Discovery endpoint.

use axum::{extract::State, Json};

use crate::card::AgentCard;
use crate::web::AppState;

/// Return the agent card.
pub async fn get_agent_card(State(state): State<AppState>) -> Json<AgentCard> {
    Json(state.card.as_ref().clone())
}
