use axum::{extract::State, Json};
use outbox_relay_domain::outbox::{OutboxEvent, DEFAULT_OUTBOX_PAGE};
use outbox_relay_domain::people::{NewPerson, Person};
use outbox_relay_domain::processing::ProcessedLogEntry;
use serde::Deserialize;
use tracing::info;

use super::{ApiError, ApiState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPersonRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn add_person(
    State(state): State<ApiState>,
    Json(request): Json<AddPersonRequest>,
) -> Result<Json<Person>, ApiError> {
    let person = NewPerson::new(request.first_name, request.last_name)?;
    let person = state.writer.add_person(person).await?;
    info!(person_id = person.id, "Person added");
    Ok(Json(person))
}

pub async fn list_people(State(state): State<ApiState>) -> Result<Json<Vec<Person>>, ApiError> {
    let people = state
        .store
        .list_people()
        .await
        .map_err(ApiError::internal("Failed to get people"))?;
    Ok(Json(people))
}

pub async fn list_outbox(
    State(state): State<ApiState>,
) -> Result<Json<Vec<OutboxEvent>>, ApiError> {
    let events = state
        .store
        .list_outbox_events(DEFAULT_OUTBOX_PAGE)
        .await
        .map_err(ApiError::internal("Failed to get outbox messages"))?;
    Ok(Json(events))
}

pub async fn list_processed(
    State(state): State<ApiState>,
) -> Result<Json<Vec<ProcessedLogEntry>>, ApiError> {
    let entries = state
        .processed
        .recent(DEFAULT_OUTBOX_PAGE)
        .await
        .map_err(ApiError::internal("Failed to get processed messages"))?;
    Ok(Json(entries))
}
