//! Demo route exercising the full create-entity-plus-promise happy path: a
//! single transaction that adds an entity and a follow-up promise together,
//! with the promise's first attempt deliberately suppressed so fulfillment
//! happens out-of-band (via the salvager or an explicit drain) rather than
//! inline in the request.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use promise_core::{Id, PartitionKey};
use serde_json::json;

use super::AppState;
use crate::service::promise::Promise;
use crate::service::registry::Action;
use crate::storage::document::Document;

/// Stable action name this demo's promises are fulfilled under.
pub const GREET_ENTITY_ACTION: &str = "example.greet-entity";

/// Logs a greeting for the entity named in the promise's data. Idempotent:
/// logging the same greeting twice is harmless, which is all at-least-once
/// delivery can promise.
pub struct GreetEntityAction;

#[async_trait]
impl Action for GreetEntityAction {
    async fn invoke(&self, promise: &Promise) -> anyhow::Result<()> {
        tracing::info!(entity_id = promise.data(), "greeted entity");
        Ok(())
    }
}

/// `POST /example/add-entities`: creates one entity and one promise to greet
/// it, committed together in a single transaction.
pub async fn add_entities_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match create_entity_with_promise(&state).await {
        Ok((entity_id, promise_id)) => Ok(Json(json!({
            "entity_id": entity_id,
            "promise_id": promise_id,
        }))),
        Err(err) => {
            tracing::error!(error.kind = err.kind(), error.message = %err, "add-entities failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn create_entity_with_promise(state: &AppState) -> crate::error::EngineResult<(String, String)> {
    let entity_id = Id::generate();
    let partition = PartitionKey::of_id(&entity_id);
    let entity = Document::new(entity_id.as_str().to_string(), partition.as_str().to_string())
        .with_field("Name", "Jan");

    let mut promise = Promise::create_for_entity(
        &state.registry,
        &partition,
        GREET_ENTITY_ACTION,
        entity_id.as_str().to_string(),
        state.store.clock().as_ref(),
    )?;
    promise.suppress_immediate_fulfillment()?;

    let mut tx = state.store.create_transaction(partition);
    tx.register_promise_obligation(promise.id());
    tx.add(entity.clone())?;
    tx.add(promise.to_document())?;
    tx.commit(&state.shutdown.shutdown_receiver()).await?;
    tx.clear_promise_obligation(promise.id());
    tx.finish()?;

    Ok((entity.id, promise.id().to_string()))
}
