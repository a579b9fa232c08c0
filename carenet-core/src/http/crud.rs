//! Generic CRUD routes for an entity kind owned by this service.

use crate::error::{CarenetError, Result};
use crate::model::{Entity, EntityKey, Patchable};
use crate::storage::{patch_entity, replace_entity, Repository};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

type Repo<E> = Arc<dyn Repository<E>>;

pub fn crud_routes<E: Patchable>(repo: Repo<E>) -> Router {
    let collection = format!("/{}", E::KIND);
    let member = format!("/{}/:id", E::KIND);

    Router::new()
        .route(&collection, get(list::<E>).post(create::<E>))
        .route(
            &member,
            get(fetch::<E>)
                .put(replace::<E>)
                .patch(patch::<E>)
                .delete(remove::<E>),
        )
        .with_state(repo)
}

/// Bodies are parsed by hand so malformed or unknown fields map to 400.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| CarenetError::InvalidInput(format!("malformed body: {}", e)))
}

async fn list<E: Entity>(State(repo): State<Repo<E>>) -> Result<Json<Vec<E>>> {
    Ok(Json(repo.find_all().await?))
}

async fn fetch<E: Entity>(State(repo): State<Repo<E>>, Path(id): Path<i64>) -> Result<Json<E>> {
    let key = E::Key::parse(id)?;
    let entity = repo
        .find_by_key(key)
        .await?
        .ok_or_else(|| CarenetError::not_found(E::KIND, key))?;
    Ok(Json(entity))
}

async fn create<E: Entity>(
    State(repo): State<Repo<E>>,
    body: Bytes,
) -> Result<(StatusCode, Json<E>)> {
    let entity: E = parse_body(&body)?;
    entity.validate_keys()?;
    let created = repo.insert(entity).await?;
    tracing::info!(kind = E::KIND, key = %created.key(), "entity created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn replace<E: Entity>(
    State(repo): State<Repo<E>>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<E>> {
    let key = E::Key::parse(id)?;
    let entity: E = parse_body(&body)?;
    Ok(Json(replace_entity(repo.as_ref(), key, entity).await?))
}

async fn patch<E: Patchable>(
    State(repo): State<Repo<E>>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<E>> {
    let key = E::Key::parse(id)?;
    let mask: E::Patch = parse_body(&body)?;
    Ok(Json(patch_entity(repo.as_ref(), key, mask).await?))
}

async fn remove<E: Entity>(State(repo): State<Repo<E>>, Path(id): Path<i64>) -> Result<StatusCode> {
    let key = E::Key::parse(id)?;
    if repo.delete(key).await? {
        tracing::info!(kind = E::KIND, key = %key, "entity deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CarenetError::not_found(E::KIND, key))
    }
}
