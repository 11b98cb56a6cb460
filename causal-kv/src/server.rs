//! HTTP façade over the replica core.
//!
//! A thin translation layer: routes parse the wire bodies, call into
//! [`Replica`], and map status enums onto the protocol's response codes.
//! No replication or consistency logic lives here.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::message::{KvRequestBody, Snapshot, ViewRequestBody};
use crate::replica::{DeleteStatus, GetStatus, Provenance, PutStatus, Replica};
use crate::transport::PeerTransport;
use crate::view::ViewChange;

type Reply = (StatusCode, Json<Value>);

/// Builds the replica's route table.
pub fn router<T: PeerTransport>(replica: Arc<Replica<T>>) -> Router {
    Router::new()
        .route(
            "/kvs/:key",
            get(get_key::<T>).put(put_key::<T>).delete(delete_key::<T>),
        )
        .route(
            "/view",
            get(get_view::<T>).put(put_view::<T>).delete(delete_view::<T>),
        )
        .route("/sync", get(get_sync::<T>).put(put_sync::<T>))
        .layer(TraceLayer::new_for_http())
        .with_state(replica)
}

/// Serves the façade on an already-bound listener until the process exits.
pub async fn serve<T: PeerTransport>(
    listener: TcpListener,
    replica: Arc<Replica<T>>,
) -> Result<()> {
    axum::serve(listener, router(replica))
        .await
        .context("http server failed")
}

fn provenance_of(body: &KvRequestBody) -> Provenance {
    if body.forwarded {
        Provenance::Forwarded {
            origin: body.origin.clone().unwrap_or_default(),
        }
    } else {
        Provenance::Client
    }
}

fn key_too_long() -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "Key is too long"})),
    )
}

fn dependencies_unsatisfied() -> Reply {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "Causal dependencies not satisfied; try again later"})),
    )
}

fn key_not_found() -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "Key does not exist"})),
    )
}

fn missing_value() -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "PUT request does not specify a value"})),
    )
}

async fn put_key<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Path(key): Path<String>,
    body: Option<Json<KvRequestBody>>,
) -> Reply {
    let Some(Json(body)) = body else {
        return missing_value();
    };
    let Some(value) = body.value.clone() else {
        return missing_value();
    };
    let provenance = provenance_of(&body);
    let result = replica.put(&key, value, body.causal_metadata, provenance).await;
    match result.status {
        PutStatus::Created => (
            StatusCode::CREATED,
            Json(json!({"result": "created", "causal-metadata": result.clock})),
        ),
        PutStatus::Replaced => (
            StatusCode::OK,
            Json(json!({"result": "replaced", "causal-metadata": result.clock})),
        ),
        PutStatus::DependenciesUnsatisfied => dependencies_unsatisfied(),
        PutStatus::KeyTooLong => key_too_long(),
    }
}

async fn get_key<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Path(key): Path<String>,
    body: Option<Json<KvRequestBody>>,
) -> Reply {
    let meta = body.and_then(|Json(body)| body.causal_metadata);
    let result = replica.get(&key, meta).await;
    match result.status {
        GetStatus::Found(value) => (
            StatusCode::OK,
            Json(json!({
                "result": "found",
                "value": value,
                "causal-metadata": result.clock,
            })),
        ),
        GetStatus::NotFound => key_not_found(),
        GetStatus::DependenciesUnsatisfied => dependencies_unsatisfied(),
        GetStatus::KeyTooLong => key_too_long(),
    }
}

async fn delete_key<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Path(key): Path<String>,
    body: Option<Json<KvRequestBody>>,
) -> Reply {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let provenance = provenance_of(&body);
    let result = replica.delete(&key, body.causal_metadata, provenance).await;
    match result.status {
        DeleteStatus::Deleted => (
            StatusCode::OK,
            Json(json!({"result": "deleted", "causal-metadata": result.clock})),
        ),
        DeleteStatus::NotFound => key_not_found(),
        DeleteStatus::DependenciesUnsatisfied => dependencies_unsatisfied(),
        DeleteStatus::KeyTooLong => key_too_long(),
    }
}

async fn get_view<T: PeerTransport>(State(replica): State<Arc<Replica<T>>>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({"view": replica.view_list().await})),
    )
}

async fn put_view<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Json(body): Json<ViewRequestBody>,
) -> Reply {
    match replica.view_add(&body.socket_address).await {
        ViewChange::Added => (StatusCode::CREATED, Json(json!({"result": "added"}))),
        _ => (StatusCode::OK, Json(json!({"result": "already present"}))),
    }
}

async fn delete_view<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Json(body): Json<ViewRequestBody>,
) -> Reply {
    match replica
        .view_remove(&body.socket_address, body.forwarded)
        .await
    {
        ViewChange::Deleted => (StatusCode::OK, Json(json!({"result": "deleted"}))),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "View has no such replica"})),
        ),
    }
}

async fn get_sync<T: PeerTransport>(State(replica): State<Arc<Replica<T>>>) -> Json<Snapshot> {
    Json(replica.snapshot().await)
}

async fn put_sync<T: PeerTransport>(
    State(replica): State<Arc<Replica<T>>>,
    Json(snapshot): Json<Snapshot>,
) -> Reply {
    replica.install_snapshot(snapshot).await;
    (StatusCode::OK, Json(json!({"result": "synced"})))
}
