//! Read-only HTTP surface over the same store and form.
//!
//! - `GET /`: every entity
//! - `GET /scheme`: the form
//! - `GET /{id}`: one entity, 404 if absent

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::entities::FormEntity;
use crate::schema::Form;
use crate::storage::{EntityStore, StorageError};

/// Shared state for axum handlers.
pub struct AppState<E: FormEntity> {
    pub store: Arc<dyn EntityStore<E>>,
    pub form: Arc<Form>,
}

impl<E: FormEntity> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            form: Arc::clone(&self.form),
        }
    }
}

/// Start the HTTP server on `host:port`.
///
/// When `port` is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered.
pub async fn serve<E: FormEntity>(
    state: AppState<E>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(host = %host, port = actual_port, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router<E: FormEntity>(state: AppState<E>) -> Router {
    Router::new()
        .route("/", get(list_entities::<E>))
        .route("/scheme", get(get_scheme::<E>))
        .route("/{id}", get(get_entity::<E>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_entities<E: FormEntity>(
    State(state): State<AppState<E>>,
) -> Result<Json<Vec<E>>, StatusCode> {
    state.store.list_all().await.map(Json).map_err(|e| {
        error!(error = %e, "failed to list entities");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

async fn get_scheme<E: FormEntity>(State(state): State<AppState<E>>) -> Json<Form> {
    Json(state.form.as_ref().clone())
}

async fn get_entity<E: FormEntity>(
    State(state): State<AppState<E>>,
    Path(id): Path<Uuid>,
) -> Result<Json<E>, StatusCode> {
    match state.store.get_by_id(id).await {
        Ok(entity) => Ok(Json(entity)),
        Err(StorageError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(id = %id, error = %e, "failed to fetch entity");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::FormConfig;
    use crate::entities::{form_for, CreatePrison, Prison};
    use crate::storage::MemoryStore;

    fn prison(id: Uuid) -> Prison {
        Prison::from_create(
            id,
            CreatePrison {
                name_ru: "А".to_string(),
                name_ua: "Б".to_string(),
                subject: "X".to_string(),
                object_type: "Y".to_string(),
                lat: 1.0,
                lon: 2.0,
                address: "addr".to_string(),
                management: "m".to_string(),
                employees_count: 3,
                prisoners_count: 4,
                staff: "s".to_string(),
                contacts: "c".to_string(),
            },
        )
    }

    async fn app_with(ids: &[Uuid]) -> (Router, Arc<MemoryStore<Prison>>) {
        let store = Arc::new(MemoryStore::<Prison>::new());
        for id in ids {
            store.create(prison(*id)).await.unwrap();
        }
        let state = AppState::<Prison> {
            store: store.clone(),
            form: Arc::new(form_for::<Prison>(&FormConfig::default())),
        };
        (router(state), store)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_list_entities() {
        let (app, _store) = app_with(&[Uuid::new_v4(), Uuid::new_v4()]).await;

        let (status, json) = get_json(app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["name_ru"], "А");
    }

    #[tokio::test]
    async fn test_get_scheme() {
        let (app, _store) = app_with(&[]).await;

        let (status, json) = get_json(app, "/scheme").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "prisons");
        assert_eq!(json["fields"][1]["name"], "name_ru");
        assert_eq!(json["fields"][5]["type"], "float");
    }

    #[tokio::test]
    async fn test_get_entity_by_id() {
        let id = Uuid::new_v4();
        let (app, _store) = app_with(&[id]).await;

        let (status, json) = get_json(app.clone(), &format!("/{}", id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], id.simple().to_string());

        // Ids as listed on the bus resolve too.
        let (status, _) = get_json(app, &format!("/{}", id.simple())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_missing_entity_is_404() {
        let (app, _store) = app_with(&[Uuid::new_v4()]).await;

        let (status, _) = get_json(app, &format!("/{}", Uuid::new_v4())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_malformed_id_is_rejected() {
        let (app, _store) = app_with(&[]).await;

        let (status, _) = get_json(app, "/not-a-uuid").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_failure_is_500() {
        let (app, store) = app_with(&[]).await;
        store.set_fail_on_list(true).await;

        let (status, _) = get_json(app, "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
