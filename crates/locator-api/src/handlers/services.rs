//! Service table and single-service resolution.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use locator_core::{LocatorError, ServiceInfo, ServiceTable};

use super::ApiState;

// ── /services ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ServicesResponse {
    pub services: ServiceTable,
}

/// Locally hosted services, as pushed to synchronize subscribers.
pub async fn handle_services(State(state): State<ApiState>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.registry.dump(),
    })
}

// ── /services/{name} ─────────────────────────────────────────────────────────

/// Resolve one service, falling back to remote nodes through the gateway.
pub async fn handle_service(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceInfo>, (StatusCode, String)> {
    match state.registry.resolve(&name) {
        Ok(info) => Ok(Json(info)),
        Err(e @ LocatorError::ServiceUnavailable(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use locator_core::{Endpoint, MethodTable};
    use locator_services::{AdhocGateway, Gateway};

    use crate::handlers::test_support::state;

    #[tokio::test]
    async fn empty_registry_lists_nothing() {
        let (state, _tx) = state(None);
        let Json(resp) = handle_services(State(state)).await;
        assert!(resp.services.is_empty());
    }

    #[tokio::test]
    async fn unknown_service_is_404() {
        let (state, _tx) = state(None);
        let err = handle_service(State(state), Path("nope".into())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert!(err.1.contains("nope"));
    }

    #[tokio::test]
    async fn remote_service_resolved_through_gateway() {
        let gateway = Arc::new(AdhocGateway::new());
        let mut table = ServiceTable::new();
        table.insert(
            "storage".into(),
            ServiceInfo {
                endpoint: Endpoint::new("node-b", 10100),
                version: 1,
                methods: MethodTable::new(),
            },
        );
        gateway.consume("b", table);

        let (state, _tx) = state(Some(gateway as Arc<dyn Gateway>));
        let Json(info) = handle_service(State(state.clone()), Path("storage".into()))
            .await
            .unwrap();
        assert_eq!(info.endpoint.host, "node-b");

        // remote services are not part of the local dump
        let Json(resp) = handle_services(State(state)).await;
        assert!(resp.services.is_empty());
    }
}
