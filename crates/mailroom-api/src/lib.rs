pub mod auth;
pub mod campaigns;
pub mod contacts;
pub mod error;
pub mod middleware;
pub mod unsubscribe;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Builds the HTTP surface. Admin routes require a bearer token issued by
/// `/api/auth/login`; unsubscribe links and the health check are public.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/unsubscribe/{token}", get(unsubscribe::unsubscribe))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/api/campaigns", post(campaigns::create_campaign))
        .route(
            "/api/campaigns/batch-config",
            get(campaigns::get_batch_config).put(campaigns::update_batch_config),
        )
        .route("/api/campaigns/{id}/schedule", post(campaigns::schedule_campaign))
        .route("/api/campaigns/{id}/send-now", post(campaigns::send_now))
        .route("/api/campaigns/{id}/status", get(campaigns::campaign_status))
        .route(
            "/api/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/api/contacts/import-lines", post(contacts::import_lines))
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use mailroom_db::MemoryStore;
    use mailroom_dispatch::{
        BatchConfig, BatchSettings, CampaignDispatcher, CampaignService, ContactService,
        LogTransport,
    };

    use super::*;
    use crate::auth::{AppStateInner, create_token, hash_password};

    const SECRET: &str = "router-test-secret";
    const PASSWORD: &str = "hunter22";

    fn state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        let batch = Arc::new(
            BatchConfig::new(BatchSettings {
                batch_size: 10,
                batch_interval_seconds: 0,
            })
            .unwrap(),
        );
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            Arc::new(LogTransport::new("http://localhost:3000")),
            batch,
        );
        Arc::new(AppStateInner {
            campaigns: CampaignService::new(store.clone(), dispatcher.clone()),
            contacts: ContactService::new(store),
            tokens: dispatcher.tokens().clone(),
            jwt_secret: SECRET.to_string(),
            admin_user: "admin".to_string(),
            admin_password_hash: Some(hash_password(PASSWORD).unwrap()),
        })
    }

    fn app() -> Router {
        router(state())
    }

    fn bearer() -> String {
        format!("Bearer {}", create_token(SECRET, "admin").unwrap())
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let req = match body {
            Some(payload) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_require_token() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/api/contacts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::GET,
            "/api/campaigns/batch-config",
            Some("Bearer not-a-jwt"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let forged = format!("Bearer {}", create_token("other-secret", "admin").unwrap());
        let (status, _) = send(&app, Method::GET, "/api/contacts", Some(&forged), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_issues_usable_token() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let auth = format!("Bearer {}", token);
        let (status, _) = send(&app, Method::GET, "/api/contacts", Some(&auth), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn validation_errors_are_400_with_json_body() {
        let app = app();
        let auth = bearer();
        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/campaigns/batch-config",
            Some(&auth),
            Some(json!({ "batch_size": 0, "batch_interval_seconds": 5 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "Batch size must be greater than zero.");
    }

    #[tokio::test]
    async fn unknown_campaign_is_404() {
        let app = app();
        let auth = bearer();
        let (status, body) =
            send(&app, Method::GET, "/api/campaigns/999/status", Some(&auth), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Campaign not found");

        let (status, _) =
            send(&app, Method::POST, "/api/campaigns/999/send-now", Some(&auth), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_config_round_trip() {
        let app = app();
        let auth = bearer();
        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/campaigns/batch-config",
            Some(&auth),
            Some(json!({ "batch_size": 25, "batch_interval_seconds": 30 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "batch_size": 25, "batch_interval_seconds": 30 }));

        let (_, body) =
            send(&app, Method::GET, "/api/campaigns/batch-config", Some(&auth), None).await;
        assert_eq!(body["batch_size"], 25);
    }

    #[tokio::test]
    async fn campaign_lifecycle_over_http() {
        let app = app();
        let auth = bearer();

        send(
            &app,
            Method::POST,
            "/api/contacts",
            Some(&auth),
            Some(json!({
                "name": "Ana",
                "email": "ana@example.com",
                "consent": true,
                "subscribed_to_list": true
            })),
        )
        .await;

        let (status, campaign) = send(
            &app,
            Method::POST,
            "/api/campaigns",
            Some(&auth),
            Some(json!({ "title": "Launch", "subject": "Hi", "html_body": "<p>Hi</p>" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(campaign["status"], "DRAFT");
        let id = campaign["id"].as_i64().unwrap();

        let (status, scheduled) = send(
            &app,
            Method::POST,
            &format!("/api/campaigns/{id}/schedule"),
            Some(&auth),
            Some(json!({ "scheduled_at": "2030-01-01T09:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(scheduled["status"], "SCHEDULED");

        let (status, accepted) = send(
            &app,
            Method::POST,
            &format!("/api/campaigns/{id}/send-now"),
            Some(&auth),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["status"], "SENDING");

        let mut report = Value::Null;
        for _ in 0..50 {
            tokio::task::yield_now().await;
            let (_, body) = send(
                &app,
                Method::GET,
                &format!("/api/campaigns/{id}/status"),
                Some(&auth),
                None,
            )
            .await;
            report = body;
            if report["status"] == "FINISHED" {
                break;
            }
        }
        assert_eq!(report["status"], "FINISHED");
        assert_eq!(report["sent"], 1);
        assert_eq!(report["pending"], 0);
        assert_eq!(report["recent_successes"][0]["email"], "ana@example.com");
    }

    #[tokio::test]
    async fn import_lines_accepts_plain_text() {
        let app = app();
        let req = Request::post("/api/contacts/import-lines")
            .header(header::AUTHORIZATION, bearer())
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("a@example.com\nbroken\na@example.com\n"))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let report: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report["imported"], 1);
        assert_eq!(report["skipped_invalid"], 1);
        assert_eq!(report["skipped_duplicated"], 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_public_and_idempotent() {
        let state = state();
        let app = router(state.clone());
        let contact = state
            .contacts
            .create("Bo", "bo@example.com", true, true)
            .unwrap();
        let token = state.tokens.get_or_create_token(contact.id).unwrap();
        let uri = format!("/api/unsubscribe/{token}");

        let (status, first) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["message"], "Unsubscribed successfully.");

        let (status, second) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, second);

        let stored = state.contacts.list().unwrap();
        assert!(stored[0].unsubscribed_at.is_some());

        let (status, _) = send(&app, Method::GET, "/api/unsubscribe/unknown", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
