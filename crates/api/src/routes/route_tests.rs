//! Router tests driving the full axum stack over the in-memory backend

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::{config::Config, routes::create_router, state::AppState};

    fn app_with(overrides: &'static [(&'static str, &'static str)]) -> Router {
        let config = Config::from_lookup(|key| {
            overrides
                .iter()
                .chain([("CACHE_BACKEND", "memory")].iter())
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap();
        create_router(AppState::in_memory(config, CancellationToken::new()))
    }

    fn app() -> Router {
        app_with(&[])
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(json) => request.body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn message(user_id: &str, first: &str, last: &str, text: &str) -> Value {
        json!({
            "type": "message_new",
            "message": {
                "from": {"user_id": user_id, "first_name": first, "last_name": last},
                "text": text,
                "chat": {"chat_id": 100, "type": "dialog"}
            }
        })
    }

    #[tokio::test]
    async fn test_health_reports_closed_circuit() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache_backend"], "memory");
        assert_eq!(body["circuit"]["state"], "closed");
        assert_eq!(body["monitoring_enabled"], true);
    }

    #[tokio::test]
    async fn test_webhook_always_acknowledged() {
        let app = app();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhook/max")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/webhook/max",
            Some(json!({"type": "message_edit"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_webhook_then_profile_lookup() {
        let app = app();
        send(
            &app,
            Method::POST,
            "/api/v1/webhook/max",
            Some(message("u1", "Иван", "Петров", "привет")),
        )
        .await;

        let (status, body) = send(&app, Method::GET, "/api/v1/profiles/u1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["source"], "webhook");
        assert_eq!(body["display_name"], "Иван Петров");
        assert_eq!(body["has_full_name"], true);

        let (_, stats) = send(&app, Method::GET, "/api/v1/monitoring/webhook/stats?period=hour", None).await;
        assert_eq!(stats["total_events"], 1);
        assert_eq!(stats["profiles_stored"], 1);
    }

    #[tokio::test]
    async fn test_unknown_profile_is_default() {
        let (status, body) = send(&app(), Method::GET, "/api/v1/profiles/nobody", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "default");
        assert_eq!(body["display_name"], "");
        assert_eq!(body["has_full_name"], false);
    }

    #[tokio::test]
    async fn test_update_profile_validation() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/profiles/u1",
            Some(json!({"source": "telepathy"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/profiles/u1",
            Some(json!({"platform_first_name": "Анна", "source": "webhook"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["display_name"], "Анна");
        assert_eq!(body["source"], "webhook");
    }

    #[tokio::test]
    async fn test_set_name() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/name",
            Some(json!({"name": "Мария Ивановна"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "user_input");
        assert_eq!(body["display_name"], "Мария Ивановна");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/name",
            Some(json!({"name": "DROP TABLE;"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid characters"));
    }

    #[tokio::test]
    async fn test_request_name() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/request-name",
            Some(json!({"chat_id": 100})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "sent");
        assert_eq!(body["message_id"], "mock_msg_1");

        send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/name",
            Some(json!({"name": "Иван Петров"})),
        )
        .await;
        let (_, body) = send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/request-name",
            Some(json!({"chat_id": 100})),
        )
        .await;
        assert_eq!(body["status"], "already_complete");
    }

    #[tokio::test]
    async fn test_profile_stats_and_quality() {
        let app = app();
        send(
            &app,
            Method::POST,
            "/api/v1/webhook/max",
            Some(message("u1", "Иван", "", "")),
        )
        .await;

        let (status, stats) = send(&app, Method::GET, "/api/v1/profiles/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["total_profiles"], 1);
        assert_eq!(stats["profiles_with_full_name"], 0);

        let (status, coverage) = send(&app, Method::GET, "/api/v1/monitoring/profiles/coverage", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(coverage["total_users"], 1);

        let (status, report) = send(&app, Method::GET, "/api/v1/monitoring/profiles/quality", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["total_profiles"], 1);
    }

    #[tokio::test]
    async fn test_stats_period_parsing() {
        let app = app();

        let (status, body) = send(&app, Method::GET, "/api/v1/monitoring/webhook/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_events"], 0);

        let (status, _) = send(&app, Method::GET, "/api/v1/monitoring/webhook/stats?period=year", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_monitoring_disabled_is_unavailable() {
        let app = app_with(&[("MONITORING_ENABLED", "false")]);
        let (status, body) = send(&app, Method::GET, "/api/v1/monitoring/profiles/quality", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], 503);

        // webhooks are still processed without monitoring
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/webhook/max",
            Some(message("u1", "Иван", "", "")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_batch_by_phone() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/users/batch-by-phone",
            Some(json!({"phones": ["89991234567", "+7 (999) 123-45-67", "garbage"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let mappings = body["mappings"].as_array().unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0]["resolved_id"], "+79991234567");
        assert_eq!(mappings[1]["original_phone"], "+7 (999) 123-45-67");

        let phones: Vec<String> = (0..101).map(|i| format!("8999{:07}", i)).collect();
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/users/batch-by-phone",
            Some(json!({ "phones": phones })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("101"));
    }

    #[tokio::test]
    async fn test_single_phone_lookup() {
        let app = app();

        let (status, body) =
            send(&app, Method::GET, "/api/v1/users/by-phone?phone=89991234567", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "+79991234567");

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/users/by-phone/profile?phone=%2B7%20999%20123%2045%2067",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phone"], "+79991234567");
        assert_eq!(body["first_name"], "");

        let (status, body) = send(&app, Method::GET, "/api/v1/users/by-phone?phone=12345", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);

        let (status, body) = send(&app, Method::GET, "/api/v1/users/by-phone", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn test_unregistered_phone_is_not_found() {
        let app = app_with(&[("MOCK_MODE", "false")]);
        let (status, body) =
            send(&app, Method::GET, "/api/v1/users/by-phone?phone=89991234567", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_validate_phone() {
        let app = app();

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/phones/validate",
            Some(json!({"phone": "8 (999) 123-45-67"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": true, "normalized_phone": "+79991234567"}));

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/phones/validate",
            Some(json!({"phone": "555"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"valid": false}));
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_json_errors() {
        let app = app();

        for (method, uri) in [
            (Method::PUT, "/api/v1/profiles/u1"),
            (Method::POST, "/api/v1/profiles/u1/name"),
            (Method::POST, "/api/v1/profiles/u1/request-name"),
            (Method::POST, "/api/v1/users/batch-by-phone"),
            (Method::POST, "/api/v1/phones/validate"),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["code"], 400);
            assert!(body["error"].is_string());
        }

        // wrong field type is a 400 with the same shape, not a 422
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/profiles/u1/request-name",
            Some(json!({"chat_id": "not a number"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }

    #[tokio::test]
    async fn test_put_profile_trims_user_name() {
        let app = app();
        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/profiles/u-trim",
            Some(json!({"user_provided_name": "  Мария  "})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_provided_name"], "Мария");
        assert_eq!(body["source"], "user_input");
    }
}
