use std::path::PathBuf;

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{self, AppState};
use crate::campaigns;
use crate::logging::CorrelationId;
use crate::middleware::{require_admin, require_user};
use crate::payments;
use crate::refunds;

/// Transport-level options for [`build_router`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub cors_origins: Vec<String>,
    /// Directory holding `starter.html` and the `/static` assets.
    pub frontend_dir: PathBuf,
    pub request_id_len: usize,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState, http: &HttpSettings) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/user/register", post(auth::register))
        .route("/user/login", post(auth::login))
        .route("/public/campaign", get(campaigns::list_published))
        .route("/public/campaign/{campaign_id}", get(campaigns::get_published));

    let user_routes = Router::new()
        .route("/user/payment", post(payments::create_payment))
        .route("/user/payments", get(payments::list_payments))
        .route("/donor/request-refund", post(refunds::request_refund))
        .layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin_routes = Router::new()
        .route(
            "/admin/campaign",
            post(campaigns::create_campaign).get(campaigns::list_campaigns),
        )
        .route(
            "/admin/campaign/{campaign_id}",
            get(campaigns::get_campaign)
                .patch(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/admin/manage-refund/{refund_id}", post(refunds::manage_refund))
        .route("/admin/refunds", get(refunds::list_refunds))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let frontend = Router::new()
        .route_service("/", ServeFile::new(http.frontend_dir.join("starter.html")))
        .nest_service("/static", ServeDir::new(&http.frontend_dir));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .with_state(state)
        .merge(frontend)
        .layer(cors_layer(&http.cors_origins))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    id = %request_id,
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(CorrelationId::new(http.request_id_len)))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| warn!("Ignoring unparsable CORS origin {}", origin))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use kindred_core::gateway::{CreatedPayment, GatewayError, PaymentGateway, ProviderLink, RefundReceipt};
    use kindred_db::Database;

    use super::*;
    use crate::auth::{ADMIN_ROLE, AppStateInner, Settings, create_token};
    use crate::middleware::LocalVerifier;
    use crate::refunds::DecisionLocks;

    const SECRET: &str = "router-test-secret";

    #[derive(Default)]
    struct ScriptedGateway {
        fail: AtomicBool,
        slow: AtomicBool,
        payments: AtomicUsize,
        refunds: AtomicUsize,
    }

    impl ScriptedGateway {
        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Make provider refunds take long enough for requests to overlap.
        fn set_slow(&self, slow: bool) {
            self.slow.store(slow, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn create_payment(
            &self,
            _method: &str,
            _amount: Decimal,
            _currency: &str,
        ) -> Result<CreatedPayment, GatewayError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Transport("connection refused".into()));
            }
            let n = self.payments.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(CreatedPayment {
                id: format!("PAY-{}", n),
                state: "created".into(),
                links: vec![ProviderLink {
                    href: "https://pay.test/approve".into(),
                    rel: "approval_url".into(),
                    method: Some("REDIRECT".into()),
                }],
            })
        }

        async fn refund_payment(
            &self,
            _provider_ref: &str,
            _amount: Decimal,
            _currency: &str,
        ) -> Result<RefundReceipt, GatewayError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Rejected {
                    status: 500,
                    body: "INTERNAL_SERVICE_ERROR".into(),
                });
            }
            self.refunds.fetch_add(1, Ordering::SeqCst);
            Ok(RefundReceipt {
                id: Some("RF-1".into()),
                state: "completed".into(),
            })
        }
    }

    struct Harness {
        app: Router,
        gateway: Arc<ScriptedGateway>,
        admin_token: String,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(ScriptedGateway::default());
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            settings: Settings {
                jwt_secret: SECRET.into(),
                token_ttl: chrono::Duration::minutes(15),
                admin_emails: vec!["ops@kindred.org".into()],
                currency: "GBP".into(),
                email_visible: 2,
            },
            user_verifier: LocalVerifier::new(SECRET),
            admin_verifier: Arc::new(LocalVerifier::new(SECRET)),
            gateway: gateway.clone(),
            refund_locks: DecisionLocks::default(),
        });
        let http = HttpSettings {
            cors_origins: vec!["http://127.0.0.1:3000".into()],
            frontend_dir: PathBuf::from("frontend"),
            request_id_len: 8,
        };
        let admin_token = create_token(
            SECRET,
            0,
            "ops@kindred.org",
            vec![ADMIN_ROLE.to_string()],
            chrono::Duration::minutes(15),
        )
        .unwrap();

        Harness {
            app: build_router(state, &http),
            gateway,
            admin_token,
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Register and log in a donor, returning their token.
    async fn donor(app: &Router, name: &str, email: &str) -> String {
        let (status, _) = send(
            app,
            "POST",
            "/user/register",
            None,
            Some(json!({ "name": name, "email": email, "password": "hunter2hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app,
            "POST",
            "/user/login",
            None,
            Some(json!({ "email": email, "password": "hunter2hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn pay(app: &Router, token: &str, amount: i64) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/user/payment",
            Some(token),
            Some(json!({ "payment_method": "paypal", "amount": amount })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_sets_request_id() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers().get("x-request-id").unwrap();
        assert_eq!(id.len(), 8);
    }

    #[tokio::test]
    async fn test_campaign_lifecycle_over_http() {
        let h = harness();
        let admin = Some(h.admin_token.as_str());

        let (status, body) = send(
            &h.app,
            "POST",
            "/admin/campaign",
            admin,
            Some(json!({ "name": "Spring Appeal", "template": "t1" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["id"], 1);
        assert_eq!(body["isDraft"], true);

        let (status, body) = send(
            &h.app,
            "PATCH",
            "/admin/campaign/1",
            admin,
            Some(json!({ "name": "Spring Appeal", "template": "t1", "isDraft": false, "isPublished": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isPublished"], true);

        let (status, body) = send(
            &h.app,
            "PATCH",
            "/admin/campaign/1",
            admin,
            Some(json!({ "name": "Spring Appeal", "template": "t1", "isDraft": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Campaign: 1 is published");
        assert_eq!(body["code"], "PUBLISHED_CANNOT_REVERT_TO_DRAFT");

        let (status, body) = send(&h.app, "GET", "/public/campaign", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(
            &h.app,
            "PATCH",
            "/admin/campaign/1",
            admin,
            Some(json!({ "name": "Spring Appeal", "template": "t1", "isDraft": false, "isEnded": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &h.app,
            "PATCH",
            "/admin/campaign/1",
            admin,
            Some(json!({ "name": "Renamed", "template": "t2", "isDraft": false, "isEnded": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Campaign: 1 has ended");

        let (status, body) = send(&h.app, "DELETE", "/admin/campaign/1", admin, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NOT_DRAFT");
    }

    #[tokio::test]
    async fn test_campaign_validation_errors() {
        let h = harness();
        let admin = Some(h.admin_token.as_str());
        let draft = json!({ "name": "Winter", "template": "t" });

        let (status, _) = send(&h.app, "POST", "/admin/campaign", admin, Some(draft.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&h.app, "POST", "/admin/campaign", admin, Some(draft)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Campaign with name Winter already exists");

        let (status, body) = send(
            &h.app,
            "POST",
            "/admin/campaign",
            admin,
            Some(json!({ "name": "Autumn", "template": "t", "isDraft": false, "isPublished": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Campaign needs to be a Draft");

        let (status, body) = send(&h.app, "GET", "/public/campaign/1", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NOT_PUBLISHED");

        let (status, body) = send(&h.app, "GET", "/admin/campaign/99", admin, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Campaign with Id 99 not found");

        let (status, body) = send(&h.app, "GET", "/admin/campaign?campaign_state=draft", admin, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&h.app, "DELETE", "/admin/campaign/1", admin, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&h.app, "GET", "/admin/campaign/1", admin, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_routes_require_admin_role() {
        let h = harness();

        let (status, body) = send(&h.app, "GET", "/admin/campaign", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "NOT_AUTHENTICATED");

        let (status, _) = send(&h.app, "GET", "/admin/campaign", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = donor(&h.app, "ljd", "ljd@hotmail.com").await;
        let (status, body) = send(&h.app, "GET", "/admin/campaign", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Unauthorized access");
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let h = harness();
        donor(&h.app, "ljd", "ljd@hotmail.com").await;

        let (status, body) = send(
            &h.app,
            "POST",
            "/user/register",
            None,
            Some(json!({ "name": "other", "email": "ljd@hotmail.com", "password": "hunter2hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Email already registered");

        let (status, _) = send(
            &h.app,
            "POST",
            "/user/register",
            None,
            Some(json!({ "name": "short", "email": "short@example.com", "password": "abc" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &h.app,
            "POST",
            "/user/login",
            None,
            Some(json!({ "email": "ljd@hotmail.com", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Invalid email or password");
    }

    #[tokio::test]
    async fn test_concurrent_registrations_with_one_email() {
        let h = harness();
        let app = &h.app;
        let sign_up = move |name: &'static str| {
            send(
                app,
                "POST",
                "/user/register",
                None,
                Some(json!({ "name": name, "email": "twin@example.com", "password": "hunter2hunter2" })),
            )
        };

        let ((first, _), (second, _)) = tokio::join!(sign_up("twin-a"), sign_up("twin-b"));
        let mut statuses = [first, second];
        statuses.sort();
        assert_eq!(statuses, [StatusCode::CREATED, StatusCode::BAD_REQUEST]);

        let (status, body) = sign_up("twin-c").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Email already registered");
    }

    #[tokio::test]
    async fn test_admin_email_receives_admin_role() {
        let h = harness();
        let token = donor(&h.app, "ops", "ops@kindred.org").await;
        let (status, _) = send(&h.app, "GET", "/admin/refunds", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_payment_records_provider_reference() {
        let h = harness();
        let token = donor(&h.app, "ljd", "ljd@hotmail.com").await;

        let (status, body) = send(
            &h.app,
            "POST",
            "/user/payment",
            Some(&token),
            Some(json!({ "payment_method": "paypal", "amount": 40 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["provider_id"], "PAY-1");
        assert_eq!(body["payment_method"], "paypal");
        assert_eq!(body["redirect_url"], "https://pay.test/approve");

        let (status, _) = send(
            &h.app,
            "POST",
            "/user/payment",
            Some(&token),
            Some(json!({ "payment_method": "paypal", "amount": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        h.gateway.set_failing(true);
        let (status, body) = send(
            &h.app,
            "POST",
            "/user/payment",
            Some(&token),
            Some(json!({ "payment_method": "paypal", "amount": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "GATEWAY_FAILURE");

        let (status, body) = send(&h.app, "GET", "/user/payments", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let payments = body.as_array().unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0]["provider_id"], "PAY-1");
        assert!(payments[0]["redirect_url"].is_null());
    }

    #[tokio::test]
    async fn test_sub_cent_amounts_rejected() {
        let h = harness();
        let token = donor(&h.app, "ljd", "ljd@hotmail.com").await;

        let (status, body) = send(
            &h.app,
            "POST",
            "/user/payment",
            Some(&token),
            Some(json!({ "payment_method": "paypal", "amount": 10.005 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Payment amount must have at most two decimal places");
        assert_eq!(h.gateway.payments.load(Ordering::SeqCst), 0);

        let payment_id = pay(&h.app, &token, 40).await;
        let (status, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&token),
            Some(json!({ "payment_id": payment_id, "amount": 0.001 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PRECISION");

        let (_, body) = send(&h.app, "GET", "/admin/refunds", Some(h.admin_token.as_str()), None).await;
        assert!(body.as_array().unwrap().is_empty());

        let (status, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&token),
            Some(json!({ "payment_id": payment_id, "amount": 12.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["refund"]["amount"].as_f64(), Some(12.5));
    }

    #[tokio::test]
    async fn test_refund_request_validation() {
        let h = harness();
        let alice = donor(&h.app, "alice", "alice@example.com").await;
        let bob = donor(&h.app, "bob", "bob@example.com").await;
        let payment_id = pay(&h.app, &alice, 40).await;

        let (status, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&alice),
            Some(json!({ "payment_id": payment_id, "amount": 50 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Refund amount exceeds the original payment");

        let (status, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&bob),
            Some(json!({ "payment_id": payment_id, "amount": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PAYMENT_NOT_FOUND");

        let (status, _) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            None,
            Some(json!({ "payment_id": payment_id, "amount": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refund_approval_survives_gateway_failure() {
        let h = harness();
        let admin = Some(h.admin_token.as_str());
        let alice = donor(&h.app, "alice", "alice@example.com").await;
        let payment_id = pay(&h.app, &alice, 40).await;

        let (status, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&alice),
            Some(json!({ "payment_id": payment_id, "amount": 25 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["refund"]["status"], "pending");
        assert_eq!(body["refund"]["amount"].as_f64(), Some(25.0));
        let refund_id = body["refund"]["id"].as_i64().unwrap();
        let approve = format!("/admin/manage-refund/{}?decision=approve", refund_id);

        h.gateway.set_failing(true);
        let (status, _) = send(&h.app, "POST", &approve, admin, None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = send(&h.app, "GET", "/admin/refunds?status=pending", admin, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        h.gateway.set_failing(false);
        let (status, body) = send(&h.app, "POST", &approve, admin, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refund"]["status"], "approved");
        assert_eq!(body["refund"]["admin_approved"], true);
        assert_eq!(h.gateway.refunds.load(Ordering::SeqCst), 1);

        let (status, body) = send(&h.app, "POST", &approve, admin, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ALREADY_PROCESSED");
        assert_eq!(h.gateway.refunds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refund_rejection_and_bad_decision() {
        let h = harness();
        let admin = Some(h.admin_token.as_str());
        let alice = donor(&h.app, "alice", "alice@example.com").await;
        let payment_id = pay(&h.app, &alice, 40).await;

        let (_, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&alice),
            Some(json!({ "payment_id": payment_id, "amount": 40 })),
        )
        .await;
        let refund_id = body["refund"]["id"].as_i64().unwrap();

        let (status, body) = send(
            &h.app,
            "POST",
            &format!("/admin/manage-refund/{}?decision=maybe", refund_id),
            admin,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid decision. Choose 'approve' or 'reject'.");

        let (status, body) = send(
            &h.app,
            "POST",
            &format!("/admin/manage-refund/{}?decision=reject", refund_id),
            admin,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refund"]["status"], "rejected");
        assert_eq!(body["message"], "Refund request has been rejected.");
        assert_eq!(h.gateway.refunds.load(Ordering::SeqCst), 0);

        let (status, _) = send(&h.app, "POST", "/admin/manage-refund/999?decision=approve", admin, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_concurrent_approvals_refund_once() {
        let h = harness();
        let admin = Some(h.admin_token.as_str());
        let alice = donor(&h.app, "alice", "alice@example.com").await;
        let payment_id = pay(&h.app, &alice, 40).await;

        let (_, body) = send(
            &h.app,
            "POST",
            "/donor/request-refund",
            Some(&alice),
            Some(json!({ "payment_id": payment_id, "amount": 25 })),
        )
        .await;
        let refund_id = body["refund"]["id"].as_i64().unwrap();
        let approve = format!("/admin/manage-refund/{}?decision=approve", refund_id);

        h.gateway.set_slow(true);
        let ((first, first_body), (second, second_body)) = tokio::join!(
            send(&h.app, "POST", &approve, admin, None),
            send(&h.app, "POST", &approve, admin, None),
        );

        assert_eq!(h.gateway.refunds.load(Ordering::SeqCst), 1);
        let (won, lost) = if first == StatusCode::OK {
            (first_body, (second, second_body))
        } else {
            (second_body, (first, first_body))
        };
        assert_eq!(won["refund"]["status"], "approved");
        assert_eq!(lost.0, StatusCode::BAD_REQUEST);
        assert_eq!(lost.1["code"], "ALREADY_PROCESSED");
    }
}
