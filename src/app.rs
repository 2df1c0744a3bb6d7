use std::net::SocketAddr;

use axum::{middleware, Router};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::auth::guard::session_middleware;
use crate::config::AppConfig;
use crate::state::AppState;
use crate::{auth, events, export, pages, photos, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(pages::router())
        .merge(events::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(photos::router())
        .merge(export::router())
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{jwt::JwtKeys, local::LocalIdentity, session::stub::StubHosted},
        config::AppConfig,
        storage::MemoryStorage,
        users::{
            memory::{MemoryUserRepository, DEMO_ADMIN_ID, DEMO_PASSWORD, DEMO_USER_EMAIL, DEMO_USER_ID},
            model::Role,
        },
    };

    fn session_for(state: &AppState, id: &str, role: Role) -> String {
        let token = JwtKeys::from(&state.config.jwt).sign(id, role).unwrap();
        format!("auth-token={token}")
    }

    async fn send(state: &AppState, req: Request<Body>) -> Response {
        build_app(state.clone()).oneshot(req).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut b = Request::builder().uri(uri);
        if let Some(c) = cookie {
            b = b.header(header::COOKIE, c);
        }
        b.body(Body::empty()).unwrap()
    }

    fn with_json(method: Method, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut b = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(c) = cookie {
            b = b.header(header::COOKIE, c);
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    fn photo_upload(cookie: Option<&str>, file_name: &str, content_type: &str, size: usize) -> Request<Body> {
        let boundary = "alumni-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat(0xAB).take(size));
        body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());

        let mut b = Request::builder()
            .method(Method::POST)
            .uri("/api/upload/photo")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"));
        if let Some(c) = cookie {
            b = b.header(header::COOKIE, c);
        }
        b.body(Body::from(body)).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn health_and_events_are_public() {
        let state = AppState::fake();
        let resp = send(&state, get("/health", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&state, get("/api/events", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["events"].as_array().unwrap().len(), 4);

        let home = json_body(send(&state, get("/", None)).await).await;
        assert_eq!(home["featuredEvent"]["id"], 1);
        assert_eq!(home["registration"]["availableSlots"], 999);
    }

    #[tokio::test]
    async fn anonymous_page_request_redirects_home() {
        let state = AppState::fake();
        let resp = send(&state, get("/my-registrations", None)).await;
        assert!(resp.status().is_redirection());
        assert_eq!(location(&resp), "/?error=authentication_required");

        let resp = send(&state, get("/my-registrations", Some("auth-token=forged.token.value"))).await;
        assert_eq!(location(&resp), "/?error=authentication_required");
    }

    #[tokio::test]
    async fn member_is_kept_out_of_admin_pages() {
        let state = AppState::fake();
        let member = session_for(&state, DEMO_USER_ID, Role::User);

        let resp = send(&state, get("/admin", Some(&member))).await;
        assert!(resp.status().is_redirection());
        assert_eq!(location(&resp), "/events?error=admin_access_required");

        let resp = send(&state, get("/my-registrations", Some(&member))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["user"]["id"], DEMO_USER_ID);

        let admin = session_for(&state, DEMO_ADMIN_ID, Role::Admin);
        let resp = send(&state, get("/admin", Some(&admin))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["stats"]["totalUsers"], 1);
    }

    fn set_cookies(resp: &Response) -> Vec<String> {
        resp.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn rotated_hosted_tokens_are_written_back() {
        let state = AppState::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserRepository::seeded()),
            Arc::new(StubHosted),
            Arc::new(MemoryStorage::new("http://localhost/storage")),
        );
        let stale = "hb-access-token=stale; hb-refresh-token=good-refresh";

        let resp = send(&state, get("/my-registrations", Some(stale))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cookies = set_cookies(&resp);
        assert!(cookies.iter().any(|c| c.starts_with("hb-access-token=new-access;")), "{cookies:?}");
        assert!(cookies.iter().any(|c| c.starts_with("hb-refresh-token=new-refresh;")), "{cookies:?}");
        assert_eq!(json_body(resp).await["user"]["id"], DEMO_USER_ID);

        // the refreshed member is still redirected away from admin pages
        let resp = send(&state, get("/admin", Some(stale))).await;
        assert!(resp.status().is_redirection());
        assert_eq!(location(&resp), "/events?error=admin_access_required");
        let cookies = set_cookies(&resp);
        assert!(cookies.iter().any(|c| c.starts_with("hb-access-token=new-access;")), "{cookies:?}");
        assert!(cookies.iter().any(|c| c.starts_with("hb-refresh-token=new-refresh;")), "{cookies:?}");

        let resp = send(&state, get("/my-registrations", Some("hb-access-token=stale"))).await;
        assert!(resp.status().is_redirection());
        assert!(set_cookies(&resp).is_empty());
    }

    #[tokio::test]
    async fn api_routes_answer_with_json_errors() {
        let state = AppState::fake();
        let resp = send(&state, get("/api/auth/me", None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["success"], false);

        let member = session_for(&state, DEMO_USER_ID, Role::User);
        let resp = send(&state, get("/api/users", Some(&member))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(resp).await["error"], "Admin access required");
    }

    #[tokio::test]
    async fn login_sets_session_cookie_usable_for_me() {
        let state = AppState::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserRepository::seeded()),
            Arc::new(LocalIdentity::seeded().unwrap()),
            Arc::new(MemoryStorage::new("http://localhost/storage")),
        );

        let bad = json!({ "email": DEMO_USER_EMAIL, "password": "wrong-password" });
        let resp = send(&state, with_json(Method::POST, "/api/auth/login", None, bad)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let good = json!({ "email": DEMO_USER_EMAIL, "password": DEMO_PASSWORD });
        let resp = send(&state, with_json(Method::POST, "/api/auth/login", None, good)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("auth-token="));
        assert!(set_cookie.contains("Max-Age=86400"));
        let cookie = set_cookie.split(';').next().unwrap().to_string();

        let resp = send(&state, get("/api/auth/me", Some(&cookie))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["user"]["email"], DEMO_USER_EMAIL);

        let resp = send(&state, with_json(Method::POST, "/api/auth/logout", Some(&cookie), json!({}))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let cleared: Vec<_> = resp.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cleared.len(), 3);
    }

    #[tokio::test]
    async fn registration_then_admin_listing() {
        let state = AppState::fake();
        let form = json!({
            "name": "Sunita Desai",
            "email": "sunita.desai@example.com",
            "password": "alumni-2001",
            "batch": "1996-2001",
            "yearOfPassing": "2001"
        });
        let resp = send(&state, with_json(Method::POST, "/api/users", None, form.clone())).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = json_body(resp).await;
        assert!(created["user"]["uniqueId"].as_str().unwrap().starts_with("ALM-"));

        let resp = send(&state, with_json(Method::POST, "/api/users", None, form)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(resp).await["error"], "User with this email already exists.");

        let admin = session_for(&state, DEMO_ADMIN_ID, Role::Admin);
        let listing = json_body(send(&state, get("/api/users", Some(&admin))).await).await;
        assert_eq!(listing["total"], 3);
        assert_eq!(listing["users"][0]["email"], "sunita.desai@example.com");

        let stats = json_body(send(&state, get("/api/auth/stats", Some(&admin))).await).await;
        assert_eq!(stats["stats"]["totalUsers"], 2);
        assert_eq!(stats["stats"]["availableSlots"], 998);
    }

    #[tokio::test]
    async fn status_updates_validate_input() {
        let state = AppState::fake();
        let admin = session_for(&state, DEMO_ADMIN_ID, Role::Admin);

        let resp = send(
            &state,
            with_json(Method::PATCH, "/api/users/user-1/status", Some(&admin), json!({ "status": "banned" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "Invalid status");

        let resp = send(
            &state,
            with_json(Method::PATCH, "/api/users/nobody/status", Some(&admin), json!({ "status": "active" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(
            &state,
            with_json(Method::PATCH, "/api/users/user-1/status", Some(&admin), json!({ "status": "suspended" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let stats = state.users.stats().await.unwrap();
        assert_eq!(stats.suspended_users, 1);
    }

    #[tokio::test]
    async fn photo_upload_enforces_size_and_type() {
        let state = AppState::fake();
        let member = session_for(&state, DEMO_USER_ID, Role::User);

        let resp = send(&state, photo_upload(Some(&member), "big.jpg", "image/jpeg", 6 * 1024 * 1024)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "File size must be less than 5MB");

        let resp = send(&state, photo_upload(Some(&member), "scan.bmp", "image/bmp", 1024 * 1024)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&state, photo_upload(Some(&member), "class.jpg", "image/jpeg", 4 * 1024 * 1024)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let path = body["data"]["path"].as_str().unwrap().to_string();
        assert!(path.starts_with("users/user-1/user-user-1-"));
        assert_eq!(body["data"]["fileSize"], 4 * 1024 * 1024);

        let listed = json_body(send(&state, get("/api/upload/photo", Some(&member))).await).await;
        assert_eq!(listed["photos"][0]["path"], path.as_str());

        let served = send(&state, get(&format!("/storage/{path}"), None)).await;
        assert_eq!(served.status(), StatusCode::OK);
        assert_eq!(served.headers().get(header::CONTENT_TYPE).unwrap(), "image/jpeg");

        let foreign = Request::builder()
            .method(Method::DELETE)
            .uri("/api/upload/photo?path=users/admin-1/x.jpg")
            .header(header::COOKIE, &member)
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&state, foreign).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn anonymous_upload_lands_in_public() {
        let state = AppState::fake();
        let resp = send(&state, photo_upload(None, "pic.png", "image/png", 2048)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert!(body["data"]["path"].as_str().unwrap().starts_with("public/photo-"));
    }

    #[tokio::test]
    async fn csv_export_for_admins() {
        let state = AppState::fake();
        let admin = session_for(&state, DEMO_ADMIN_ID, Role::Admin);

        let resp = send(&state, get("/api/export/users", Some(&admin))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/csv");
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disposition.contains("user-registrations-"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("ID,Unique ID,Email,Name,Role,"));
        assert_eq!(text.lines().count(), 3);

        let resp = send(&state, get("/api/export/users?schema=summary", Some(&admin))).await;
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disposition.contains("alumni-users-"));

        let filtered = json!({ "filters": { "status": "suspended" }, "format": "csv" });
        let resp = send(&state, with_json(Method::POST, "/api/export/users", Some(&admin), filtered)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let as_json = json!({ "filters": { "role": "user" }, "format": "json" });
        let resp = send(&state, with_json(Method::POST, "/api/export/users", Some(&admin), as_json)).await;
        let body = json_body(resp).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["id"], DEMO_USER_ID);
    }

    #[tokio::test]
    async fn oauth_is_unavailable_without_hosted_backend() {
        let state = AppState::fake();
        let resp = send(&state, with_json(Method::POST, "/api/auth/google", None, json!({}))).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = send(&state, get("/auth/callback", None)).await;
        assert!(location(&resp).starts_with("/?error=no_auth_code&details="));

        let resp = send(&state, get("/auth/callback?code=abc", None)).await;
        assert!(location(&resp).starts_with("/?error=oauth_unavailable"));

        let resp = send(&state, get("/auth/callback?error=access_denied&error_description=User%20cancelled", None)).await;
        assert_eq!(location(&resp), "/?error=oauth_provider_error&details=User%20cancelled");

        let status = json_body(send(&state, get("/api/connection/status", None)).await).await;
        assert_eq!(status["enabled"], false);
    }
}
