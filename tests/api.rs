//! End-to-end tests driving the full router against a temporary SQLite
//! database and the in-process cache backend.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mon_panier_local::{
    app,
    config::{CacheTtls, Config},
    models::ProducerCreate,
    state::AppState,
};

const PARIS: (f64, f64) = (48.8566, 2.3522);
const LYON: (f64, f64) = (45.7640, 4.8357);

struct TestApp {
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            port: 0,
            database_url: format!("sqlite://{}", dir.path().join("test.db").display()),
            redis_url: None,
            media_dir: dir.path().join("media"),
            jwt_secret: "integration-test-secret".into(),
            jwt_lifetime_hours: 1,
            page_size: 20,
            max_upload_bytes: 1024 * 1024,
            allowed_image_extensions: vec![
                "jpg".into(),
                "jpeg".into(),
                "png".into(),
                "webp".into(),
            ],
            ttl: CacheTtls {
                producers_list: 300,
                producers_nearby: 300,
                producer_detail: 600,
                categories_list: 3600,
            },
        };
        let state = AppState::from_config(config).await.expect("state");
        Self { state, _dir: dir }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn request_raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body)).unwrap();

        let response = app(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Registers a user and returns (token, user id).
    async fn signup(&self, email: &str) -> (String, i64) {
        let (status, body) = self
            .request(
                "POST",
                "/api/auth/register/",
                None,
                Some(json!({ "email": email, "password": "grelinette", "is_producer": true })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let user_id = body["user"]["id"].as_i64().unwrap();

        let (status, body) = self
            .request(
                "POST",
                "/api/auth/login/",
                None,
                Some(json!({ "email": email, "password": "grelinette" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (body["access"].as_str().unwrap().to_string(), user_id)
    }

    async fn create_producer(
        &self,
        token: &str,
        name: &str,
        category: &str,
        (latitude, longitude): (f64, f64),
    ) -> i64 {
        let (status, body) = self
            .request(
                "POST",
                "/api/producers/",
                Some(token),
                Some(json!({
                    "name": name,
                    "category": category,
                    "address": "1 rue du Marché",
                    "latitude": latitude,
                    "longitude": longitude,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create producer failed: {body}");
        body["id"].as_i64().unwrap()
    }
}

fn multipart_image(filename: &str, payload: &[u8]) -> (String, Vec<u8>) {
    let boundary = "xTestBoundary7MA4YWxkTrZu0gW";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image_file\"; \
             filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// ---------------------------------------------------------------------------
// Health and operational endpoints

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let (status, body) = app.request("GET", "/api/health/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.request("GET", "/api/health/ready/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["cache"], "connected");
}

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let app = TestApp::new().await;

    app.request("GET", "/api/producers/", None, None).await;
    app.request("GET", "/api/producers/", None, None).await;

    let (status, body) = app.request("GET", "/api/cache/stats/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"]["backend"], "memory");
    assert_eq!(body["cache"]["hits"].as_u64().unwrap(), 1);
    assert_eq!(body["cache"]["misses"].as_u64().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Auth

#[tokio::test]
async fn test_register_login_me() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("ferme.lilas@example.org").await;

    let (status, body) = app.request("GET", "/api/auth/me/", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ferme.lilas@example.org");
    assert_eq!(body["is_producer"], true);

    let (status, body) = app.request("GET", "/api/auth/me/", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
}

#[tokio::test]
async fn test_register_validation() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/register/",
            None,
            Some(json!({ "email": "not-an-email", "password": "longenough" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("email"));

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/register/",
            None,
            Some(json!({ "email": "a@b.fr", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("8 characters"));
}

#[tokio::test]
async fn test_duplicate_email_is_constraint_error() {
    let app = TestApp::new().await;
    app.signup("double@example.org").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/register/",
            None,
            Some(json!({ "email": "double@example.org", "password": "grelinette" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This operation violates database constraints.");
}

#[tokio::test]
async fn test_login_bad_password() {
    let app = TestApp::new().await;
    app.signup("fraude@example.org").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/login/",
            None,
            Some(json!({ "email": "fraude@example.org", "password": "wrongwrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password.");
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("motdepasse@example.org").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/change-password/",
            Some(&token),
            Some(json!({ "old_password": "grelinette" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "All fields are required.");

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/change-password/",
            Some(&token),
            Some(json!({
                "old_password": "grelinette",
                "new_password": "serfouette",
                "new_password_confirm": "serfouette"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Old password no longer works, new one does.
    let (status, _) = app
        .request(
            "POST",
            "/api/auth/login/",
            None,
            Some(json!({ "email": "motdepasse@example.org", "password": "grelinette" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/login/",
            None,
            Some(json!({ "email": "motdepasse@example.org", "password": "serfouette" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_account_cascades() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("ephemere@example.org").await;
    let producer_id = app
        .create_producer(&token, "Ferme Éphémère", "maraîchage", PARIS)
        .await;

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/delete-account/",
            Some(&token),
            Some(json!({ "password": "grelinette" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request("GET", &format!("/api/producers/{producer_id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Producer CRUD and ownership

#[tokio::test]
async fn test_producer_crud() {
    let app = TestApp::new().await;
    let (token, user_id) = app.signup("crud@example.org").await;

    let id = app
        .create_producer(&token, "La Ferme des Lilas", "apiculture", PARIS)
        .await;

    let (status, body) = app
        .request("GET", &format!("/api/producers/{id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "La Ferme des Lilas");
    assert_eq!(body["category"], "apiculture");
    assert_eq!(body["user"]["id"].as_i64().unwrap(), user_id);
    assert_eq!(body["photo_count"], 0);

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/producers/{id}/"),
            Some(&token),
            Some(json!({ "name": "Les Ruchers des Lilas" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "Les Ruchers des Lilas");

    let (status, _) = app
        .request("DELETE", &format!("/api/producers/{id}/"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .request("GET", &format!("/api/producers/{id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Producer not found");
}

#[tokio::test]
async fn test_one_profile_per_user() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("unique@example.org").await;
    app.create_producer(&token, "Première Ferme", "élevage", PARIS)
        .await;

    let (status, body) = app
        .request(
            "POST",
            "/api/producers/",
            Some(&token),
            Some(json!({
                "name": "Seconde Ferme",
                "category": "élevage",
                "address": "2 rue du Marché",
                "latitude": PARIS.0,
                "longitude": PARIS.1,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This operation violates database constraints.");
}

#[tokio::test]
async fn test_producer_writes_require_auth_and_ownership() {
    let app = TestApp::new().await;
    let (owner, _) = app.signup("owner@example.org").await;
    let (other, _) = app.signup("other@example.org").await;
    let id = app
        .create_producer(&owner, "Ferme Gardée", "fromagerie", PARIS)
        .await;

    let (status, _) = app
        .request(
            "POST",
            "/api/producers/",
            None,
            Some(json!({
                "name": "Sans Compte",
                "address": "x",
                "latitude": 0.0,
                "longitude": 0.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/producers/{id}/"),
            Some(&other),
            Some(json!({ "name": "Piratée" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("not allowed"));

    let (status, _) = app
        .request("DELETE", &format!("/api/producers/{id}/"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_producer_validation() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("valide@example.org").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/producers/",
            Some(&token),
            Some(json!({
                "name": "Ferme Polaire",
                "address": "x",
                "latitude": 91.0,
                "longitude": 0.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Latitude must be between -90 and 90.");

    let (status, body) = app
        .request(
            "POST",
            "/api/producers/",
            Some(&token),
            Some(json!({
                "name": "F",
                "address": "x",
                "latitude": 0.0,
                "longitude": 0.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("at least 2"));
}

#[tokio::test]
async fn test_producer_list_filters() {
    let app = TestApp::new().await;
    let (a, _) = app.signup("a@example.org").await;
    let (b, _) = app.signup("b@example.org").await;
    let (c, _) = app.signup("c@example.org").await;
    app.create_producer(&a, "Les Ruchers du Nord", "apiculture", PARIS)
        .await;
    app.create_producer(&b, "Potager de la Loire", "maraîchage", LYON)
        .await;
    app.create_producer(&c, "Brasserie du Pont", "brasserie", LYON)
        .await;

    let (status, body) = app.request("GET", "/api/producers/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"].as_i64().unwrap(), 3);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);

    let (_, body) = app
        .request("GET", "/api/producers/?category=apiculture", None, None)
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 1);
    assert_eq!(body["results"][0]["name"], "Les Ruchers du Nord");

    let (_, body) = app
        .request(
            "GET",
            "/api/producers/?categories=apiculture,brasserie",
            None,
            None,
        )
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 2);

    let (_, body) = app
        .request("GET", "/api/producers/?search=Loire", None, None)
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 1);
    assert_eq!(body["results"][0]["name"], "Potager de la Loire");

    let (_, body) = app
        .request("GET", "/api/producers/?ordering=name", None, None)
        .await;
    assert_eq!(body["results"][0]["name"], "Brasserie du Pont");

    let (_, body) = app
        .request("GET", "/api/producers/?page_size=2&page=2", None, None)
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 3);
    assert_eq!(body["results"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Nearby search

#[tokio::test]
async fn test_nearby_paris_lyon() {
    let app = TestApp::new().await;
    let (a, _) = app.signup("paris@example.org").await;
    let (b, _) = app.signup("lyon@example.org").await;
    app.create_producer(&a, "Ferme de Paris", "maraîchage", PARIS)
        .await;
    app.create_producer(&b, "Ferme de Lyon", "maraîchage", LYON)
        .await;

    // 50 km around Paris: only the Paris producer, at distance 0.
    let (status, body) = app
        .request(
            "GET",
            &format!(
                "/api/producers/nearby/?latitude={}&longitude={}&radius_km=50",
                PARIS.0, PARIS.1
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"].as_i64().unwrap(), 1);
    assert_eq!(body["results"][0]["name"], "Ferme de Paris");
    assert!(body["distances"][0].as_f64().unwrap() < 0.001);

    // 1000 km: both, nearest first, Lyon at ~392 km.
    let (_, body) = app
        .request(
            "GET",
            &format!(
                "/api/producers/nearby/?latitude={}&longitude={}&radius_km=1000",
                PARIS.0, PARIS.1
            ),
            None,
            None,
        )
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 2);
    assert_eq!(body["results"][0]["name"], "Ferme de Paris");
    assert_eq!(body["results"][1]["name"], "Ferme de Lyon");
    let distances: Vec<f64> = body["distances"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_f64().unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert!((distances[1] - 392.0).abs() < 5.0);
}

#[tokio::test]
async fn test_nearby_requires_coordinates() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request("GET", "/api/producers/nearby/?longitude=2.35", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "The latitude and longitude parameters are required."
    );

    let (status, _) = app.request("GET", "/api/producers/nearby/", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nearby_rejects_bad_parameters() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            "GET",
            "/api/producers/nearby/?latitude=48.85&longitude=2.35&radius_km=2000",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Radius must be between 0 and 1000 km.");

    let (status, _) = app
        .request(
            "GET",
            "/api/producers/nearby/?latitude=48.85&longitude=2.35&radius_km=0",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            "GET",
            "/api/producers/nearby/?latitude=91&longitude=2.35",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Latitude must be between -90 and 90.");

    let (status, _) = app
        .request(
            "GET",
            "/api/producers/nearby/?latitude=abc&longitude=2.35",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_nearby_category_filter() {
    let app = TestApp::new().await;
    let (a, _) = app.signup("miel@example.org").await;
    let (b, _) = app.signup("legumes@example.org").await;
    app.create_producer(&a, "Ruchers de Montmartre", "apiculture", PARIS)
        .await;
    app.create_producer(&b, "Potager de Belleville", "maraîchage", (48.87, 2.38))
        .await;

    let (_, body) = app
        .request(
            "GET",
            &format!(
                "/api/producers/nearby/?latitude={}&longitude={}&categories=apiculture",
                PARIS.0, PARIS.1
            ),
            None,
            None,
        )
        .await;
    assert_eq!(body["count"].as_i64().unwrap(), 1);
    assert_eq!(body["results"][0]["name"], "Ruchers de Montmartre");
}

// ---------------------------------------------------------------------------
// Caching behavior

#[tokio::test]
async fn test_list_cache_serves_stale_until_cleared() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("cache1@example.org").await;
    app.create_producer(&token, "Ferme Visible", "autre", PARIS)
        .await;

    let (_, first) = app.request("GET", "/api/producers/", None, None).await;
    assert_eq!(first["count"].as_i64().unwrap(), 1);

    // Write through the repository directly: no invalidation happens,
    // so the cached page must keep serving the old result.
    let (_, user_id) = app.signup("cache2@example.org").await;
    let create = ProducerCreate {
        name: "Ferme Fantôme".into(),
        description: String::new(),
        category: Default::default(),
        address: "2 rue du Marché".into(),
        latitude: PARIS.0,
        longitude: PARIS.1,
        phone: String::new(),
        email_contact: String::new(),
        website: String::new(),
        opening_hours: String::new(),
    };
    app.state
        .producers
        .create(user_id, &create, PARIS.0, PARIS.1)
        .await
        .unwrap();

    let (_, second) = app.request("GET", "/api/producers/", None, None).await;
    assert_eq!(second, first, "cached response must be byte-identical");

    let (status, _) = app.request("POST", "/api/cache/clear/", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, third) = app.request("GET", "/api/producers/", None, None).await;
    assert_eq!(third["count"].as_i64().unwrap(), 2);
}

#[tokio::test]
async fn test_write_invalidates_detail_and_list() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("inval@example.org").await;
    let id = app
        .create_producer(&token, "Ancien Nom", "autre", PARIS)
        .await;

    // Prime both caches.
    app.request("GET", &format!("/api/producers/{id}/"), None, None)
        .await;
    app.request("GET", "/api/producers/", None, None).await;

    let (status, _) = app
        .request(
            "PATCH",
            &format!("/api/producers/{id}/"),
            Some(&token),
            Some(json!({ "name": "Nouveau Nom" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = app
        .request("GET", &format!("/api/producers/{id}/"), None, None)
        .await;
    assert_eq!(detail["name"], "Nouveau Nom");

    let (_, list) = app.request("GET", "/api/producers/", None, None).await;
    assert_eq!(list["results"][0]["name"], "Nouveau Nom");
}

// ---------------------------------------------------------------------------
// Sale modes

#[tokio::test]
async fn test_sale_mode_lifecycle() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("vente@example.org").await;
    let producer_id = app
        .create_producer(&token, "Ferme des Ventes", "élevage", PARIS)
        .await;

    // phone_order without a phone number is rejected.
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            Some(&token),
            Some(json!({
                "mode_type": "phone_order",
                "title": "Commande par téléphone"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "A phone number is required for phone orders.");

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            Some(&token),
            Some(json!({
                "mode_type": "on_site",
                "title": "Vente à la ferme",
                "instructions": "Apportez vos contenants",
                "order": 1,
                "opening_hours": [
                    { "day_of_week": 0, "opening_time": "09:00", "closing_time": "12:00" },
                    { "day_of_week": 6, "is_closed": true }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let mode_id = body["id"].as_i64().unwrap();
    assert_eq!(body["opening_hours"].as_array().unwrap().len(), 2);
    assert_eq!(body["opening_hours"][0]["opening_time"], "09:00");

    // Duplicate day in one payload.
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            Some(&token),
            Some(json!({
                "mode_type": "market",
                "title": "Marché de Savenay",
                "opening_hours": [
                    { "day_of_week": 2, "opening_time": "08:00", "closing_time": "13:00" },
                    { "day_of_week": 2, "is_closed": true }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only one opening hours entry is allowed per day.");

    // Open day must carry both times, in order.
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            Some(&token),
            Some(json!({
                "mode_type": "market",
                "title": "Marché inversé",
                "opening_hours": [
                    { "day_of_week": 3, "opening_time": "15:00", "closing_time": "09:00" }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nested in the producer detail.
    let (_, detail) = app
        .request("GET", &format!("/api/producers/{producer_id}/"), None, None)
        .await;
    assert_eq!(detail["sale_modes"].as_array().unwrap().len(), 1);
    assert_eq!(detail["sale_modes"][0]["title"], "Vente à la ferme");

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/sale-modes/{mode_id}/"),
            Some(&token),
            Some(json!({ "title": "Vente au portail" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["title"], "Vente au portail");
    assert_eq!(body["opening_hours"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/sale-modes/{mode_id}/"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = app
        .request(
            "GET",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            None,
            None,
        )
        .await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_sale_mode_ownership() {
    let app = TestApp::new().await;
    let (owner, _) = app.signup("modeowner@example.org").await;
    let (other, _) = app.signup("modeother@example.org").await;
    let producer_id = app
        .create_producer(&owner, "Ferme Protégée", "élevage", PARIS)
        .await;

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/sale-modes/"),
            Some(&other),
            Some(json!({ "mode_type": "on_site", "title": "Intrusion" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Products

#[tokio::test]
async fn test_categories_are_seeded() {
    let app = TestApp::new().await;

    let (status, body) = app.request("GET", "/api/categories/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let categories = body.as_array().unwrap();
    assert_eq!(categories.len(), 8);
    assert_eq!(categories[0]["name"], "legumes");
    assert_eq!(categories[0]["display_name"], "Légumes");
}

#[tokio::test]
async fn test_product_lifecycle() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("produits@example.org").await;
    let producer_id = app
        .create_producer(&token, "Ferme aux Produits", "maraîchage", PARIS)
        .await;

    let (_, categories) = app.request("GET", "/api/categories/", None, None).await;
    let category_id = categories[0]["id"].as_i64().unwrap();

    // Custom availability needs both months.
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/products/"),
            Some(&token),
            Some(json!({
                "name": "Fraises",
                "availability_type": "custom",
                "availability_start_month": 5
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("months"));

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/products/"),
            Some(&token),
            Some(json!({
                "name": "Fraises gariguette",
                "description": "Barquettes de 500g",
                "category_id": category_id,
                "availability_type": "custom",
                "availability_start_month": 5,
                "availability_end_month": 7
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let product_id = body["id"].as_i64().unwrap();
    assert_eq!(body["category"]["id"].as_i64().unwrap(), category_id);
    assert_eq!(body["producer"]["id"].as_i64().unwrap(), producer_id);

    // Unknown category is a validation error.
    let (status, body) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/products/"),
            Some(&token),
            Some(json!({ "name": "Mystère", "category_id": 9999 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown product category.");

    // Nested under the producer detail.
    let (_, detail) = app
        .request("GET", &format!("/api/producers/{producer_id}/"), None, None)
        .await;
    assert_eq!(detail["products"].as_array().unwrap().len(), 1);
    assert_eq!(detail["products"][0]["name"], "Fraises gariguette");

    // Switching back to all-year clears the month fields.
    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/products/{product_id}/"),
            Some(&token),
            Some(json!({ "availability_type": "all_year" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["availability_type"], "all_year");
    assert!(body["availability_start_month"].is_null());

    let (status, _) = app
        .request(
            "DELETE",
            &format!("/api/products/{product_id}/"),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request("GET", &format!("/api/products/{product_id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Photos

#[tokio::test]
async fn test_producer_photo_upload_and_delete() {
    let app = TestApp::new().await;
    let (owner, _) = app.signup("photo@example.org").await;
    let (other, _) = app.signup("photothief@example.org").await;
    let producer_id = app
        .create_producer(&owner, "Ferme en Images", "autre", PARIS)
        .await;

    let (content_type, body) = multipart_image("ferme.jpg", b"not-really-a-jpeg");
    let (status, photo) = app
        .request_raw(
            "POST",
            &format!("/api/producers/{producer_id}/photos/"),
            Some(&owner),
            &content_type,
            body,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{photo}");
    let photo_id = photo["id"].as_i64().unwrap();
    assert!(photo["image_file"]
        .as_str()
        .unwrap()
        .starts_with("/media/producers/"));

    let (_, detail) = app
        .request("GET", &format!("/api/producers/{producer_id}/"), None, None)
        .await;
    assert_eq!(detail["photo_count"].as_i64().unwrap(), 1);

    let (status, _) = app
        .request("DELETE", &format!("/api/photos/{photo_id}/"), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request("DELETE", &format!("/api/photos/{photo_id}/"), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_photo_extension_rejected() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("gif@example.org").await;
    let producer_id = app
        .create_producer(&token, "Ferme sans GIF", "autre", PARIS)
        .await;

    let (content_type, body) = multipart_image("anim.gif", b"GIF89a");
    let (status, response) = app
        .request_raw(
            "POST",
            &format!("/api/producers/{producer_id}/photos/"),
            Some(&token),
            &content_type,
            body,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("gif"));
}

#[tokio::test]
async fn test_product_photo_cap() {
    let app = TestApp::new().await;
    let (token, _) = app.signup("cap@example.org").await;
    let producer_id = app
        .create_producer(&token, "Ferme Plafond", "autre", PARIS)
        .await;

    let (status, product) = app
        .request(
            "POST",
            &format!("/api/producers/{producer_id}/products/"),
            Some(&token),
            Some(json!({ "name": "Confiture" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_i64().unwrap();

    for i in 0..5 {
        let (content_type, body) = multipart_image(&format!("pot{i}.jpg"), b"jpegbytes");
        let (status, response) = app
            .request_raw(
                "POST",
                &format!("/api/products/{product_id}/photos/"),
                Some(&token),
                &content_type,
                body,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "photo {i}: {response}");
    }

    let (content_type, body) = multipart_image("pot5.jpg", b"jpegbytes");
    let (status, response) = app
        .request_raw(
            "POST",
            &format!("/api/products/{product_id}/photos/"),
            Some(&token),
            &content_type,
            body,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response["error"],
        "The maximum number of photos (5) has been reached for this product."
    );
}
