//! Мок сервера жалоб для интеграционных тестов, работает в том же процессе.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{Duration, Utc};
use complaint_client::{Complaint, ComplaintStatus, Role};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};

const SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const REFRESH_STALL: StdDuration = StdDuration::from_secs(3);

#[derive(Debug, Clone)]
pub struct MockUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Serialize)]
struct MockClaims<'a> {
    user_id: i64,
    username: &'a str,
    role: Role,
    exp: i64,
    jti: u64,
}

#[derive(Debug, Default)]
pub struct Backend {
    pub users: Vec<MockUser>,
    pub access_tokens: HashMap<String, usize>,
    pub refresh_tokens: HashMap<String, usize>,
    pub complaints: Vec<Complaint>,
    pub refresh_calls: usize,
    pub rotate_refresh: bool,
    pub reject_every_access: bool,
    /// Refresh отвечает только через `REFRESH_STALL`, дольше таймаута клиента.
    pub stall_refresh: bool,
    /// (путь, bearer token) каждого запроса к защищённым эндпоинтам.
    pub seen: Vec<(String, String)>,
    /// Сырая query-строка последнего запроса к `/api/complaints/all/`.
    pub last_all_query: Option<Option<String>>,
    token_seq: u64,
}

impl Backend {
    fn mint(&mut self, user_idx: usize) -> String {
        self.token_seq += 1;
        let user = &self.users[user_idx];
        let claims = MockClaims {
            user_id: user.id,
            username: &user.username,
            role: user.role,
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
            jti: self.token_seq,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("token must encode")
    }

    fn issue_access(&mut self, user_idx: usize) -> String {
        let token = self.mint(user_idx);
        self.access_tokens.insert(token.clone(), user_idx);
        token
    }

    fn issue_refresh(&mut self, user_idx: usize) -> String {
        self.token_seq += 1;
        let token = format!("refresh-{}-{}", user_idx, self.token_seq);
        self.refresh_tokens.insert(token.clone(), user_idx);
        token
    }

    /// Все выданные access token считаются истёкшими.
    pub fn expire_access_tokens(&mut self) {
        self.access_tokens.clear();
    }

    pub fn revoke_refresh_tokens(&mut self) {
        self.refresh_tokens.clear();
    }

    pub fn seen_for(&self, path: &str) -> Vec<String> {
        self.seen
            .iter()
            .filter(|(seen_path, _)| seen_path == path)
            .map(|(_, token)| token.clone())
            .collect()
    }
}

pub type Shared = Arc<Mutex<Backend>>;

pub struct MockServer {
    pub base_url: String,
    backend: Shared,
}

impl MockServer {
    pub fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend.lock().expect("backend lock")
    }
}

pub fn seeded_backend() -> Backend {
    Backend {
        users: vec![
            MockUser {
                id: 1,
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "alice-pass".to_string(),
                role: Role::Citizen,
            },
            MockUser {
                id: 2,
                username: "olga".to_string(),
                email: "olga@example.com".to_string(),
                password: "olga-pass".to_string(),
                role: Role::Officer,
            },
        ],
        ..Backend::default()
    }
}

pub async fn spawn(backend: Backend) -> MockServer {
    let backend: Shared = Arc::new(Mutex::new(backend));

    let app = Router::new()
        .route("/api/users/login/", post(login))
        .route("/api/users/register/", post(register))
        .route("/api/users/token/refresh/", post(refresh))
        .route("/api/complaints/create/", post(create_complaint))
        .route("/api/complaints/my/", get(my_complaints))
        .route("/api/complaints/all/", get(all_complaints))
        .route("/api/complaints/{id}/update/", patch(update_complaint))
        .route("/api/complaints/stats/", get(stats))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener must bind");
    let addr = listener.local_addr().expect("listener has address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server must run");
    });

    MockServer {
        base_url: format!("http://{addr}"),
        backend,
    }
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_authenticated() -> Response {
    reply(
        StatusCode::UNAUTHORIZED,
        json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
    )
}

fn forbidden() -> Response {
    reply(
        StatusCode::FORBIDDEN,
        json!({"detail": "You do not have permission to perform this action."}),
    )
}

fn authorize(backend: &mut Backend, headers: &HeaderMap, path: &str) -> Result<usize, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(not_authenticated)?
        .to_string();
    backend.seen.push((path.to_string(), token.clone()));

    if backend.reject_every_access {
        return Err(not_authenticated());
    }
    backend
        .access_tokens
        .get(&token)
        .copied()
        .ok_or_else(not_authenticated)
}

fn is_staff(backend: &Backend, user_idx: usize) -> bool {
    matches!(backend.users[user_idx].role, Role::Officer | Role::Admin)
}

async fn login(State(backend): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let Some(idx) = backend
        .users
        .iter()
        .position(|user| user.username == username && user.password == password)
    else {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({"message": "Invalid username or password"}),
        );
    };

    let access = backend.issue_access(idx);
    let refresh = backend.issue_refresh(idx);
    let user = &backend.users[idx];
    reply(
        StatusCode::OK,
        json!({
            "message": "Login successful",
            "username": user.username,
            "role": user.role,
            "access": access,
            "refresh": refresh,
        }),
    )
}

async fn register(State(backend): State<Shared>, Json(body): Json<Value>) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let username = body["username"].as_str().unwrap_or_default().to_string();
    let email = body["email"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();

    if backend.users.iter().any(|user| user.username == username) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({"username": ["A user with that username already exists."]}),
        );
    }

    let id = backend.users.len() as i64 + 1;
    backend.users.push(MockUser {
        id,
        username: username.clone(),
        email: email.clone(),
        password,
        role: Role::Citizen,
    });
    reply(
        StatusCode::CREATED,
        json!({"message": "User created successfully", "username": username, "email": email}),
    )
}

async fn refresh(State(shared): State<Shared>, Json(body): Json<Value>) -> Response {
    let stall = {
        let mut backend = shared.lock().expect("backend lock");
        backend.refresh_calls += 1;
        backend.stall_refresh
    };
    if stall {
        tokio::time::sleep(REFRESH_STALL).await;
    }
    let mut backend = shared.lock().expect("backend lock");

    let refresh = body["refresh"].as_str().unwrap_or_default().to_string();
    let Some(idx) = backend.refresh_tokens.get(&refresh).copied() else {
        return reply(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );
    };

    let access = backend.issue_access(idx);
    if backend.rotate_refresh {
        backend.refresh_tokens.remove(&refresh);
        let rotated = backend.issue_refresh(idx);
        return reply(StatusCode::OK, json!({"access": access, "refresh": rotated}));
    }
    reply(StatusCode::OK, json!({"access": access}))
}

async fn create_complaint(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let idx = match authorize(&mut backend, &headers, "/api/complaints/create/") {
        Ok(idx) => idx,
        Err(response) => return response,
    };

    let complaint = Complaint {
        id: backend.complaints.len() as i64 + 1,
        title: body["title"].as_str().unwrap_or_default().to_string(),
        description: body["description"].as_str().unwrap_or_default().to_string(),
        status: ComplaintStatus::Open,
        citizen: backend.users[idx].username.clone(),
        created_at: Utc::now(),
        updated_at: None,
    };
    backend.complaints.push(complaint.clone());
    (StatusCode::CREATED, Json(complaint)).into_response()
}

async fn my_complaints(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let idx = match authorize(&mut backend, &headers, "/api/complaints/my/") {
        Ok(idx) => idx,
        Err(response) => return response,
    };

    let username = backend.users[idx].username.clone();
    let mine: Vec<Complaint> = backend
        .complaints
        .iter()
        .filter(|complaint| complaint.citizen == username)
        .cloned()
        .collect();
    Json(mine).into_response()
}

async fn all_complaints(
    State(backend): State<Shared>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    backend.last_all_query = Some(query.clone());
    let idx = match authorize(&mut backend, &headers, "/api/complaints/all/") {
        Ok(idx) => idx,
        Err(response) => return response,
    };
    if !is_staff(&backend, idx) {
        return forbidden();
    }

    let params: Vec<(String, String)> = query
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    let filtered: Vec<Complaint> = backend
        .complaints
        .iter()
        .filter(|complaint| {
            params.iter().all(|(key, value)| match key.as_str() {
                "status" => complaint.status.as_str() == value,
                "citizen__username" => &complaint.citizen == value,
                _ => true,
            })
        })
        .cloned()
        .collect();
    Json(filtered).into_response()
}

async fn update_complaint(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let path = format!("/api/complaints/{id}/update/");
    let idx = match authorize(&mut backend, &headers, &path) {
        Ok(idx) => idx,
        Err(response) => return response,
    };
    if !is_staff(&backend, idx) {
        return forbidden();
    }

    let status = match body["status"].as_str().map(str::parse::<ComplaintStatus>) {
        Some(Ok(status)) => status,
        _ => {
            return reply(
                StatusCode::BAD_REQUEST,
                json!({"status": ["\"bogus\" is not a valid choice."]}),
            );
        }
    };

    let Some(complaint) = backend.complaints.iter_mut().find(|c| c.id == id) else {
        return reply(StatusCode::NOT_FOUND, json!({"detail": "No Complaint matches the given query."}));
    };
    complaint.status = status;
    complaint.updated_at = Some(Utc::now());
    Json(complaint.clone()).into_response()
}

async fn stats(State(backend): State<Shared>, headers: HeaderMap) -> Response {
    let mut backend = backend.lock().expect("backend lock");
    let idx = match authorize(&mut backend, &headers, "/api/complaints/stats/") {
        Ok(idx) => idx,
        Err(response) => return response,
    };
    if !is_staff(&backend, idx) {
        return forbidden();
    }

    let mut counts: Vec<(String, u64)> = Vec::new();
    for complaint in &backend.complaints {
        let status = complaint.status.as_str();
        match counts.iter_mut().find(|(seen, _)| seen == status) {
            Some((_, count)) => *count += 1,
            None => counts.push((status.to_string(), 1)),
        }
    }
    let body: Vec<Value> = counts
        .into_iter()
        .map(|(status, count)| json!({"status": status, "count": count}))
        .collect();
    Json(body).into_response()
}
