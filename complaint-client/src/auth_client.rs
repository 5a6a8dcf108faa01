use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::decode_access_claims;
use crate::error::{ClientError, ClientResult, read_error_detail};
use crate::models::{Credentials, RegisteredUser, RegistrationData, Role, TokenPair, UserProfile};
use crate::token_store::TokenStore;

const LOGIN_PATH: &str = "/api/users/login/";
const REGISTER_PATH: &str = "/api/users/register/";
const REFRESH_PATH: &str = "/api/users/token/refresh/";

/// Базовый URL сервера по умолчанию.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Serialize)]
struct RefreshRequestDto<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponseDto {
    access: String,
    refresh: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseDto {
    access: String,
    // сервер с ротацией refresh token возвращает новый
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Debug, Clone)]
/// Параметры HTTP-клиента.
pub struct ClientConfig {
    /// Базовый URL сервера, например `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Таймаут установки соединения.
    pub connect_timeout: Duration,
    /// Таймаут всего запроса.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    /// Конфигурация с указанным базовым URL и таймаутами по умолчанию.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
/// Параметры авторизованного запроса.
///
/// Хранятся целиком, чтобы запрос можно было повторить после refresh.
pub struct RequestOptions {
    method: Method,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    headers: HeaderMap,
}

impl RequestOptions {
    /// Запрос с указанным HTTP-методом без тела.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// GET-запрос.
    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    /// Добавляет JSON-тело.
    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ClientError::InvalidRequest(format!("failed to encode body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Задаёт query-параметры. Пустой список не добавляет `?` к URL.
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    /// Добавляет заголовок поверх заголовков по умолчанию.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// HTTP-метод запроса.
    pub fn method(&self) -> &Method {
        &self.method
    }
}

enum RefreshOutcome {
    Refreshed(String),
    Rejected,
}

#[derive(Clone)]
/// Клиент аутентификации: вход, регистрация, обновление токена
/// и единая точка для авторизованных запросов.
pub struct AuthClient {
    base_url: String,
    client: Client,
    store: Arc<dyn TokenStore>,
    // общий для всех клонов: refresh выполняется по одному
    refresh_lock: Arc<Mutex<()>>,
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Создаёт клиент поверх хранилища токенов.
    pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url,
            client,
            store,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Хранилище токенов, с которым работает клиент.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Выполняет вход: сохраняет пару токенов и профиль, возвращает профиль.
    ///
    /// При любой ошибке хранилище остаётся без изменений: профиль
    /// вычисляется до записи токенов.
    pub async fn login(&self, credentials: Credentials) -> ClientResult<UserProfile> {
        let credentials = credentials.validate()?;

        let response = self
            .client
            .post(self.endpoint(LOGIN_PATH))
            .json(&credentials)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = read_error_detail(response, "login failed").await;
            debug!(%status, username = %credentials.username, "login rejected");
            return Err(ClientError::Auth(detail));
        }

        let dto: LoginResponseDto = read_json(response).await?;
        let profile = derive_profile(&dto)?;

        let tokens = TokenPair {
            access: dto.access,
            refresh: dto.refresh,
        };
        if let Err(err) = self.persist_login(&tokens, &profile) {
            // неудачный вход не оставляет частично записанную сессию
            if let Err(clear_err) = self.store.clear() {
                warn!(error = %clear_err, "failed to roll back partial login");
            }
            return Err(err);
        }

        info!(username = %profile.username, role = %profile.role, "logged in");
        Ok(profile)
    }

    fn persist_login(&self, tokens: &TokenPair, profile: &UserProfile) -> ClientResult<()> {
        self.store.set(tokens)?;
        self.store.set_cached_user(profile)
    }

    /// Регистрирует пользователя. Сессию не открывает.
    pub async fn register(&self, data: RegistrationData) -> ClientResult<RegisteredUser> {
        let data = data.validate()?;

        let response = self
            .client
            .post(self.endpoint(REGISTER_PATH))
            .json(&data)
            .send()
            .await?;
        if !response.status().is_success() {
            let detail = read_error_detail(response, "registration failed").await;
            return Err(ClientError::Auth(detail));
        }

        let user: RegisteredUser = read_json(response).await?;
        info!(username = %user.username, "registered");
        Ok(user)
    }

    /// Удаляет токены и кэшированный профиль. Сервер не уведомляется.
    pub fn logout(&self) -> ClientResult<()> {
        self.store.clear()?;
        info!("logged out");
        Ok(())
    }

    /// `true`, если в хранилище есть access token.
    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Профиль, сохранённый при последнем входе.
    pub fn cached_user(&self) -> Option<UserProfile> {
        self.store.get_cached_user()
    }

    /// Выполняет запрос с `Authorization: Bearer <access>`.
    ///
    /// - без access token запрос не отправляется, ошибка `Auth("no access token")`;
    /// - на 401 выполняется ровно один refresh и ровно один повтор, ответ
    ///   повтора возвращается с любым статусом;
    /// - если refresh отклонён или refresh token отсутствует, хранилище
    ///   очищается и возвращается `Auth("authentication failed")`;
    /// - прочие статусы возвращаются как есть.
    ///
    /// Refresh выполняется под общей блокировкой. Параллельные запросы,
    /// получившие 401, ждут её и повторяют запрос с уже обновлённым
    /// токеном, не отправляя второй refresh.
    pub async fn authenticated_request(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> ClientResult<Response> {
        let tokens = self
            .store
            .get()
            .ok_or_else(|| ClientError::Auth("no access token".to_string()))?;

        let response = self.send(path, options, &tokens.access).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path, "access token rejected, refreshing");
        let access = match self.refresh_access_token(&tokens.access).await? {
            RefreshOutcome::Refreshed(access) => access,
            RefreshOutcome::Rejected => {
                warn!(path, "token refresh failed, session cleared");
                return Err(ClientError::Auth("authentication failed".to_string()));
            }
        };

        self.send(path, options, &access).await
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        access: &str,
    ) -> ClientResult<Response> {
        let url = self.endpoint(path);
        debug!(method = %options.method, %url, "sending authenticated request");

        let mut request = self
            .client
            .request(options.method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(access);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            request = request.json(body);
        }
        if !options.headers.is_empty() {
            request = request.headers(options.headers.clone());
        }

        Ok(request.send().await?)
    }

    /// Обновляет access token, отклонённый сервером (`rejected_access`).
    ///
    /// При отказе сервера хранилище очищается, не отпуская блокировку.
    async fn refresh_access_token(&self, rejected_access: &str) -> ClientResult<RefreshOutcome> {
        let _guard = self.refresh_lock.lock().await;

        let Some(tokens) = self.store.get() else {
            self.store.clear()?;
            return Ok(RefreshOutcome::Rejected);
        };
        if tokens.access != rejected_access {
            debug!("access token already refreshed by a concurrent request");
            return Ok(RefreshOutcome::Refreshed(tokens.access));
        }

        let response = self
            .client
            .post(self.endpoint(REFRESH_PATH))
            .json(&RefreshRequestDto {
                refresh: &tokens.refresh,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "refresh token rejected");
            self.store.clear()?;
            return Ok(RefreshOutcome::Rejected);
        }

        let dto = match read_json::<RefreshResponseDto>(response).await {
            Ok(dto) => dto,
            Err(ClientError::Decode(err)) => {
                debug!(error = %err, "refresh response is malformed");
                self.store.clear()?;
                return Ok(RefreshOutcome::Rejected);
            }
            Err(err) => return Err(err),
        };

        match dto.refresh {
            Some(refresh) => self.store.set(&TokenPair {
                access: dto.access.clone(),
                refresh,
            })?,
            None => self.store.set_access(&dto.access)?,
        }
        info!("access token refreshed");
        Ok(RefreshOutcome::Refreshed(dto.access))
    }
}

/// Читает JSON-тело успешного ответа.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    response
        .json::<T>()
        .await
        .map_err(ClientError::from_reqwest)
}

fn derive_profile(dto: &LoginResponseDto) -> ClientResult<UserProfile> {
    let claims = decode_access_claims(&dto.access)?;

    let username = claims
        .username
        .or_else(|| dto.username.clone())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ClientError::Auth("login response carries no username".to_string()))?;

    let role = match claims.role.or(dto.role) {
        Some(role) => role,
        None => {
            warn!(%username, "no role in token or login response, assuming citizen");
            Role::Citizen
        }
    };

    Ok(UserProfile {
        id: claims.user_id,
        username,
        email: claims.email,
        role,
    })
}
