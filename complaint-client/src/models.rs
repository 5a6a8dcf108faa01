use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::ValidateEmail;

use crate::error::{ClientError, ClientResult};

const USERNAME_MAX_CHARS: usize = 150;
const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Роль пользователя, определяющая доступные операции и экраны.
pub enum Role {
    /// Житель, подающий жалобы.
    Citizen,
    /// Сотрудник службы, обрабатывающий жалобы.
    #[serde(alias = "staff")]
    Officer,
    /// Администратор.
    Admin,
}

impl Role {
    /// Значение роли в формате API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Officer => "officer",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Профиль текущего пользователя, кэшируемый рядом с токенами.
pub struct UserProfile {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Логин.
    pub username: String,
    /// Email, если сервер его сообщил.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Роль пользователя.
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Пара токенов: короткоживущий access и долгоживущий refresh.
pub struct TokenPair {
    /// Access token, передаётся в заголовке `Authorization`.
    pub access: String,
    /// Refresh token, используется для получения нового access token.
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
/// Учётные данные для входа. Нигде не сохраняются.
pub struct Credentials {
    /// Логин.
    pub username: String,
    /// Пароль.
    pub password: String,
}

impl Credentials {
    /// Создаёт учётные данные.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Проверяет и нормализует учётные данные до отправки на сервер.
    pub fn validate(self) -> ClientResult<Self> {
        let username = normalize_username(&self.username)?;
        if self.password.is_empty() {
            return Err(ClientError::InvalidRequest(
                "password must not be empty".to_string(),
            ));
        }
        Ok(Self {
            username,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
/// Данные регистрации нового пользователя. Нигде не сохраняются.
pub struct RegistrationData {
    /// Логин.
    pub username: String,
    /// Email.
    pub email: String,
    /// Пароль.
    pub password: String,
}

impl RegistrationData {
    /// Создаёт данные регистрации.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// Проверяет и нормализует данные регистрации до отправки на сервер.
    pub fn validate(self) -> ClientResult<Self> {
        let username = normalize_username(&self.username)?;
        let email = normalize_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ClientError::InvalidRequest(
                "password must not be empty".to_string(),
            ));
        }
        Ok(Self {
            username,
            email,
            password: self.password,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Ответ сервера после успешной регистрации.
///
/// Регистрация не открывает сессию: после неё нужен отдельный вход.
pub struct RegisteredUser {
    /// Логин созданного пользователя.
    pub username: String,
    /// Email созданного пользователя.
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Статус жалобы: open → in_progress → resolved.
pub enum ComplaintStatus {
    /// Ожидает рассмотрения.
    Open,
    /// В работе.
    InProgress,
    /// Решена.
    Resolved,
}

impl ComplaintStatus {
    /// Значение статуса в формате API.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    /// Человекочитаемая подпись статуса.
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplaintStatus {
    type Err = ClientError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            other => Err(ClientError::InvalidRequest(format!(
                "unknown complaint status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Жалоба жителя.
pub struct Complaint {
    /// Идентификатор жалобы.
    pub id: i64,
    /// Заголовок.
    pub title: String,
    /// Описание проблемы.
    pub description: String,
    /// Текущий статус.
    pub status: ComplaintStatus,
    /// Логин автора жалобы.
    pub citizen: String,
    /// Дата и время создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Дата и время последнего обновления (UTC).
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Агрегированное количество жалоб в одном статусе.
///
/// Статус оставлен строкой: сервер считает его сам и может вернуть
/// значение, которого клиент не знает.
pub struct ComplaintStat {
    /// Статус.
    pub status: String,
    /// Количество жалоб.
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Фильтр для списка всех жалоб.
///
/// Отсутствующие поля не попадают в query string.
pub struct ComplaintFilter {
    /// Фильтр по статусу.
    pub status: Option<ComplaintStatus>,
    /// Фильтр по логину автора.
    pub citizen_username: Option<String>,
}

impl ComplaintFilter {
    /// Пары query-параметров только для заданных полей.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(citizen) = self
            .citizen_username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            pairs.push(("citizen__username".to_string(), citizen.to_string()));
        }
        pairs
    }
}

/// Проверяет поля новой жалобы и возвращает нормализованные значения.
pub(crate) fn validate_new_complaint(
    title: &str,
    description: &str,
) -> ClientResult<(String, String)> {
    let title = title.trim();
    let title_len = title.chars().count();
    if title_len == 0 || title_len > TITLE_MAX_CHARS {
        return Err(ClientError::InvalidRequest(format!(
            "title must be 1..{TITLE_MAX_CHARS} chars"
        )));
    }
    let description = description.trim();
    if description.is_empty() {
        return Err(ClientError::InvalidRequest(
            "description must not be empty".to_string(),
        ));
    }
    Ok((title.to_string(), description.to_string()))
}

fn normalize_username(username: &str) -> ClientResult<String> {
    let username = username.trim();
    let len = username.chars().count();
    if len == 0 || len > USERNAME_MAX_CHARS {
        return Err(ClientError::InvalidRequest(format!(
            "username must be 1..{USERNAME_MAX_CHARS} chars"
        )));
    }
    Ok(username.to_string())
}

fn normalize_email(email: &str) -> ClientResult<String> {
    let email = email.trim().to_lowercase();
    if !email.validate_email() {
        return Err(ClientError::InvalidRequest(
            "email must be a valid email".to_string(),
        ));
    }
    Ok(email)
}
