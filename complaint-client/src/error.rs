use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `complaint-client`.
pub enum ClientError {
    /// Ошибка транспорта: ответ от сервера не получен.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Отказ в аутентификации: неверные учётные данные, нет токена
    /// или не удалось обновить access token.
    #[error("auth error: {0}")]
    Auth(String),

    /// Сервер отклонил операцию с жалобами.
    #[error("complaint error: {0}")]
    Complaint(String),

    /// Успешный ответ с неожиданным телом.
    #[error("decode error: {0}")]
    Decode(String),

    /// Не удалось записать состояние в хранилище токенов.
    #[error("storage error: {0}")]
    Storage(String),

    /// Запрос не прошёл проверку на клиенте.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Результат операций `complaint-client`.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Network(err)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBodyDto {
    detail: Option<String>,
    message: Option<String>,
    #[serde(flatten)]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Достаёт сообщение об ошибке из тела ответа сервера.
///
/// Порядок: `detail`, `message`, первая ошибка валидации поля.
pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    let dto: ErrorBodyDto = serde_json::from_slice(body).ok()?;
    if let Some(detail) = dto.detail.filter(|value| !value.trim().is_empty()) {
        return Some(detail);
    }
    if let Some(message) = dto.message.filter(|value| !value.trim().is_empty()) {
        return Some(message);
    }
    dto.fields.iter().find_map(|(field, value)| {
        let message = match value {
            serde_json::Value::Array(items) => items.iter().find_map(|item| item.as_str()),
            serde_json::Value::String(text) => Some(text.as_str()),
            _ => None,
        }?;
        Some(format!("{field}: {message}"))
    })
}

/// Читает тело неуспешного ответа и возвращает детали либо `fallback`.
pub(crate) async fn read_error_detail(response: reqwest::Response, fallback: &str) -> String {
    let status = response.status();
    match response.bytes().await {
        Ok(body) => error_detail(&body).unwrap_or_else(|| fallback.to_string()),
        Err(err) => {
            tracing::debug!(%status, error = %err, "failed to read error body");
            fallback.to_string()
        }
    }
}
