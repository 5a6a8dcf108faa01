use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::models::Role;

#[derive(Debug, Clone, Deserialize)]
/// Claims из payload access token.
///
/// Подпись не проверяется: клиент не знает секрет сервера и использует
/// claims только для отображения профиля. Авторизацию выполняет сервер.
pub struct AccessClaims {
    /// Идентификатор пользователя.
    pub user_id: i64,
    /// Логин, если сервер кладёт его в токен.
    #[serde(default)]
    pub username: Option<String>,
    /// Email, если сервер кладёт его в токен.
    #[serde(default)]
    pub email: Option<String>,
    /// Роль, если сервер кладёт её в токен.
    #[serde(default)]
    pub role: Option<Role>,
    /// Время истечения (unix timestamp).
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Декодирует claims из JWT без проверки подписи.
pub fn decode_access_claims(token: &str) -> ClientResult<AccessClaims> {
    let mut segments = token.trim().split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
        _ => {
            return Err(ClientError::Auth(
                "access token is not a JWT".to_string(),
            ));
        }
    };

    // некоторые серверы оставляют padding, URL_SAFE_NO_PAD его не принимает
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| ClientError::Auth(format!("access token payload is not base64: {err}")))?;

    serde_json::from_slice::<AccessClaims>(&bytes)
        .map_err(|err| ClientError::Auth(format!("access token claims are invalid: {err}")))
}
