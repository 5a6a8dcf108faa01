use tokio::sync::watch;
use tracing::debug;

use crate::auth_client::AuthClient;
use crate::error::ClientResult;
use crate::models::{Credentials, RegisteredUser, RegistrationData, Role, UserProfile};

/// Экраны, доступные только жителям.
pub const CITIZEN_ONLY: &[Role] = &[Role::Citizen];
/// Экраны, доступные сотрудникам и администраторам.
pub const STAFF_ONLY: &[Role] = &[Role::Officer, Role::Admin];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Снимок состояния сессии.
pub struct SessionState {
    /// Текущий пользователь.
    pub current_user: Option<UserProfile>,
    /// Идёт начальная загрузка состояния из хранилища.
    pub initializing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Результат проверки доступа к экрану.
pub enum Access {
    /// Доступ разрешён.
    Granted,
    /// Нужен вход.
    Unauthenticated,
    /// Роль пользователя не подходит.
    Unauthorized,
}

/// Сессия пользователя: единственный владелец текущего профиля.
///
/// Состояние меняется только через `login`, `register` и `logout`
/// (`&mut self`), наблюдатели получают снимки через [`Session::subscribe`].
#[derive(Debug)]
pub struct Session {
    auth: AuthClient,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// Создаёт сессию и однократно загружает пользователя из хранилища.
    ///
    /// Токен не перепроверяется: истёкший, но сохранённый токен считается
    /// действительным до первого авторизованного запроса.
    pub fn bootstrap(auth: AuthClient) -> Self {
        let (state, _) = watch::channel(SessionState {
            current_user: None,
            initializing: true,
        });

        let current_user = match auth.cached_user() {
            Some(user) if auth.is_authenticated() => Some(user),
            _ => None,
        };
        debug!(restored = current_user.is_some(), "session bootstrapped");

        state.send_replace(SessionState {
            current_user,
            initializing: false,
        });

        Self { auth, state }
    }

    /// Клиент аутентификации сессии.
    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// Подписка на изменения состояния.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Текущий снимок состояния.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Текущий пользователь.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.borrow().current_user.clone()
    }

    /// `true`, если в сессии есть пользователь.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().current_user.is_some()
    }

    /// Проверяет доступ текущего пользователя к экрану с ролями `allowed`.
    pub fn authorize(&self, allowed: &[Role]) -> Access {
        match self.state.borrow().current_user.as_ref() {
            None => Access::Unauthenticated,
            Some(user) if allowed.contains(&user.role) => Access::Granted,
            Some(_) => Access::Unauthorized,
        }
    }

    /// Вход. При ошибке текущий пользователь не меняется.
    pub async fn login(&mut self, credentials: Credentials) -> ClientResult<UserProfile> {
        let user = self.auth.login(credentials).await?;
        self.state.send_modify(|state| state.current_user = Some(user.clone()));
        Ok(user)
    }

    /// Регистрация. Текущий пользователь не меняется: нужен отдельный вход.
    pub async fn register(&mut self, data: RegistrationData) -> ClientResult<RegisteredUser> {
        self.auth.register(data).await
    }

    /// Выход. Пользователь сбрасывается даже при ошибке очистки хранилища.
    pub fn logout(&mut self) -> ClientResult<()> {
        let result = self.auth.logout();
        self.state.send_modify(|state| state.current_user = None);
        result
    }
}
