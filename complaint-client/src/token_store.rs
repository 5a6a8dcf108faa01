use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ClientError, ClientResult};
use crate::models::{TokenPair, UserProfile};

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user.json";

/// Хранилище токенов и кэшированного профиля.
///
/// Три независимые записи: access token, refresh token, профиль.
/// Содержимое токенов не проверяется. Операции синхронные.
pub trait TokenStore: Send + Sync {
    /// Возвращает пару токенов, только если есть обе записи.
    fn get(&self) -> Option<TokenPair>;

    /// Сохраняет обе записи пары.
    fn set(&self, tokens: &TokenPair) -> ClientResult<()>;

    /// Заменяет только access token (после refresh).
    fn set_access(&self, access: &str) -> ClientResult<()>;

    /// Удаляет токены и кэшированный профиль.
    fn clear(&self) -> ClientResult<()>;

    /// Возвращает кэшированный профиль.
    fn get_cached_user(&self) -> Option<UserProfile>;

    /// Кэширует профиль пользователя.
    fn set_cached_user(&self, user: &UserProfile) -> ClientResult<()>;
}

fn parse_token(raw: &str) -> Option<String> {
    let token = raw.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn parse_user(raw: &str) -> Option<UserProfile> {
    serde_json::from_str::<UserProfile>(raw).ok()
}

fn pair_from(access: Option<String>, refresh: Option<String>) -> Option<TokenPair> {
    Some(TokenPair {
        access: access?,
        refresh: refresh?,
    })
}

#[derive(Debug, Default)]
/// Хранилище в памяти процесса.
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl MemoryTokenStore {
    /// Создаёт пустое хранилище.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries().ok()?.get(key).cloned()
    }

    fn entries(&self) -> ClientResult<MutexGuard<'_, HashMap<&'static str, String>>> {
        self.entries
            .lock()
            .map_err(|_| ClientError::Storage("token store lock poisoned".to_string()))
    }

    fn write(&self, key: &'static str, value: String) -> ClientResult<()> {
        self.entries()?.insert(key, value);
        Ok(())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> {
        let entries = self.entries().ok()?;
        pair_from(
            entries.get(ACCESS_TOKEN_KEY).and_then(|raw| parse_token(raw)),
            entries.get(REFRESH_TOKEN_KEY).and_then(|raw| parse_token(raw)),
        )
    }

    fn set(&self, tokens: &TokenPair) -> ClientResult<()> {
        let mut entries = self.entries()?;
        entries.insert(ACCESS_TOKEN_KEY, tokens.access.clone());
        entries.insert(REFRESH_TOKEN_KEY, tokens.refresh.clone());
        Ok(())
    }

    fn set_access(&self, access: &str) -> ClientResult<()> {
        self.write(ACCESS_TOKEN_KEY, access.to_string())
    }

    fn clear(&self) -> ClientResult<()> {
        self.entries()?.clear();
        Ok(())
    }

    fn get_cached_user(&self) -> Option<UserProfile> {
        self.read(USER_KEY).as_deref().and_then(parse_user)
    }

    fn set_cached_user(&self, user: &UserProfile) -> ClientResult<()> {
        let raw = serde_json::to_string(user)
            .map_err(|err| ClientError::Storage(format!("failed to serialize user: {err}")))?;
        self.write(USER_KEY, raw)
    }
}

#[derive(Debug, Clone)]
/// Хранилище в каталоге на диске: по файлу на запись.
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    /// Создаёт хранилище в каталоге `dir`. Каталог создаётся при первой записи.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Каталог хранилища.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.dir.join(key)).ok()
    }

    /// Записывает файл с правами `0600` на unix: в нём секреты.
    fn write(&self, key: &str, value: &str) -> ClientResult<()> {
        fs::create_dir_all(&self.dir).map_err(|err| storage_error("create store dir", err))?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let path = self.dir.join(key);
        let mut file = options.open(&path).map_err(|err| storage_error(key, err))?;
        #[cfg(unix)]
        {
            // mode применяется только при создании файла
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|err| storage_error(key, err))?;
        }
        file.write_all(value.as_bytes())
            .map_err(|err| storage_error(key, err))
    }

    fn remove(&self, key: &str) -> ClientResult<()> {
        match fs::remove_file(self.dir.join(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(key, err)),
        }
    }
}

fn storage_error(what: &str, err: io::Error) -> ClientError {
    ClientError::Storage(format!("{what}: {err}"))
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<TokenPair> {
        pair_from(
            self.read(ACCESS_TOKEN_KEY).as_deref().and_then(parse_token),
            self.read(REFRESH_TOKEN_KEY).as_deref().and_then(parse_token),
        )
    }

    fn set(&self, tokens: &TokenPair) -> ClientResult<()> {
        self.write(ACCESS_TOKEN_KEY, &tokens.access)?;
        if let Err(err) = self.write(REFRESH_TOKEN_KEY, &tokens.refresh) {
            // новый access без своего refresh не оставляем
            if let Err(cleanup_err) = self.remove(ACCESS_TOKEN_KEY) {
                tracing::warn!(error = %cleanup_err, "failed to remove orphaned access token");
            }
            return Err(err);
        }
        Ok(())
    }

    fn set_access(&self, access: &str) -> ClientResult<()> {
        self.write(ACCESS_TOKEN_KEY, access)
    }

    fn clear(&self) -> ClientResult<()> {
        // все три записи удаляются, даже если одна из них не удалилась
        let results = [
            self.remove(ACCESS_TOKEN_KEY),
            self.remove(REFRESH_TOKEN_KEY),
            self.remove(USER_KEY),
        ];
        results.into_iter().collect()
    }

    fn get_cached_user(&self) -> Option<UserProfile> {
        self.read(USER_KEY).as_deref().and_then(parse_user)
    }

    fn set_cached_user(&self, user: &UserProfile) -> ClientResult<()> {
        let raw = serde_json::to_string(user)
            .map_err(|err| ClientError::Storage(format!("failed to serialize user: {err}")))?;
        self.write(USER_KEY, &raw)
    }
}
