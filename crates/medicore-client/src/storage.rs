//! 키-값 저장소 추상화 및 토큰 저장소.
//!
//! 브라우저의 localStorage/sessionStorage에 해당하는 동기 키-값
//! 인터페이스를 정의합니다. 토큰은 내구 저장소에 보존되어 프로세스
//! 재시작 후에도 세션이 복원됩니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

/// 접근 토큰 저장 키.
pub const ACCESS_TOKEN_KEY: &str = "access";

/// 갱신 토큰 저장 키.
pub const REFRESH_TOKEN_KEY: &str = "refresh";

/// 강제 로그아웃 시 복원할 경로 저장 키 (세션 범위 저장소).
pub const POST_LOGIN_REDIRECT_KEY: &str = "post_login_redirect";

/// 동기 키-값 저장소 인터페이스.
///
/// 실패하지 않는 인터페이스입니다. 구현체는 내부 I/O 실패를 로그로
/// 남기고 흡수합니다.
pub trait KeyValueStorage: Send + Sync {
    /// 키에 저장된 값 반환.
    fn get(&self, key: &str) -> Option<String>;
    /// 키에 값 저장.
    fn set(&self, key: &str, value: &str);
    /// 키 삭제.
    fn remove(&self, key: &str);
}

/// 인메모리 키-값 저장소.
///
/// 세션 범위 저장소로 사용되며, 테스트에서 내구 저장소의 대역으로도
/// 사용됩니다.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// 빈 저장소 생성.
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// JSON 파일 기반 내구 키-값 저장소.
///
/// 모든 변경을 즉시 파일로 기록합니다. 파일이 없거나 손상된 경우 빈
/// 상태로 시작하며, 기록 실패는 로그로만 남깁니다.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// 주어진 경로의 저장소 열기 (없으면 빈 상태로 시작).
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => {
                    debug!("Loaded {} stored entries from {:?}", map.len(), path);
                    map
                }
                Err(err) => {
                    warn!("Ignoring corrupt storage file {:?}: {}", path, err);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, entries: &HashMap<String, String>) {
        let serialized = match serde_json::to_string_pretty(entries) {
            Ok(s) => s,
            Err(err) => {
                error!("Failed to serialize storage state: {}", err);
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, serialized) {
            error!("Failed to write storage file {:?}: {}", self.path, err);
        }
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }
}

/// 접근/갱신 토큰 전용 저장소.
///
/// 내구 저장소 위의 얇은 타입 래퍼입니다. 만료 시각은 추적하지 않으며,
/// 만료는 401 응답으로 사후에 발견됩니다.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl TokenStore {
    /// 주어진 내구 저장소 위에 토큰 저장소 생성.
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// 저장된 접근 토큰 반환.
    pub fn access(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    /// 저장된 갱신 토큰 반환.
    pub fn refresh(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }

    /// 접근 토큰 저장.
    pub fn set_access(&self, token: &str) {
        self.storage.set(ACCESS_TOKEN_KEY, token);
    }

    /// 갱신 토큰 저장.
    pub fn set_refresh(&self, token: &str) {
        self.storage.set(REFRESH_TOKEN_KEY, token);
    }

    /// 두 토큰 모두 삭제.
    pub fn clear(&self) {
        self.storage.remove(ACCESS_TOKEN_KEY);
        self.storage.remove(REFRESH_TOKEN_KEY);
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("access", &self.access().map(|_| "<set>"))
            .field("refresh", &self.refresh().map(|_| "<set>"))
            .finish()
    }
}
