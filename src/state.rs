/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - login/logout handler が使う credential store と login ページ設定
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 * - auth handler 自体は state に入れず、guard middleware に直接渡す
 */
use std::sync::Arc;

use crate::services::auth::CredentialStore;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub auth_realm: String,
    pub login_path: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("auth_realm", &self.auth_realm)
            .field("login_path", &self.login_path)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        auth_realm: impl Into<String>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            auth_realm: auth_realm.into(),
            login_path: login_path.into(),
        }
    }
}
