// src/services/db.rs
//! Database service
//!
//! Owns all SQL for the four entities (users, oauth_accounts, sessions,
//! refresh_tokens). Uniqueness is enforced by database constraints; callers
//! translate unique-violation errors to domain conflicts via `ApiError`.

use chrono::Duration;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::auth::models::{OAuthAccount, RefreshToken, Session, User, UserUpdate};
use crate::common::helpers::{now_ts, safe_email_log, ts_after, ts_in_past};
use crate::common::id_generator::{
    generate_oauth_account_id, generate_refresh_token_id, generate_refresh_token_value,
    generate_session_id, generate_user_id,
};
use crate::services::oauth::{OAuthProfile, ProviderTokens};

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: SqlitePool,
}

impl DatabaseService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---- Users ----

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        changes: &UserUpdate,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE users
            SET username = COALESCE(?, username),
                full_name = COALESCE(?, full_name),
                avatar_url = COALESCE(?, avatar_url),
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(changes.username.as_deref())
        .bind(changes.full_name.as_deref())
        .bind(changes.avatar_url.as_deref())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.get_user(user_id).await
    }

    /// Soft delete: flips the active flag, keeps the row
    pub async fn deactivate_user(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET is_active = 0, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hard delete: cascades to oauth_accounts, sessions and refresh_tokens
    pub async fn delete_user(&self, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---- OAuth accounts ----

    pub async fn find_user_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            JOIN oauth_accounts oa ON oa.user_id = u.id
            WHERE oa.provider = ? AND oa.provider_id = ?
            "#,
        )
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list_oauth_accounts(
        &self,
        user_id: &str,
    ) -> Result<Vec<OAuthAccount>, sqlx::Error> {
        sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Attach a new provider identity to an existing user
    pub async fn link_oauth_account(
        &self,
        user_id: &str,
        profile: &OAuthProfile,
        tokens: &ProviderTokens,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO oauth_accounts
                (id, user_id, provider, provider_id, email, access_token, refresh_token, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(generate_oauth_account_id())
        .bind(user_id)
        .bind(profile.provider.as_str())
        .bind(&profile.provider_id)
        .bind(&profile.email)
        .bind(&tokens.access_token)
        .bind(tokens.refresh_token.as_deref())
        .bind(provider_token_expiry(tokens))
        .execute(&self.pool)
        .await?;

        info!(
            user_id = %user_id,
            provider = %profile.provider,
            "Linked OAuth account to existing user"
        );
        Ok(())
    }

    /// Refresh the stored provider tokens on re-login
    pub async fn update_oauth_tokens(
        &self,
        provider: &str,
        provider_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE oauth_accounts
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                expires_at = ?,
                updated_at = datetime('now')
            WHERE provider = ? AND provider_id = ?
            "#,
        )
        .bind(&tokens.access_token)
        .bind(tokens.refresh_token.as_deref())
        .bind(provider_token_expiry(tokens))
        .bind(provider)
        .bind(provider_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create a new user together with its first OAuth account, atomically
    pub async fn create_user_with_oauth(
        &self,
        profile: &OAuthProfile,
        tokens: &ProviderTokens,
    ) -> Result<User, sqlx::Error> {
        let user_id = generate_user_id();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, full_name, avatar_url, is_active)
            VALUES (?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&user_id)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(profile.full_name.as_deref())
        .bind(profile.avatar_url.as_deref())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO oauth_accounts
                (id, user_id, provider, provider_id, email, access_token, refresh_token, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(generate_oauth_account_id())
        .bind(&user_id)
        .bind(profile.provider.as_str())
        .bind(&profile.provider_id)
        .bind(&profile.email)
        .bind(&tokens.access_token)
        .bind(tokens.refresh_token.as_deref())
        .bind(provider_token_expiry(tokens))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            user_id = %user_id,
            email = %safe_email_log(&profile.email),
            provider = %profile.provider,
            "Created new user via OAuth"
        );

        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(&user_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Resolve an OAuth callback profile to a user.
    ///
    /// Lookup order: known (provider, provider_id) pair, then existing user
    /// with the same email (account linking), then a brand-new user.
    pub async fn get_or_create_oauth_user(
        &self,
        profile: &OAuthProfile,
        tokens: &ProviderTokens,
    ) -> Result<User, sqlx::Error> {
        if let Some(user) = self
            .find_user_by_provider(profile.provider.as_str(), &profile.provider_id)
            .await?
        {
            debug!(user_id = %user.id, provider = %profile.provider, "Known provider identity");
            self.update_oauth_tokens(profile.provider.as_str(), &profile.provider_id, tokens)
                .await?;
            return Ok(user);
        }

        if let Some(user) = self.get_user_by_email(&profile.email).await? {
            self.link_oauth_account(&user.id, profile, tokens).await?;
            return Ok(user);
        }

        self.create_user_with_oauth(profile, tokens).await
    }

    // ---- Sessions ----

    pub async fn create_session(
        &self,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Session, sqlx::Error> {
        let session_id = generate_session_id();
        let expires_at = ts_after(ttl);

        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&session_id)
            .bind(user_id)
            .bind(&expires_at)
            .execute(&self.pool)
            .await?;

        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(&session_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Look up a live session with its user. Expired sessions are removed
    /// lazily here and reported as absent.
    pub async fn get_session(
        &self,
        session_id: &str,
    ) -> Result<Option<(Session, User)>, sqlx::Error> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        let session = match session {
            Some(s) if ts_in_past(&s.expires_at) => {
                self.delete_session(session_id).await?;
                return Ok(None);
            }
            Some(s) => s,
            None => return Ok(None),
        };

        let user = self.get_user(&session.user_id).await?;
        Ok(user.map(|u| (session, u)))
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-delete sessions whose expiry is strictly in the past
    pub async fn delete_expired_sessions(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ---- Refresh tokens ----

    pub async fn create_refresh_token(
        &self,
        user_id: &str,
        ttl_days: i64,
    ) -> Result<RefreshToken, sqlx::Error> {
        let token = generate_refresh_token_value();

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(generate_refresh_token_id())
        .bind(user_id)
        .bind(&token)
        .bind(ts_after(Duration::days(ttl_days)))
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(&token)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshToken>, sqlx::Error> {
        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
    }

    /// Revocation keeps the row for audit, it only flips the flag
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke the presented token and issue its replacement atomically
    pub async fn rotate_refresh_token(
        &self,
        old: &RefreshToken,
        ttl_days: i64,
    ) -> Result<RefreshToken, sqlx::Error> {
        let token = generate_refresh_token_value();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token = ?")
            .bind(&old.token)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO refresh_tokens (id, user_id, token, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(generate_refresh_token_id())
        .bind(&old.user_id)
        .bind(&token)
        .bind(ts_after(Duration::days(ttl_days)))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token = ?")
            .bind(&token)
            .fetch_one(&self.pool)
            .await
    }
}

fn provider_token_expiry(tokens: &ProviderTokens) -> Option<String> {
    tokens
        .expires_in
        .map(|secs| ts_after(Duration::seconds(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::is_unique_violation;
    use crate::services::oauth::Provider;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn setup_test_db() -> DatabaseService {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        // one connection, otherwise each pooled connection gets its own
        // private in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        crate::common::migrations::run_migrations(&pool).await.unwrap();
        DatabaseService::new(pool)
    }

    fn google_profile(email: &str) -> OAuthProfile {
        OAuthProfile {
            provider: Provider::Google,
            provider_id: format!("google-{}", email),
            email: email.to_string(),
            full_name: Some("Test User".to_string()),
            avatar_url: Some("https://example.com/avatar.png".to_string()),
            username: email.split('@').next().unwrap().to_string(),
        }
    }

    fn github_profile(email: &str) -> OAuthProfile {
        OAuthProfile {
            provider: Provider::Github,
            provider_id: "12345".to_string(),
            email: email.to_string(),
            full_name: None,
            avatar_url: None,
            username: "octocat".to_string(),
        }
    }

    fn tokens() -> ProviderTokens {
        ProviderTokens {
            access_token: "provider-access-token".to_string(),
            refresh_token: Some("provider-refresh-token".to_string()),
            expires_in: Some(3600),
        }
    }

    #[tokio::test]
    async fn test_create_user_with_oauth_and_lookups() {
        let db = setup_test_db().await;
        let profile = google_profile("alice@example.com");

        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.username, "alice");
        assert!(user.is_active);

        let by_provider = db
            .find_user_by_provider("google", &profile.provider_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_provider.id, user.id);

        let by_email = db
            .get_user_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[tokio::test]
    async fn test_account_linking_by_email_across_providers() {
        let db = setup_test_db().await;

        let first = db
            .get_or_create_oauth_user(&google_profile("bob@example.com"), &tokens())
            .await
            .unwrap();
        let second = db
            .get_or_create_oauth_user(&github_profile("bob@example.com"), &tokens())
            .await
            .unwrap();

        // same email across providers resolves to the same user
        assert_eq!(first.id, second.id);

        let accounts = db.list_oauth_accounts(&first.id).await.unwrap();
        assert_eq!(accounts.len(), 2);
    }

    #[tokio::test]
    async fn test_relogin_updates_tokens_without_duplicating_account() {
        let db = setup_test_db().await;
        let profile = google_profile("carol@example.com");

        let user = db.get_or_create_oauth_user(&profile, &tokens()).await.unwrap();

        let newer = ProviderTokens {
            access_token: "newer-access-token".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
        };
        let again = db.get_or_create_oauth_user(&profile, &newer).await.unwrap();
        assert_eq!(user.id, again.id);

        let accounts = db.list_oauth_accounts(&user.id).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            accounts[0].access_token.as_deref(),
            Some("newer-access-token")
        );
        // missing refresh token on re-login keeps the stored one
        assert_eq!(
            accounts[0].refresh_token.as_deref(),
            Some("provider-refresh-token")
        );
    }

    #[tokio::test]
    async fn test_duplicate_provider_link_is_unique_violation() {
        let db = setup_test_db().await;
        let profile = google_profile("dave@example.com");

        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        // second google account for the same user trips UNIQUE(provider, user_id)
        let mut other = google_profile("dave-alt@example.com");
        other.provider_id = "different-provider-id".to_string();
        let err = db
            .link_oauth_account(&user.id, &other, &tokens())
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let db = setup_test_db().await;
        let profile = google_profile("erin@example.com");

        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();
        let session = db
            .create_session(&user.id, Duration::minutes(30))
            .await
            .unwrap();
        db.create_refresh_token(&user.id, 30).await.unwrap();

        assert!(db.delete_user(&user.id).await.unwrap());

        assert!(db.get_session(&session.id).await.unwrap().is_none());
        assert!(db.list_oauth_accounts(&user.id).await.unwrap().is_empty());
        assert!(db
            .find_user_by_provider("google", &profile.provider_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent_and_removed() {
        let db = setup_test_db().await;
        let profile = google_profile("frank@example.com");
        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        let expired = db
            .create_session(&user.id, Duration::minutes(-5))
            .await
            .unwrap();
        assert!(db.get_session(&expired.id).await.unwrap().is_none());

        let live = db
            .create_session(&user.id, Duration::minutes(30))
            .await
            .unwrap();
        let (session, found) = db.get_session(&live.id).await.unwrap().unwrap();
        assert_eq!(session.user_id, user.id);
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_delete_expired_sessions_keeps_future_ones() {
        let db = setup_test_db().await;
        let profile = google_profile("grace@example.com");
        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        db.create_session(&user.id, Duration::minutes(-10))
            .await
            .unwrap();
        db.create_session(&user.id, Duration::minutes(-1))
            .await
            .unwrap();
        let future = db
            .create_session(&user.id, Duration::minutes(30))
            .await
            .unwrap();

        let removed = db.delete_expired_sessions().await.unwrap();
        assert_eq!(removed, 2);
        assert!(db.get_session(&future.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_rotation_revokes_old() {
        let db = setup_test_db().await;
        let profile = google_profile("henry@example.com");
        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        let original = db.create_refresh_token(&user.id, 30).await.unwrap();
        assert!(!original.revoked);

        let rotated = db.rotate_refresh_token(&original, 30).await.unwrap();
        assert_ne!(original.token, rotated.token);
        assert!(!rotated.revoked);

        let old = db
            .get_refresh_token(&original.token)
            .await
            .unwrap()
            .unwrap();
        assert!(old.revoked);
    }

    #[tokio::test]
    async fn test_revoke_keeps_row_for_audit() {
        let db = setup_test_db().await;
        let profile = google_profile("iris@example.com");
        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        let rt = db.create_refresh_token(&user.id, 30).await.unwrap();
        assert!(db.revoke_refresh_token(&rt.token).await.unwrap());

        let row = db.get_refresh_token(&rt.token).await.unwrap().unwrap();
        assert!(row.revoked);
    }

    #[tokio::test]
    async fn test_deactivate_user_is_soft() {
        let db = setup_test_db().await;
        let profile = google_profile("judy@example.com");
        let user = db.create_user_with_oauth(&profile, &tokens()).await.unwrap();

        assert!(db.deactivate_user(&user.id).await.unwrap());
        let row = db.get_user(&user.id).await.unwrap().unwrap();
        assert!(!row.is_active);
    }
}
