use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    auth::repo_types::{NewUser, User, UserChanges},
    db::unique_violation,
    error::{AppError, AppResult},
};

pub const EMAIL_TAKEN: &str = "Email already registered";
pub const USERNAME_TAKEN: &str = "Username already taken";

/// Credential store. Email and username stay unique under every mutation.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>>;
    /// Assigns the next sequential id.
    async fn insert(&self, user: NewUser, now: OffsetDateTime) -> AppResult<User>;
    async fn update_profile(&self, id: i64, changes: UserChanges) -> AppResult<User>;
    async fn deactivate(&self, id: i64) -> AppResult<()>;
}

#[derive(Default)]
struct UserTable {
    rows: Vec<User>,
    last_id: i64,
}

impl UserTable {
    fn check_unique(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        skip_id: i64,
    ) -> AppResult<()> {
        for u in self.rows.iter().filter(|u| u.id != skip_id) {
            if email.is_some_and(|e| u.email == e) {
                return Err(AppError::Conflict(EMAIL_TAKEN.into()));
            }
            if username.is_some_and(|n| u.username == n) {
                return Err(AppError::Conflict(USERNAME_TAKEN.into()));
            }
        }
        Ok(())
    }
}

/// In-process store; ids and uniqueness are decided under the write lock.
#[derive(Default)]
pub struct MemoryUserRepo {
    inner: RwLock<UserTable>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let table = self.inner.read().await;
        Ok(table.rows.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let table = self.inner.read().await;
        Ok(table.rows.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let table = self.inner.read().await;
        Ok(table.rows.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, user: NewUser, now: OffsetDateTime) -> AppResult<User> {
        let mut table = self.inner.write().await;
        table.check_unique(Some(&user.email), Some(&user.username), 0)?;

        table.last_id += 1;
        let user = User {
            id: table.last_id,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            is_active: true,
            created_at: now,
        };
        table.rows.push(user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: i64, changes: UserChanges) -> AppResult<User> {
        let mut table = self.inner.write().await;
        table.check_unique(changes.email.as_deref(), changes.username.as_deref(), id)?;

        let user = table
            .rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        Ok(user.clone())
    }

    async fn deactivate(&self, id: i64) -> AppResult<()> {
        let mut table = self.inner.write().await;
        if let Some(user) = table.rows.iter_mut().find(|u| u.id == id) {
            user.is_active = false;
        }
        Ok(())
    }
}

const USER_COLUMNS: &str = "id, email, username, password_hash, is_active, created_at";

pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_user_write_error(e: sqlx::Error) -> AppError {
    match unique_violation(&e) {
        Some(constraint) if constraint.contains("username") => {
            AppError::Conflict(USERNAME_TAKEN.into())
        }
        Some(_) => AppError::Conflict(EMAIL_TAKEN.into()),
        None => AppError::Internal(e.into()),
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser, now: OffsetDateTime) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(map_user_write_error)?;
        Ok(user)
    }

    async fn update_profile(&self, id: i64, changes: UserChanges) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                username = COALESCE($3, username)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.username)
        .fetch_optional(&self.db)
        .await
        .map_err(map_user_write_error)?;
        user.ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn deactivate(&self, id: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: username.into(),
            password_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let repo = MemoryUserRepo::new();
        let now = OffsetDateTime::now_utc();
        let a = repo.insert(new_user("a@x.com", "alice"), now).await.unwrap();
        let b = repo.insert(new_user("b@x.com", "bob"), now).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(a.is_active);
        assert_eq!(a.created_at, now);
    }

    #[tokio::test]
    async fn rejects_duplicate_email_and_username() {
        let repo = MemoryUserRepo::new();
        let now = OffsetDateTime::now_utc();
        repo.insert(new_user("a@x.com", "alice"), now).await.unwrap();

        let err = repo.insert(new_user("a@x.com", "other"), now).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == EMAIL_TAKEN));

        let err = repo.insert(new_user("c@x.com", "alice"), now).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == USERNAME_TAKEN));

        // failed inserts do not burn ids
        let c = repo.insert(new_user("c@x.com", "carol"), now).await.unwrap();
        assert_eq!(c.id, 2);
    }

    #[tokio::test]
    async fn lookups_by_email_username_and_id() {
        let repo = MemoryUserRepo::new();
        let now = OffsetDateTime::now_utc();
        let a = repo.insert(new_user("a@x.com", "alice"), now).await.unwrap();

        assert_eq!(repo.find_by_email("a@x.com").await.unwrap(), Some(a.clone()));
        assert_eq!(repo.find_by_username("alice").await.unwrap(), Some(a.clone()));
        assert_eq!(repo.find_by_id(a.id).await.unwrap(), Some(a));
        assert_eq!(repo.find_by_email("z@x.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_profile_keeps_uniqueness() {
        let repo = MemoryUserRepo::new();
        let now = OffsetDateTime::now_utc();
        let a = repo.insert(new_user("a@x.com", "alice"), now).await.unwrap();
        repo.insert(new_user("b@x.com", "bob"), now).await.unwrap();

        let err = repo
            .update_profile(
                a.id,
                UserChanges {
                    username: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // re-submitting one's own email is not a conflict
        let updated = repo
            .update_profile(
                a.id,
                UserChanges {
                    email: Some("a@x.com".into()),
                    username: Some("alicia".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "alicia");
        assert_eq!(updated.email, "a@x.com");
    }

    #[tokio::test]
    async fn deactivate_flips_flag_only() {
        let repo = MemoryUserRepo::new();
        let now = OffsetDateTime::now_utc();
        let a = repo.insert(new_user("a@x.com", "alice"), now).await.unwrap();
        repo.deactivate(a.id).await.unwrap();

        let stored = repo.find_by_id(a.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.email, a.email);
    }
}
