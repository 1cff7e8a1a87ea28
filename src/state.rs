use std::sync::Arc;

use tracing::info;

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{MemoryUserRepo, PgUserRepo, UserRepo};
use crate::config::AppConfig;
use crate::db;
use crate::exercises::repo::{ExerciseRepo, MemoryExerciseRepo, PgExerciseRepo};

/// Shared per-process state. Stores are injected behind traits; handlers
/// hold no global mutable state of their own.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserRepo>,
    pub exercises: Arc<dyn ExerciseRepo>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, exercises) = match &config.database_url {
            Some(url) => {
                let db = db::connect(url).await?;
                info!("using PostgreSQL store");
                (
                    Arc::new(PgUserRepo::new(db.clone())) as Arc<dyn UserRepo>,
                    Arc::new(PgExerciseRepo::new(db)) as Arc<dyn ExerciseRepo>,
                )
            }
            None => {
                info!("DATABASE_URL not set; using in-memory store");
                let users: Arc<dyn UserRepo> = Arc::new(MemoryUserRepo::new());
                let exercises = Arc::new(MemoryExerciseRepo::new(users.clone()));
                (users, exercises as Arc<dyn ExerciseRepo>)
            }
        };

        Ok(Self::from_parts(config, users, exercises))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        exercises: Arc<dyn ExerciseRepo>,
    ) -> Self {
        let jwt = JwtKeys::from_config(&config.jwt);
        Self {
            config,
            jwt,
            users,
            exercises,
        }
    }

    #[cfg(test)]
    pub fn in_memory_for_tests() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                ttl_minutes: 30,
            },
            host: "127.0.0.1".into(),
            port: 0,
        });
        let users: Arc<dyn UserRepo> = Arc::new(MemoryUserRepo::new());
        let exercises = Arc::new(MemoryExerciseRepo::new(users.clone()));
        Self::from_parts(config, users, exercises)
    }
}
