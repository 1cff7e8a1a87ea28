use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    auth::repo::UserRepo,
    error::AppResult,
    exercises::repo_types::{Difficulty, Exercise, ExerciseFilter, ExerciseRow, NewExercise},
};

/// Exercise store. Ids are sequential and assigned by the store.
/// `created_by` is always the owner's current email.
#[async_trait]
pub trait ExerciseRepo: Send + Sync {
    async fn insert(&self, exercise: NewExercise, now: OffsetDateTime) -> AppResult<Exercise>;
    async fn get(&self, id: i64) -> AppResult<Option<Exercise>>;
    /// Matching records ordered by id descending, as `(total, page)`.
    async fn list(
        &self,
        filter: &ExerciseFilter,
        skip: u64,
        limit: u64,
    ) -> AppResult<(u64, Vec<Exercise>)>;
    /// Writes the editable fields of `exercise`; `None` if it no longer exists.
    async fn update(&self, exercise: &Exercise) -> AppResult<Option<Exercise>>;
    async fn delete(&self, id: i64) -> AppResult<bool>;
}

#[derive(Debug, Clone)]
struct StoredExercise {
    id: i64,
    name: String,
    muscle_group: String,
    difficulty: Difficulty,
    owner_id: i64,
    created_at: OffsetDateTime,
    updated_at: Option<OffsetDateTime>,
}

impl StoredExercise {
    fn with_owner_email(&self, created_by: String) -> Exercise {
        Exercise {
            id: self.id,
            name: self.name.clone(),
            muscle_group: self.muscle_group.clone(),
            difficulty: self.difficulty,
            owner_id: self.owner_id,
            created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Default)]
struct ExerciseTable {
    rows: Vec<StoredExercise>,
    last_id: i64,
}

/// In-process store. Only the owner id is kept; the email is looked up in
/// `users` on every read, the way the PostgreSQL store joins it.
pub struct MemoryExerciseRepo {
    inner: RwLock<ExerciseTable>,
    users: Arc<dyn UserRepo>,
}

impl MemoryExerciseRepo {
    pub fn new(users: Arc<dyn UserRepo>) -> Self {
        Self {
            inner: RwLock::default(),
            users,
        }
    }

    async fn owner_email(&self, owner_id: i64) -> AppResult<String> {
        let owner = self
            .users
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| anyhow!("exercise owner {owner_id} does not exist"))?;
        Ok(owner.email)
    }

    async fn resolve(&self, stored: StoredExercise) -> AppResult<Exercise> {
        let email = self.owner_email(stored.owner_id).await?;
        Ok(stored.with_owner_email(email))
    }
}

// Table locks are released before the user store is consulted.
#[async_trait]
impl ExerciseRepo for MemoryExerciseRepo {
    async fn insert(&self, exercise: NewExercise, now: OffsetDateTime) -> AppResult<Exercise> {
        // rejects an unknown owner before anything is stored
        self.owner_email(exercise.owner_id).await?;
        let stored = {
            let mut table = self.inner.write().await;
            table.last_id += 1;
            let stored = StoredExercise {
                id: table.last_id,
                name: exercise.name,
                muscle_group: exercise.muscle_group,
                difficulty: exercise.difficulty,
                owner_id: exercise.owner_id,
                created_at: now,
                updated_at: None,
            };
            table.rows.push(stored.clone());
            stored
        };
        self.resolve(stored).await
    }

    async fn get(&self, id: i64) -> AppResult<Option<Exercise>> {
        let stored = {
            let table = self.inner.read().await;
            table.rows.iter().find(|e| e.id == id).cloned()
        };
        match stored {
            Some(stored) => Ok(Some(self.resolve(stored).await?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        filter: &ExerciseFilter,
        skip: u64,
        limit: u64,
    ) -> AppResult<(u64, Vec<Exercise>)> {
        let (total, page) = {
            let table = self.inner.read().await;
            let mut matched: Vec<&StoredExercise> = table
                .rows
                .iter()
                .filter(|e| filter.matches(&e.name, &e.muscle_group, e.difficulty))
                .collect();
            matched.sort_by(|a, b| b.id.cmp(&a.id));

            let total = matched.len() as u64;
            let page: Vec<StoredExercise> = matched
                .into_iter()
                .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect();
            (total, page)
        };

        let mut emails: HashMap<i64, String> = HashMap::new();
        let mut exercises = Vec::with_capacity(page.len());
        for stored in page {
            let email = match emails.get(&stored.owner_id) {
                Some(email) => email.clone(),
                None => {
                    let email = self.owner_email(stored.owner_id).await?;
                    emails.insert(stored.owner_id, email.clone());
                    email
                }
            };
            exercises.push(stored.with_owner_email(email));
        }
        Ok((total, exercises))
    }

    async fn update(&self, exercise: &Exercise) -> AppResult<Option<Exercise>> {
        let stored = {
            let mut table = self.inner.write().await;
            let Some(stored) = table.rows.iter_mut().find(|e| e.id == exercise.id) else {
                return Ok(None);
            };
            stored.name = exercise.name.clone();
            stored.muscle_group = exercise.muscle_group.clone();
            stored.difficulty = exercise.difficulty;
            stored.updated_at = exercise.updated_at;
            stored.clone()
        };
        Ok(Some(self.resolve(stored).await?))
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let mut table = self.inner.write().await;
        let before = table.rows.len();
        table.rows.retain(|e| e.id != id);
        Ok(table.rows.len() != before)
    }
}

const EXERCISE_SELECT: &str = r#"
    SELECT e.id, e.name, e.muscle_group, e.difficulty, e.owner_id,
           u.email AS created_by, e.created_at, e.updated_at
"#;

pub struct PgExerciseRepo {
    db: PgPool,
}

impl PgExerciseRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ExerciseFilter) {
    qb.push(" WHERE TRUE");
    if let Some(mg) = &filter.muscle_group {
        qb.push(" AND LOWER(e.muscle_group) = LOWER(")
            .push_bind(mg.clone())
            .push(")");
    }
    if let Some(d) = &filter.difficulty {
        qb.push(" AND e.difficulty = LOWER(")
            .push_bind(d.clone())
            .push(")");
    }
    if let Some(q) = &filter.search {
        // strpos rather than LIKE so the search text needs no escaping
        qb.push(" AND STRPOS(LOWER(e.name), LOWER(")
            .push_bind(q.clone())
            .push(")) > 0");
    }
}

#[async_trait]
impl ExerciseRepo for PgExerciseRepo {
    async fn insert(&self, exercise: NewExercise, now: OffsetDateTime) -> AppResult<Exercise> {
        let row = sqlx::query_as::<_, ExerciseRow>(&format!(
            r#"
            WITH e AS (
                INSERT INTO exercises (name, muscle_group, difficulty, owner_id, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
            )
            {EXERCISE_SELECT}
            FROM e JOIN users u ON u.id = e.owner_id
            "#
        ))
        .bind(&exercise.name)
        .bind(&exercise.muscle_group)
        .bind(exercise.difficulty.as_str())
        .bind(exercise.owner_id)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(row.try_into()?)
    }

    async fn get(&self, id: i64) -> AppResult<Option<Exercise>> {
        let row = sqlx::query_as::<_, ExerciseRow>(&format!(
            "{EXERCISE_SELECT} FROM exercises e JOIN users u ON u.id = e.owner_id WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(row.map(Exercise::try_from).transpose()?)
    }

    async fn list(
        &self,
        filter: &ExerciseFilter,
        skip: u64,
        limit: u64,
    ) -> AppResult<(u64, Vec<Exercise>)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exercises e");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.db)
            .await
            .map_err(anyhow::Error::from)?;

        let mut page = QueryBuilder::<Postgres>::new(EXERCISE_SELECT);
        page.push(" FROM exercises e JOIN users u ON u.id = e.owner_id");
        push_filters(&mut page, filter);
        page.push(" ORDER BY e.id DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(skip).unwrap_or(i64::MAX));
        let rows: Vec<ExerciseRow> = page
            .build_query_as()
            .fetch_all(&self.db)
            .await
            .map_err(anyhow::Error::from)?;

        let exercises = rows
            .into_iter()
            .map(Exercise::try_from)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok((total.max(0) as u64, exercises))
    }

    async fn update(&self, exercise: &Exercise) -> AppResult<Option<Exercise>> {
        let row = sqlx::query_as::<_, ExerciseRow>(&format!(
            r#"
            WITH e AS (
                UPDATE exercises
                SET name = $2, muscle_group = $3, difficulty = $4, updated_at = $5
                WHERE id = $1
                RETURNING *
            )
            {EXERCISE_SELECT}
            FROM e JOIN users u ON u.id = e.owner_id
            "#
        ))
        .bind(exercise.id)
        .bind(&exercise.name)
        .bind(&exercise.muscle_group)
        .bind(exercise.difficulty.as_str())
        .bind(exercise.updated_at)
        .fetch_optional(&self.db)
        .await
        .map_err(anyhow::Error::from)?;
        Ok(row.map(Exercise::try_from).transpose()?)
    }

    async fn delete(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM exercises WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(res.rows_affected() > 0)
    }
}
