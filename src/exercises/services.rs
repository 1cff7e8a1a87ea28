use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    auth::repo_types::User,
    error::{AppError, AppResult},
    exercises::{
        dto::{CreateExerciseRequest, ExercisePage, ListQuery, Patch, UpdateExerciseRequest},
        repo::ExerciseRepo,
        repo_types::{Exercise, ExerciseFilter, NewExercise},
    },
};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;
const NAME_MAX: usize = 100;
const MUSCLE_GROUP_MAX: usize = 50;

fn bounded_text(field: &str, value: &str, max: usize) -> AppResult<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(AppError::Validation(format!(
            "{field} must be between 1 and {max} characters"
        )));
    }
    Ok(value.to_string())
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Exercise {id} not found"))
}

/// Loads `id` and checks that `requester` created it.
async fn owned_by(repo: &dyn ExerciseRepo, id: i64, requester: &User) -> AppResult<Exercise> {
    let exercise = repo.get(id).await?.ok_or_else(|| not_found(id))?;
    if exercise.owner_id != requester.id {
        warn!(
            exercise_id = id,
            user_id = requester.id,
            owner_id = exercise.owner_id,
            "not the owner"
        );
        return Err(AppError::Forbidden(
            "Not allowed to modify this exercise".into(),
        ));
    }
    Ok(exercise)
}

pub async fn create(
    repo: &dyn ExerciseRepo,
    data: CreateExerciseRequest,
    owner: &User,
    now: OffsetDateTime,
) -> AppResult<Exercise> {
    let exercise = repo
        .insert(
            NewExercise {
                name: bounded_text("name", &data.name, NAME_MAX)?,
                muscle_group: bounded_text("muscle_group", &data.muscle_group, MUSCLE_GROUP_MAX)?,
                difficulty: data.difficulty,
                owner_id: owner.id,
            },
            now,
        )
        .await?;
    info!(exercise_id = exercise.id, user_id = owner.id, "exercise created");
    Ok(exercise)
}

pub async fn list(repo: &dyn ExerciseRepo, query: ListQuery) -> AppResult<ExercisePage> {
    let skip = query.skip.unwrap_or(0);
    if skip < 0 {
        return Err(AppError::Validation("skip must be >= 0".into()));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    // blank filters behave as if they were not given
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let filter = ExerciseFilter {
        muscle_group: present(query.muscle_group),
        difficulty: present(query.difficulty),
        search: present(query.search),
    };

    let (skip, limit) = (skip as u64, limit as u64);
    let (total, exercises) = repo.list(&filter, skip, limit).await?;
    Ok(ExercisePage {
        total,
        skip,
        limit,
        exercises,
    })
}

pub async fn get(repo: &dyn ExerciseRepo, id: i64) -> AppResult<Exercise> {
    repo.get(id).await?.ok_or_else(|| not_found(id))
}

/// Applies only the fields present in `patch`. These fields are not
/// nullable, so an explicit `null` is rejected rather than ignored.
pub async fn update(
    repo: &dyn ExerciseRepo,
    id: i64,
    patch: UpdateExerciseRequest,
    requester: &User,
    now: OffsetDateTime,
) -> AppResult<Exercise> {
    let mut exercise = owned_by(repo, id, requester).await?;

    match patch.name {
        Patch::Missing => {}
        Patch::Null => return Err(AppError::Validation("name cannot be null".into())),
        Patch::Value(v) => exercise.name = bounded_text("name", &v, NAME_MAX)?,
    }
    match patch.muscle_group {
        Patch::Missing => {}
        Patch::Null => return Err(AppError::Validation("muscle_group cannot be null".into())),
        Patch::Value(v) => {
            exercise.muscle_group = bounded_text("muscle_group", &v, MUSCLE_GROUP_MAX)?
        }
    }
    match patch.difficulty {
        Patch::Missing => {}
        Patch::Null => return Err(AppError::Validation("difficulty cannot be null".into())),
        Patch::Value(v) => exercise.difficulty = v,
    }
    exercise.updated_at = Some(now);

    let exercise = repo.update(&exercise).await?.ok_or_else(|| not_found(id))?;
    info!(exercise_id = id, user_id = requester.id, "exercise updated");
    Ok(exercise)
}

pub async fn delete(repo: &dyn ExerciseRepo, id: i64, requester: &User) -> AppResult<()> {
    owned_by(repo, id, requester).await?;
    if !repo.delete(id).await? {
        return Err(not_found(id));
    }
    info!(exercise_id = id, user_id = requester.id, "exercise deleted");
    Ok(())
}
