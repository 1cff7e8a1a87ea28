use serde::{Deserialize, Deserializer, Serialize};

use super::repo_types::{Difficulty, Exercise};

#[derive(Debug, Deserialize)]
pub struct CreateExerciseRequest {
    pub name: String,
    pub muscle_group: String,
    pub difficulty: Difficulty,
}

/// One field of a partial update.
///
/// `Missing` (key absent) leaves the stored value alone, `Null` is an
/// explicit JSON `null`, `Value` replaces the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Missing,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Missing
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

/// Body of `PATCH /exercises/{id}`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateExerciseRequest {
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub muscle_group: Patch<String>,
    #[serde(default)]
    pub difficulty: Patch<Difficulty>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub muscle_group: Option<String>,
    pub difficulty: Option<String>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExercisePage {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub exercises: Vec<Exercise>,
}
