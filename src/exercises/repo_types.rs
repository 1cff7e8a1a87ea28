use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => anyhow::bail!("unknown difficulty {other:?}"),
        }
    }
}

/// Exercise record in the store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub muscle_group: String,
    pub difficulty: Difficulty,
    #[serde(skip_serializing)]
    pub owner_id: i64, // stable reference to the creating user
    pub created_by: String, // owner's current email
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewExercise {
    pub name: String,
    pub muscle_group: String,
    pub difficulty: Difficulty,
    pub owner_id: i64,
}

/// Optional list filters; every present filter must match.
#[derive(Debug, Clone, Default)]
pub struct ExerciseFilter {
    pub muscle_group: Option<String>,
    pub difficulty: Option<String>,
    pub search: Option<String>,
}

impl ExerciseFilter {
    /// Case-insensitive equality on muscle group and difficulty, then
    /// case-insensitive substring on name.
    pub fn matches(&self, name: &str, muscle_group: &str, difficulty: Difficulty) -> bool {
        if let Some(mg) = &self.muscle_group {
            if muscle_group.to_lowercase() != mg.to_lowercase() {
                return false;
            }
        }
        if let Some(d) = &self.difficulty {
            if difficulty.as_str() != d.to_lowercase() {
                return false;
            }
        }
        if let Some(q) = &self.search {
            if !name.to_lowercase().contains(&q.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Row shape for the PostgreSQL store; `created_by` is joined from `users`.
#[derive(Debug, FromRow)]
pub struct ExerciseRow {
    pub id: i64,
    pub name: String,
    pub muscle_group: String,
    pub difficulty: String,
    pub owner_id: i64,
    pub created_by: String,
    pub created_at: OffsetDateTime,
    pub updated_at: Option<OffsetDateTime>,
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = anyhow::Error;

    fn try_from(r: ExerciseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            muscle_group: r.muscle_group,
            difficulty: r.difficulty.parse()?,
            owner_id: r.owner_id,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squat() -> Exercise {
        Exercise {
            id: 1,
            name: "Back Squat".into(),
            muscle_group: "Legs".into(),
            difficulty: Difficulty::Intermediate,
            owner_id: 1,
            created_by: "a@x.com".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: None,
        }
    }

    fn passes(f: &ExerciseFilter, e: &Exercise) -> bool {
        f.matches(&e.name, &e.muscle_group, e.difficulty)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(passes(&ExerciseFilter::default(), &squat()));
    }

    #[test]
    fn filters_are_case_insensitive() {
        let f = ExerciseFilter {
            muscle_group: Some("LEGS".into()),
            difficulty: Some("Intermediate".into()),
            search: Some("sQu".into()),
        };
        assert!(passes(&f, &squat()));
    }

    #[test]
    fn muscle_group_is_equality_not_substring() {
        let f = ExerciseFilter {
            muscle_group: Some("leg".into()),
            ..Default::default()
        };
        assert!(!passes(&f, &squat()));
    }

    #[test]
    fn unknown_difficulty_matches_nothing() {
        let f = ExerciseFilter {
            difficulty: Some("expert".into()),
            ..Default::default()
        };
        assert!(!passes(&f, &squat()));
    }

    #[test]
    fn difficulty_parses_any_case_and_serializes_lowercase() {
        assert_eq!("ADVANCED".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert!("expert".parse::<Difficulty>().is_err());
        assert_eq!(
            serde_json::to_string(&Difficulty::Beginner).unwrap(),
            "\"beginner\""
        );
    }

    #[test]
    fn exercise_json_hides_owner_id() {
        let json = serde_json::to_value(squat()).unwrap();
        assert!(json.get("owner_id").is_none());
        assert_eq!(json["created_by"], "a@x.com");
        assert_eq!(json["difficulty"], "intermediate");
        assert!(json["updated_at"].is_null());
    }
}
