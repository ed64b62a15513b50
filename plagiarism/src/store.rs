//! Reads check inputs and writes results.

use crate::error::{PlagiarismError, Result};
use crate::model::{ExerciseInfo, ParticipationRecord};
use crate::result::PlagiarismResult;
use async_trait::async_trait;
use db::models::{exercise, participation, plagiarism_result};
use sea_orm::DatabaseConnection;

#[async_trait]
pub trait PlagiarismStore: Send + Sync {
    async fn load_exercise(&self, exercise_id: i64) -> Result<ExerciseInfo>;

    /// Every participation of the exercise with its latest submission, in id order.
    async fn load_participations(&self, exercise_id: i64) -> Result<Vec<ParticipationRecord>>;

    /// Persists `result`, replacing any earlier result of the same exercise.
    async fn save_result(&self, result: &PlagiarismResult) -> Result<()>;
}

#[derive(Clone)]
pub struct DbStore {
    db: DatabaseConnection,
}

impl DbStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PlagiarismStore for DbStore {
    async fn load_exercise(&self, exercise_id: i64) -> Result<ExerciseInfo> {
        let (model, _course) = exercise::Model::find_with_course(&self.db, exercise_id)
            .await?
            .ok_or(PlagiarismError::ExerciseNotFound(exercise_id))?;
        ExerciseInfo::from_model(model)
    }

    async fn load_participations(&self, exercise_id: i64) -> Result<Vec<ParticipationRecord>> {
        let rows = participation::Entity::find_all_for_plagiarism(&self.db, exercise_id).await?;
        Ok(rows
            .into_iter()
            .map(|(p, latest)| ParticipationRecord::from_models(p, latest))
            .collect())
    }

    async fn save_result(&self, result: &PlagiarismResult) -> Result<()> {
        let comparisons: Vec<plagiarism_result::NewComparison> = result
            .comparisons
            .iter()
            .map(|c| plagiarism_result::NewComparison {
                submission_a: c.submission_a,
                submission_b: c.submission_b,
                similarity: c.similarity,
            })
            .collect();

        let saved = plagiarism_result::Model::save_and_remove_previous(
            &self.db,
            result.exercise_id,
            &result.similarity_distribution,
            result.duration_ms,
            &comparisons,
            result.created_at,
        )
        .await?;
        tracing::info!(
            exercise_id = result.exercise_id,
            result_id = saved.id,
            comparisons = comparisons.len(),
            "Stored plagiarism result"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExerciseKind;
    use crate::result::PlagiarismComparison;
    use chrono::Utc;
    use db::models::participation::NewParticipation;
    use db::models::plagiarism_comparison::ComparisonStatus;
    use db::models::{course, submission};
    use db::test_utils::setup_test_db;
    use util::languages::Language;

    #[tokio::test]
    async fn loads_exercise_and_participations() {
        let db = setup_test_db().await;
        let c = course::Model::create(&db, "COS214", "Design Patterns").await.unwrap();
        let ex = exercise::Model::create_programming(&db, c.id, "Observer", Language::Cpp, "OBS", None)
            .await
            .unwrap();
        let p = participation::Model::create(
            &db,
            NewParticipation::student(ex.id, "u1").with_repository("https://git.example.org/obs-u1.git"),
        )
        .await
        .unwrap();
        submission::Model::create(&db, p.id, None, Some(75.0)).await.unwrap();

        let store = DbStore::new(db);
        let info = store.load_exercise(ex.id).await.unwrap();
        assert_eq!(info.course_id, c.id);
        assert!(matches!(info.kind, ExerciseKind::Programming { language: Language::Cpp, .. }));

        let records = store.load_participations(ex.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].latest_submission.as_ref().and_then(|s| s.score), Some(75.0));

        assert!(matches!(
            store.load_exercise(ex.id + 1).await,
            Err(PlagiarismError::ExerciseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn saves_result_replacing_previous() {
        let db = setup_test_db().await;
        let c = course::Model::create(&db, "COS284", "Architecture").await.unwrap();
        let ex = exercise::Model::create_text(&db, c.id, "Essay").await.unwrap();
        let store = DbStore::new(db.clone());

        store.save_result(&PlagiarismResult::empty(ex.id)).await.unwrap();
        let result = PlagiarismResult {
            exercise_id: ex.id,
            comparisons: vec![PlagiarismComparison {
                submission_a: 1,
                submission_b: 2,
                similarity: 88.0,
                status: ComparisonStatus::None,
            }],
            similarity_distribution: vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 0],
            duration_ms: 42,
            created_at: Utc::now(),
        };
        store.save_result(&result).await.unwrap();

        let (saved, comps) = plagiarism_result::Model::find_latest_for_exercise(&db, ex.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.distribution(), result.similarity_distribution);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].similarity, 88.0);
    }
}
