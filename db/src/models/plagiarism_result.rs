//! Persisted outcome of one plagiarism run. Only the latest run per exercise is kept.

use super::plagiarism_comparison::{self, ComparisonStatus};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, QueryOrder, Set, TransactionTrait,
};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plagiarism_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub exercise_id: i64,
    /// JSON array of bucket counts. Empty when no comparison ran.
    pub similarity_distribution: Json,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::exercise::Entity",
        from = "Column::ExerciseId",
        to = "super::exercise::Column::Id"
    )]
    Exercise,
    #[sea_orm(has_many = "super::plagiarism_comparison::Entity")]
    Comparison,
}

impl Related<super::exercise::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exercise.def()
    }
}

impl Related<super::plagiarism_comparison::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Comparison.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// One comparison row to be stored alongside a result.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComparison {
    pub submission_a: i64,
    pub submission_b: i64,
    pub similarity: f32,
}

const INSERT_CHUNK: usize = 100;

impl Model {
    /// Stores a result and its comparisons, deleting any earlier result of the
    /// same exercise in the same transaction.
    pub async fn save_and_remove_previous(
        db: &DatabaseConnection,
        exercise_id: i64,
        distribution: &[u32],
        duration_ms: i64,
        comparisons: &[NewComparison],
        created_at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        let txn = db.begin().await?;

        let previous: Vec<i64> = Entity::find()
            .filter(Column::ExerciseId.eq(exercise_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        if !previous.is_empty() {
            plagiarism_comparison::Entity::delete_many()
                .filter(plagiarism_comparison::Column::ResultId.is_in(previous.clone()))
                .exec(&txn)
                .await?;
            Entity::delete_many()
                .filter(Column::Id.is_in(previous))
                .exec(&txn)
                .await?;
        }

        let saved = ActiveModel {
            exercise_id: Set(exercise_id),
            similarity_distribution: Set(serde_json::json!(distribution)),
            duration_ms: Set(duration_ms),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for chunk in comparisons.chunks(INSERT_CHUNK) {
            let rows = chunk.iter().map(|c| plagiarism_comparison::ActiveModel {
                result_id: Set(saved.id),
                submission_a: Set(c.submission_a),
                submission_b: Set(c.submission_b),
                similarity: Set(c.similarity),
                status: Set(ComparisonStatus::None),
                ..Default::default()
            });
            plagiarism_comparison::Entity::insert_many(rows)
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(saved)
    }

    /// Latest stored result for `exercise_id` with its comparisons, highest similarity first.
    pub async fn find_latest_for_exercise(
        db: &DatabaseConnection,
        exercise_id: i64,
    ) -> Result<Option<(Model, Vec<plagiarism_comparison::Model>)>, DbErr> {
        let Some(result) = Entity::find()
            .filter(Column::ExerciseId.eq(exercise_id))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let comparisons = plagiarism_comparison::Entity::find()
            .filter(plagiarism_comparison::Column::ResultId.eq(result.id))
            .order_by_desc(plagiarism_comparison::Column::Similarity)
            .order_by_asc(plagiarism_comparison::Column::Id)
            .all(db)
            .await?;

        Ok(Some((result, comparisons)))
    }

    /// Bucket counts decoded from the JSON column.
    pub fn distribution(&self) -> Vec<u32> {
        serde_json::from_value(self.similarity_distribution.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{course, exercise};
    use crate::test_utils::setup_test_db;

    async fn text_exercise(db: &DatabaseConnection) -> exercise::Model {
        let course = course::Model::create(db, "COS344", "Graphics").await.unwrap();
        exercise::Model::create_text(db, course.id, "Essay").await.unwrap()
    }

    #[tokio::test]
    async fn save_replaces_previous_result() {
        let db = setup_test_db().await;
        let ex = text_exercise(&db).await;

        let first = Model::save_and_remove_previous(
            &db,
            ex.id,
            &[0, 0, 0, 0, 0, 0, 0, 1, 0, 0],
            120,
            &[NewComparison { submission_a: 1, submission_b: 2, similarity: 72.5 }],
            Utc::now(),
        )
        .await
        .unwrap();

        let second = Model::save_and_remove_previous(
            &db,
            ex.id,
            &[0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            80,
            &[
                NewComparison { submission_a: 3, submission_b: 4, similarity: 91.0 },
                NewComparison { submission_a: 1, submission_b: 4, similarity: 99.0 },
            ],
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(Entity::find_by_id(first.id).one(&db).await.unwrap().is_none());
        let all = Entity::find().all(&db).await.unwrap();
        assert_eq!(all.len(), 1);

        let (latest, comps) = Model::find_latest_for_exercise(&db, ex.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.distribution(), vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 2]);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].similarity, 99.0);
        assert!(comps.iter().all(|c| c.status == ComparisonStatus::None));

        let orphaned = plagiarism_comparison::Entity::find()
            .filter(plagiarism_comparison::Column::ResultId.eq(first.id))
            .all(&db)
            .await
            .unwrap();
        assert!(orphaned.is_empty());
    }

    #[tokio::test]
    async fn empty_result_round_trips_with_empty_distribution() {
        let db = setup_test_db().await;
        let ex = text_exercise(&db).await;
        Model::save_and_remove_previous(&db, ex.id, &[], 0, &[], Utc::now())
            .await
            .unwrap();
        let (latest, comps) = Model::find_latest_for_exercise(&db, ex.id).await.unwrap().unwrap();
        assert!(latest.distribution().is_empty());
        assert!(comps.is_empty());
    }
}
