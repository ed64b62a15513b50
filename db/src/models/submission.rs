use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub participation_id: i64,
    /// Body of a text submission; `None` for programming submissions.
    pub text: Option<String>,
    /// Percentage score, absent until assessed.
    pub score: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::participation::Entity",
        from = "Column::ParticipationId",
        to = "super::participation::Column::Id"
    )]
    Participation,
}

impl Related<super::participation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        participation_id: i64,
        text: Option<&str>,
        score: Option<f64>,
    ) -> Result<Model, DbErr> {
        Self::create_at(db, participation_id, text, score, Utc::now()).await
    }

    pub async fn create_at(
        db: &DatabaseConnection,
        participation_id: i64,
        text: Option<&str>,
        score: Option<f64>,
        submitted_at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            participation_id: Set(participation_id),
            text: Set(text.map(str::to_string)),
            score: Set(score),
            submitted_at: Set(submitted_at),
            ..Default::default()
        }
        .insert(db)
        .await
    }
}
