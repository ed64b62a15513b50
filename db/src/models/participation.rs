use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, QueryOrder, Set};

/// Role of whoever owns a participation. Only student participations are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Role {
    #[sea_orm(string_value = "student")]
    Student,
    #[sea_orm(string_value = "tutor")]
    Tutor,
    #[sea_orm(string_value = "lecturer")]
    Lecturer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Lecturer => "lecturer",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "participations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub exercise_id: i64,
    /// Login or team short name; may be missing for orphaned rows.
    pub participant_identifier: Option<String>,
    pub role: Role,
    pub team_id: Option<i64>,
    pub practice_mode: bool,
    pub repository_uri: Option<String>,
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
    #[sea_orm(has_many = "super::submission::Entity")]
    Submission,
}

impl Related<super::exercise::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exercise.def()
    }
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Fields used when inserting a participation.
#[derive(Debug, Clone)]
pub struct NewParticipation<'a> {
    pub exercise_id: i64,
    pub participant_identifier: Option<&'a str>,
    pub role: Role,
    pub team_id: Option<i64>,
    pub practice_mode: bool,
    pub repository_uri: Option<&'a str>,
}

impl<'a> NewParticipation<'a> {
    /// A graded, non-practice student participation.
    pub fn student(exercise_id: i64, login: &'a str) -> Self {
        Self {
            exercise_id,
            participant_identifier: Some(login),
            role: Role::Student,
            team_id: None,
            practice_mode: false,
            repository_uri: None,
        }
    }

    pub fn with_repository(mut self, uri: &'a str) -> Self {
        self.repository_uri = Some(uri);
        self
    }
}

impl Model {
    pub async fn create(
        db: &DatabaseConnection,
        new: NewParticipation<'_>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            exercise_id: Set(new.exercise_id),
            participant_identifier: Set(new.participant_identifier.map(str::to_string)),
            role: Set(new.role),
            team_id: Set(new.team_id),
            practice_mode: Set(new.practice_mode),
            repository_uri: Set(new.repository_uri.map(str::to_string)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }
}

impl Entity {
    /// Every participation of `exercise_id` paired with its most recent submission.
    ///
    /// The pairing is resolved eagerly so callers never walk the relation graph
    /// afterwards. Participations without submissions carry `None`.
    pub async fn find_all_for_plagiarism(
        db: &DatabaseConnection,
        exercise_id: i64,
    ) -> Result<Vec<(Model, Option<super::submission::Model>)>, DbErr> {
        let rows = Entity::find()
            .filter(Column::ExerciseId.eq(exercise_id))
            .order_by_asc(Column::Id)
            .find_with_related(super::submission::Entity)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(p, subs)| {
                let latest = subs
                    .into_iter()
                    .max_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
                (p, latest)
            })
            .collect())
    }
}
