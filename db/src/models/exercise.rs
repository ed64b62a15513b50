//! Exercises: the unit a plagiarism check runs against.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use util::languages::Language;

/// Comparison domain of an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ExerciseType {
    #[sea_orm(string_value = "programming")]
    Programming,
    #[sea_orm(string_value = "text")]
    Text,
}

impl std::fmt::Display for ExerciseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExerciseType::Programming => write!(f, "programming"),
            ExerciseType::Text => write!(f, "text"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "exercises")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub exercise_type: ExerciseType,
    /// Lowercase language name (see `util::languages::Language`); programming only.
    pub language: Option<String>,
    /// Folder name all checkouts of this exercise are grouped under; programming only.
    pub project_key: Option<String>,
    pub template_repository_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
    #[sea_orm(has_many = "super::participation::Entity")]
    Participation,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::participation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create_programming(
        db: &DatabaseConnection,
        course_id: i64,
        title: &str,
        language: Language,
        project_key: &str,
        template_repository_uri: Option<&str>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            course_id: Set(course_id),
            title: Set(title.to_string()),
            exercise_type: Set(ExerciseType::Programming),
            language: Set(Some(language.to_string())),
            project_key: Set(Some(project_key.to_string())),
            template_repository_uri: Set(template_repository_uri.map(str::to_string)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn create_text(
        db: &DatabaseConnection,
        course_id: i64,
        title: &str,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            course_id: Set(course_id),
            title: Set(title.to_string()),
            exercise_type: Set(ExerciseType::Text),
            language: Set(None),
            project_key: Set(None),
            template_repository_uri: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(db).await
    }

    /// The exercise together with its owning course.
    pub async fn find_with_course(
        db: &DatabaseConnection,
        id: i64,
    ) -> Result<Option<(Model, super::course::Model)>, DbErr> {
        let Some((exercise, course)) = Entity::find_by_id(id)
            .find_also_related(super::course::Entity)
            .one(db)
            .await?
        else {
            return Ok(None);
        };
        Ok(course.map(|c| (exercise, c)))
    }

    /// Parsed language, `None` for text exercises or unknown names.
    pub fn parsed_language(&self) -> Option<Language> {
        self.language.as_deref().and_then(|l| l.parse().ok())
    }
}
