use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review state of a flagged pair. New comparisons start at `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    #[sea_orm(string_value = "none")]
    None,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "denied")]
    Denied,
}

impl std::fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonStatus::None => write!(f, "none"),
            ComparisonStatus::Confirmed => write!(f, "confirmed"),
            ComparisonStatus::Denied => write!(f, "denied"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plagiarism_comparisons")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub result_id: i64,
    /// Smaller submission id of the pair.
    pub submission_a: i64,
    pub submission_b: i64,
    /// Percentage in [0, 100].
    pub similarity: f32,
    pub status: ComparisonStatus,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::plagiarism_result::Entity",
        from = "Column::ResultId",
        to = "super::plagiarism_result::Column::Id"
    )]
    PlagiarismResult,
}

impl Related<super::plagiarism_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlagiarismResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
