//! Per-course exclusivity for plagiarism checks.
//!
//! A row means a check is running for that course. Rows carry an expiry so a
//! crashed process cannot block a course forever.

use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, DbErr, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plagiarism_check_locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub course_id: i64,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl Entity {
    /// Atomically claims the lock for `course_id`.
    ///
    /// Returns `false` if another holder owns an unexpired lock. An expired lock
    /// is taken over.
    pub async fn try_acquire(
        db: &DatabaseConnection,
        course_id: i64,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, DbErr> {
        let now = Utc::now();

        if let Some(existing) = Entity::find_by_id(course_id).one(db).await? {
            if !existing.is_expired(now) {
                return Ok(false);
            }
            tracing::warn!(
                course_id,
                stale_holder = %existing.holder,
                "Taking over expired plagiarism check lock"
            );
            Entity::delete_many()
                .filter(Column::CourseId.eq(course_id))
                .filter(Column::Holder.eq(existing.holder))
                .exec(db)
                .await?;
        }

        let row = ActiveModel {
            course_id: Set(course_id),
            holder: Set(holder.to_string()),
            acquired_at: Set(now),
            expires_at: Set(now + ttl),
        };

        let inserted = Entity::insert(row)
            .on_conflict(OnConflict::column(Column::CourseId).do_nothing().to_owned())
            .exec_without_returning(db)
            .await?;

        Ok(inserted == 1)
    }

    /// Releases the lock if `holder` still owns it. Returns whether a row was removed.
    pub async fn release(
        db: &DatabaseConnection,
        course_id: i64,
        holder: &str,
    ) -> Result<bool, DbErr> {
        let res = Entity::delete_many()
            .filter(Column::CourseId.eq(course_id))
            .filter(Column::Holder.eq(holder))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }

    /// Whether an unexpired lock exists for `course_id`.
    pub async fn is_locked(db: &DatabaseConnection, course_id: i64) -> Result<bool, DbErr> {
        Ok(Entity::find_by_id(course_id)
            .one(db)
            .await?
            .is_some_and(|l| !l.is_expired(Utc::now())))
    }
}
