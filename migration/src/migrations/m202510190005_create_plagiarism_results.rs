use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202510190005_create_plagiarism_results"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("plagiarism_results"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("exercise_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("similarity_distribution")).json().not_null())
                    .col(ColumnDef::new(Alias::new("duration_ms")).big_integer().not_null())
                    .col(
                        ColumnDef::new(Alias::new("created_at"))
                            .timestamp()
                            .not_null()
                            .default(Expr::cust("CURRENT_TIMESTAMP")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plagiarism_results_exercise")
                            .from(Alias::new("plagiarism_results"), Alias::new("exercise_id"))
                            .to(Alias::new("exercises"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Alias::new("plagiarism_comparisons"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Alias::new("result_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("submission_a")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("submission_b")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("similarity")).float().not_null())
                    .col(
                        ColumnDef::new(Alias::new("status"))
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_plagiarism_comparisons_result")
                            .from(Alias::new("plagiarism_comparisons"), Alias::new("result_id"))
                            .to(Alias::new("plagiarism_results"), Alias::new("id"))
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("plagiarism_comparisons")).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Alias::new("plagiarism_results")).to_owned())
            .await
    }
}
