use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum ExpectedExpenses {
    Table,
    Id,
    FamilyId,
    OwnerId,
    Description,
    EstimatedAmountMinor,
    ActualAmountMinor,
    DueDate,
    Status,
    Priority,
    CategoryId,
    AccountId,
    TransactionId,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExpectedExpenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExpectedExpenses::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExpectedExpenses::FamilyId).blob().not_null())
                    .col(ColumnDef::new(ExpectedExpenses::OwnerId).blob().not_null())
                    .col(
                        ColumnDef::new(ExpectedExpenses::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpectedExpenses::EstimatedAmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExpectedExpenses::ActualAmountMinor).big_integer())
                    .col(ColumnDef::new(ExpectedExpenses::DueDate).date().not_null())
                    .col(
                        ColumnDef::new(ExpectedExpenses::Status)
                            .string()
                            .not_null()
                            .default("planned"),
                    )
                    .col(
                        ColumnDef::new(ExpectedExpenses::Priority)
                            .string()
                            .not_null()
                            .default("medium"),
                    )
                    .col(ColumnDef::new(ExpectedExpenses::CategoryId).blob())
                    .col(ColumnDef::new(ExpectedExpenses::AccountId).blob())
                    .col(ColumnDef::new(ExpectedExpenses::TransactionId).blob())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expected_expenses-owner_id")
                            .from(ExpectedExpenses::Table, ExpectedExpenses::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expected_expenses-family_id-due_date")
                    .table(ExpectedExpenses::Table)
                    .col(ExpectedExpenses::FamilyId)
                    .col(ExpectedExpenses::DueDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExpectedExpenses::Table).to_owned())
            .await?;
        Ok(())
    }
}
