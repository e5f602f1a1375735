//! Initial schema.
//!
//! - `families`: households
//! - `users`: family members with their role
//! - `accounts`: balances (personal, common, goal, emergency)
//! - `account_visibility`: user -> account edges
//! - `categories`: per-family category arena (`parent_id` tree)
//! - `transactions`: postings; transfer legs share a `transfer_id`
//! - `recurring_rules`: scheduled postings and transfers

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Families {
    Table,
    Id,
    Name,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Name,
    DisplayName,
    Role,
    FamilyId,
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    FamilyId,
    Name,
    Kind,
    BalanceMinor,
    OwnerId,
    GoalAmountMinor,
    GoalDate,
    Status,
}

#[derive(Iden)]
enum AccountVisibility {
    Table,
    UserId,
    AccountId,
}

#[derive(Iden)]
enum Categories {
    Table,
    Id,
    FamilyId,
    Name,
    ParentId,
    Color,
    Icon,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    AccountId,
    Kind,
    AmountMinor,
    Description,
    CategoryId,
    CreatedBy,
    OccurredAt,
    TransferId,
    IsFamilyExpense,
}

#[derive(Iden)]
enum RecurringRules {
    Table,
    Id,
    FamilyId,
    OwnerId,
    Description,
    AmountMinor,
    Kind,
    FromAccountId,
    ToAccountId,
    CategoryId,
    Frequency,
    StartDate,
    EndDate,
    NextRunDate,
    LastRunDate,
    IsActive,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Families and users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Families::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Families::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Families::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).blob().not_null().primary_key())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string().not_null())
                    .col(ColumnDef::new(Users::Role).string().not_null())
                    .col(ColumnDef::new(Users::FamilyId).blob().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-users-family_id")
                            .from(Users::Table, Users::FamilyId)
                            .to(Families::Table, Families::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-users-family_id-name-unique")
                    .table(Users::Table)
                    .col(Users::FamilyId)
                    .col(Users::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Accounts and visibility edges
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Accounts::FamilyId).blob().not_null())
                    .col(ColumnDef::new(Accounts::Name).string().not_null())
                    .col(ColumnDef::new(Accounts::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::BalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Accounts::OwnerId).blob())
                    .col(ColumnDef::new(Accounts::GoalAmountMinor).big_integer())
                    .col(ColumnDef::new(Accounts::GoalDate).date())
                    .col(
                        ColumnDef::new(Accounts::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-accounts-family_id")
                            .from(Accounts::Table, Accounts::FamilyId)
                            .to(Families::Table, Families::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-accounts-family_id-kind")
                    .table(Accounts::Table)
                    .col(Accounts::FamilyId)
                    .col(Accounts::Kind)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AccountVisibility::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AccountVisibility::UserId).blob().not_null())
                    .col(
                        ColumnDef::new(AccountVisibility::AccountId)
                            .blob()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AccountVisibility::UserId)
                            .col(AccountVisibility::AccountId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-account_visibility-user_id")
                            .from(AccountVisibility::Table, AccountVisibility::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-account_visibility-account_id")
                            .from(AccountVisibility::Table, AccountVisibility::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-account_visibility-account_id")
                    .table(AccountVisibility::Table)
                    .col(AccountVisibility::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Categories
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Categories::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Categories::FamilyId).blob().not_null())
                    .col(ColumnDef::new(Categories::Name).string().not_null())
                    .col(ColumnDef::new(Categories::ParentId).blob())
                    .col(ColumnDef::new(Categories::Color).string())
                    .col(ColumnDef::new(Categories::Icon).string())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-categories-family_id")
                            .from(Categories::Table, Categories::FamilyId)
                            .to(Families::Table, Families::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Transactions (postings)
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::AccountId).blob().not_null())
                    .col(ColumnDef::new(Transactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::CategoryId).blob())
                    .col(ColumnDef::new(Transactions::CreatedBy).blob().not_null())
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::TransferId).blob())
                    .col(
                        ColumnDef::new(Transactions::IsFamilyExpense)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-account_id")
                            .from(Transactions::Table, Transactions::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-transfer_id")
                    .table(Transactions::Table)
                    .col(Transactions::TransferId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Recurring rules
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(RecurringRules::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecurringRules::Id)
                            .blob()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RecurringRules::FamilyId).blob().not_null())
                    .col(ColumnDef::new(RecurringRules::OwnerId).blob().not_null())
                    .col(
                        ColumnDef::new(RecurringRules::Description)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringRules::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringRules::Kind).string().not_null())
                    .col(ColumnDef::new(RecurringRules::FromAccountId).blob())
                    .col(ColumnDef::new(RecurringRules::ToAccountId).blob())
                    .col(ColumnDef::new(RecurringRules::CategoryId).blob())
                    .col(
                        ColumnDef::new(RecurringRules::Frequency)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringRules::StartDate).date().not_null())
                    .col(ColumnDef::new(RecurringRules::EndDate).date())
                    .col(
                        ColumnDef::new(RecurringRules::NextRunDate)
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringRules::LastRunDate).date())
                    .col(
                        ColumnDef::new(RecurringRules::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-recurring_rules-owner_id")
                            .from(RecurringRules::Table, RecurringRules::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recurring_rules-is_active-next_run_date")
                    .table(RecurringRules::Table)
                    .col(RecurringRules::IsActive)
                    .col(RecurringRules::NextRunDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(RecurringRules::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Categories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccountVisibility::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Families::Table).to_owned())
            .await?;
        Ok(())
    }
}
