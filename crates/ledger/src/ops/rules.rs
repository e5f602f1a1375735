use chrono::{NaiveDate, NaiveTime};
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    Actor, EngineError, FamilySnapshot, NewRecurringRuleCmd, PostCmd, RecurringRule,
    ResultEngine, RuleFailure, RuleKind, SchedulerReport, TransactionKind, TransferCmd,
    UpdateRuleCmd, User, recurring_rules, users,
    util::{normalize_optional_text, normalize_required_name},
};

use super::{
    Engine, postings::require_post_rights, transfers::require_transfer_rights, with_tx,
    with_write_tx,
};

/// What one scheduler visit did to a rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RuleOutcome {
    Fired,
    Deactivated,
    /// Edited, toggled or deleted since the due list was read.
    Skipped,
}

/// Checks a rule against the same rules the generated posting or transfer
/// will be checked against when it fires.
fn validate_rule_accounts(
    snapshot: &FamilySnapshot,
    actor: &Actor,
    rule: &RecurringRule,
) -> ResultEngine<()> {
    rule.validate_shape()?;
    match rule.kind {
        RuleKind::Income | RuleKind::Expense => {
            let account_id = rule.posting_account().ok_or_else(|| {
                EngineError::InvalidState("rule has no target account".to_string())
            })?;
            require_post_rights(snapshot, actor, account_id)?;
        }
        RuleKind::Transfer => {
            let (Some(from_id), Some(to_id)) = (rule.from_account_id, rule.to_account_id) else {
                return Err(EngineError::InvalidState(
                    "transfer rules need from_account_id and to_account_id".to_string(),
                ));
            };
            require_transfer_rights(snapshot, actor, from_id, to_id, rule.amount_minor)?;
        }
    }
    Ok(())
}

impl Engine {
    /// Creates a rule owned by the actor. It first fires on `start_date`.
    pub async fn create_recurring_rule(
        &self,
        cmd: NewRecurringRuleCmd,
    ) -> ResultEngine<RecurringRule> {
        let NewRecurringRuleCmd {
            actor,
            description,
            amount_minor,
            kind,
            from_account_id,
            to_account_id,
            category_id,
            frequency,
            start_date,
            end_date,
        } = cmd;
        let description = normalize_required_name(&description, "rule")?;
        let rule = RecurringRule {
            id: Uuid::new_v4(),
            family_id: actor.family_id,
            owner_id: actor.user_id,
            description,
            amount_minor,
            kind,
            from_account_id: match kind {
                RuleKind::Income => None,
                _ => from_account_id,
            },
            to_account_id: match kind {
                RuleKind::Expense => None,
                _ => to_account_id,
            },
            category_id,
            frequency,
            start_date,
            end_date,
            next_run_date: start_date,
            last_run_date: None,
            is_active: true,
        };

        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &actor).await?;
            validate_rule_accounts(&snapshot, &actor, &rule)?;
            if let Some(category_id) = rule.category_id {
                self.require_category(&db_tx, actor.family_id, category_id)
                    .await?;
            }
            recurring_rules::ActiveModel::from(&rule)
                .insert(&db_tx)
                .await?;
            tracing::info!(rule_id = %rule.id, kind = rule.kind.as_str(), "rule created");
            Ok(rule)
        })
    }

    /// Patches description, amount, category, frequency or end date.
    pub async fn update_rule(&self, cmd: UpdateRuleCmd) -> ResultEngine<RecurringRule> {
        with_write_tx!(self, |db_tx| {
            let mut rule = self.require_rule(&db_tx, &cmd.actor, cmd.rule_id).await?;
            if let Some(description) = cmd.description.as_deref() {
                rule.description = normalize_required_name(description, "rule")?;
            }
            if let Some(amount_minor) = cmd.amount_minor {
                rule.amount_minor = amount_minor;
            }
            if let Some(category_id) = cmd.category_id {
                if let Some(id) = category_id {
                    self.require_category(&db_tx, cmd.actor.family_id, id)
                        .await?;
                }
                rule.category_id = category_id;
            }
            if let Some(frequency) = cmd.frequency {
                rule.frequency = frequency;
            }
            if let Some(end_date) = cmd.end_date {
                rule.end_date = end_date;
            }
            rule.validate_shape()?;
            recurring_rules::ActiveModel::from(&rule)
                .update(&db_tx)
                .await?;
            Ok(rule)
        })
    }

    /// Flips `is_active`.
    pub async fn toggle_rule(&self, actor: &Actor, rule_id: Uuid) -> ResultEngine<RecurringRule> {
        with_write_tx!(self, |db_tx| {
            let mut rule = self.require_rule(&db_tx, actor, rule_id).await?;
            rule.is_active = !rule.is_active;
            recurring_rules::ActiveModel {
                id: ActiveValue::Set(rule.id),
                is_active: ActiveValue::Set(rule.is_active),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            Ok(rule)
        })
    }

    pub async fn delete_rule(&self, actor: &Actor, rule_id: Uuid) -> ResultEngine<()> {
        with_write_tx!(self, |db_tx| {
            let rule = self.require_rule(&db_tx, actor, rule_id).await?;
            recurring_rules::Entity::delete_by_id(rule.id)
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    /// Guardians see every rule of the family, other members their own.
    pub async fn list_rules(&self, actor: &Actor) -> ResultEngine<Vec<RecurringRule>> {
        with_tx!(self, |db_tx| {
            self.snapshot_for(&db_tx, actor).await?;
            let mut query = recurring_rules::Entity::find()
                .filter(recurring_rules::Column::FamilyId.eq(actor.family_id));
            if !actor.role.is_guardian() {
                query = query.filter(recurring_rules::Column::OwnerId.eq(actor.user_id));
            }
            query
                .order_by_asc(recurring_rules::Column::NextRunDate)
                .order_by_asc(recurring_rules::Column::Description)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(RecurringRule::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }

    /// Runs one scheduler tick for the calendar day `today`.
    ///
    /// Every active rule with `next_run_date <= today` is visited once: rules
    /// past their end date are deactivated, others fire and advance by one
    /// period. A rule that fails is reported and left unadvanced so it is
    /// retried on the next tick; the remaining rules still run.
    pub async fn run_due_rules(&self, today: NaiveDate) -> ResultEngine<SchedulerReport> {
        let due: Vec<Uuid> = with_tx!(self, |db_tx| {
            let ids = recurring_rules::Entity::find()
                .filter(recurring_rules::Column::IsActive.eq(true))
                .filter(recurring_rules::Column::NextRunDate.lte(today))
                .order_by_asc(recurring_rules::Column::NextRunDate)
                .order_by_asc(recurring_rules::Column::Id)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|model| model.id)
                .collect::<Vec<_>>();
            Ok::<_, EngineError>(ids)
        })?;

        tracing::info!(%today, due = due.len(), "scheduler tick started");
        let mut report = SchedulerReport {
            date: today,
            ..Default::default()
        };
        for rule_id in due {
            match self.fire_rule(rule_id, today).await {
                Ok(RuleOutcome::Fired) => report.fired.push(rule_id),
                Ok(RuleOutcome::Deactivated) => report.deactivated.push(rule_id),
                Ok(RuleOutcome::Skipped) => {}
                Err(err) => {
                    tracing::warn!(%rule_id, error = %err, "recurring rule failed");
                    report.failed.push(RuleFailure {
                        rule_id,
                        error: err.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            fired = report.fired.len(),
            deactivated = report.deactivated.len(),
            failed = report.failed.len(),
            "scheduler tick finished"
        );
        Ok(report)
    }

    /// Fires one rule and advances it, in a single transaction.
    async fn fire_rule(&self, rule_id: Uuid, today: NaiveDate) -> ResultEngine<RuleOutcome> {
        with_write_tx!(self, |db_tx| {
            let Some(model) = recurring_rules::Entity::find_by_id(rule_id)
                .one(&db_tx)
                .await?
            else {
                return Ok(RuleOutcome::Skipped);
            };
            let mut rule = RecurringRule::try_from(model)?;
            if !rule.is_due(today) {
                return Ok(RuleOutcome::Skipped);
            }
            if rule.is_expired() {
                rule.is_active = false;
                save_schedule(&db_tx, &rule).await?;
                tracing::info!(%rule_id, "recurring rule past its end date deactivated");
                return Ok(RuleOutcome::Deactivated);
            }

            let owner: User = users::Entity::find_by_id(rule.owner_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("user {}", rule.owner_id)))?
                .try_into()?;
            let actor = owner.actor();
            let snapshot = self.load_snapshot(&db_tx, actor.family_id).await?;
            let occurred_at = rule.next_run_date.and_time(NaiveTime::MIN).and_utc();
            let description = normalize_optional_text(Some(&rule.description));

            match rule.kind {
                RuleKind::Income | RuleKind::Expense => {
                    let (account_id, kind) = match rule.kind {
                        RuleKind::Income => (rule.to_account_id, TransactionKind::Income),
                        _ => (rule.from_account_id, TransactionKind::Expense),
                    };
                    let account_id = account_id.ok_or_else(|| {
                        EngineError::InvalidState("rule has no target account".to_string())
                    })?;
                    let mut cmd =
                        PostCmd::new(actor, account_id, kind, rule.amount_minor, occurred_at);
                    cmd.description = description;
                    cmd.category_id = rule.category_id;
                    self.post_in_tx(&db_tx, &snapshot, cmd).await?;
                }
                RuleKind::Transfer => {
                    let (Some(from), Some(to)) = (rule.from_account_id, rule.to_account_id) else {
                        return Err(EngineError::InvalidState(
                            "transfer rules need from_account_id and to_account_id".to_string(),
                        ));
                    };
                    let mut cmd = TransferCmd::new(actor, from, to, rule.amount_minor, occurred_at);
                    cmd.description = description;
                    cmd.category_id = rule.category_id;
                    self.transfer_in_tx(&db_tx, &snapshot, cmd).await?;
                }
            }

            rule.last_run_date = Some(rule.next_run_date);
            rule.next_run_date = rule.following_run_date()?;
            save_schedule(&db_tx, &rule).await?;
            tracing::info!(
                %rule_id,
                kind = rule.kind.as_str(),
                next_run_date = %rule.next_run_date,
                "recurring rule fired"
            );
            Ok(RuleOutcome::Fired)
        })
    }
}

async fn save_schedule(db: &DatabaseTransaction, rule: &RecurringRule) -> ResultEngine<()> {
    recurring_rules::ActiveModel {
        id: ActiveValue::Set(rule.id),
        next_run_date: ActiveValue::Set(rule.next_run_date),
        last_run_date: ActiveValue::Set(rule.last_run_date),
        is_active: ActiveValue::Set(rule.is_active),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}
