use chrono::{DateTime, Utc};
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    AccountKind, Actor, EngineError, FamilySnapshot, Permission, PostCmd, ResultEngine,
    Transaction, TransactionKind, UpdatePostingCmd, transactions,
    util::{normalize_optional_text, require_positive},
};

use super::{
    Engine,
    access::require_permission,
    balances::{apply_delta, debit_covered},
    expected_expenses::reopen_plans,
    with_tx, with_write_tx,
};

/// Filters for listing postings.
///
/// `from` is inclusive and `to` is exclusive (`[from, to)`), both in UTC.
#[derive(Clone, Debug, Default)]
pub struct PostingListFilter {
    pub account_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    /// Case-insensitive substring of the description.
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub sort: PostingSort,
    pub limit: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PostingSort {
    #[default]
    DateDesc,
    DateAsc,
    AmountDesc,
    AmountAsc,
}

fn validate_list_filter(filter: &PostingListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from >= to
    {
        return Err(EngineError::InvalidValue(
            "invalid range: from must be < to".to_string(),
        ));
    }
    if filter.limit == Some(0) {
        return Err(EngineError::InvalidValue("limit must be > 0".to_string()));
    }
    Ok(())
}

/// Who may post to an account: guardians to any visible account, other
/// members only to their own Personal account.
pub(super) fn require_post_rights(
    snapshot: &FamilySnapshot,
    actor: &Actor,
    account_id: Uuid,
) -> ResultEngine<()> {
    let account = snapshot.require_visible(actor, account_id)?;
    account.require_active()?;
    if !account.kind.accepts_direct_postings() {
        return Err(EngineError::InvalidAccountType(format!(
            "{} account '{}' only accepts transfers",
            account.kind.as_str(),
            account.name
        )));
    }
    let own_personal = account.kind == AccountKind::Personal && account.is_owned_by(actor.user_id);
    if !own_personal && !actor.role.allows(Permission::PostToAnyAccount) {
        return Err(EngineError::PermissionDenied(format!(
            "{} may only post to their own personal account",
            actor.role.as_str()
        )));
    }
    Ok(())
}

impl Engine {
    /// Validates and writes a single posting inside `db`.
    pub(super) async fn post_in_tx(
        &self,
        db: &DatabaseTransaction,
        snapshot: &FamilySnapshot,
        cmd: PostCmd,
    ) -> ResultEngine<Transaction> {
        let PostCmd {
            actor,
            account_id,
            kind,
            amount_minor,
            description,
            category_id,
            is_family_expense,
            occurred_at,
        } = cmd;
        require_positive(amount_minor)?;
        require_post_rights(snapshot, &actor, account_id)?;
        if let Some(category_id) = category_id {
            self.require_category(db, actor.family_id, category_id)
                .await?;
        }

        let mut posting =
            Transaction::new(account_id, kind, amount_minor, actor.user_id, occurred_at)?;
        posting.description = normalize_optional_text(description.as_deref());
        posting.category_id = category_id;
        posting.is_family_expense = is_family_expense;

        transactions::ActiveModel::from(&posting).insert(db).await?;
        apply_delta(db, account_id, posting.signed_amount()).await?;
        Ok(posting)
    }

    /// Records an income or expense on a Personal or Emergency account.
    pub async fn post(&self, cmd: PostCmd) -> ResultEngine<Transaction> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &cmd.actor).await?;
            self.post_in_tx(&db_tx, &snapshot, cmd).await
        })
    }

    /// The other leg of a transfer.
    async fn partner_leg(
        &self,
        db: &DatabaseTransaction,
        leg: &Transaction,
    ) -> ResultEngine<Option<Transaction>> {
        let Some(transfer_id) = leg.transfer_id else {
            return Ok(None);
        };
        transactions::Entity::find()
            .filter(transactions::Column::TransferId.eq(transfer_id))
            .filter(transactions::Column::Id.ne(leg.id))
            .one(db)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    /// Loads a posting the actor may edit.
    async fn editable_posting(
        &self,
        db: &DatabaseTransaction,
        snapshot: &FamilySnapshot,
        actor: &Actor,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let posting = self.find_transaction(db, transaction_id).await?;
        snapshot
            .require_visible(actor, posting.account_id)
            .map_err(|_| EngineError::NotFound(format!("transaction {transaction_id}")))?;
        require_permission(actor, Permission::EditPostings)?;
        Ok(posting)
    }

    /// Changes a posting, replacing its old balance effect with the new one.
    ///
    /// On a transfer leg an amount change is applied to both legs and both
    /// balances, with the source funds checked again. Changing the kind of a
    /// transfer leg is rejected.
    pub async fn update_posting(&self, cmd: UpdatePostingCmd) -> ResultEngine<Transaction> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, &cmd.actor).await?;
            let old = self
                .editable_posting(&db_tx, &snapshot, &cmd.actor, cmd.transaction_id)
                .await?;
            if cmd.is_empty() {
                return Ok(old);
            }

            let mut new = old.clone();
            if let Some(kind) = cmd.kind {
                new.kind = kind;
            }
            if let Some(amount_minor) = cmd.amount_minor {
                require_positive(amount_minor)?;
                new.amount_minor = amount_minor;
            }
            if let Some(description) = cmd.description.as_deref() {
                new.description = normalize_optional_text(Some(description));
            }
            if let Some(category_id) = cmd.category_id {
                if let Some(id) = category_id {
                    self.require_category(&db_tx, cmd.actor.family_id, id)
                        .await?;
                }
                new.category_id = category_id;
            }
            if let Some(occurred_at) = cmd.occurred_at {
                new.occurred_at = occurred_at;
            }

            match self.partner_leg(&db_tx, &old).await? {
                None => {
                    if let Some(account) = snapshot.accounts.get(&old.account_id) {
                        account.require_active()?;
                    }
                    apply_delta(
                        &db_tx,
                        old.account_id,
                        new.signed_amount() - old.signed_amount(),
                    )
                    .await?;
                }
                Some(mut partner) => {
                    if new.kind != old.kind {
                        return Err(EngineError::InvalidState(
                            "the kind of a transfer leg cannot change".to_string(),
                        ));
                    }
                    for leg in [&old, &partner] {
                        if let Some(account) = snapshot.accounts.get(&leg.account_id) {
                            account.require_active()?;
                        }
                    }
                    let delta = new.amount_minor - old.amount_minor;
                    let (source, destination) = if old.kind == TransactionKind::Expense {
                        (old.account_id, partner.account_id)
                    } else {
                        (partner.account_id, old.account_id)
                    };
                    if delta > 0 {
                        debit_covered(&db_tx, source, delta).await?;
                    } else {
                        apply_delta(&db_tx, source, -delta).await?;
                    }
                    apply_delta(&db_tx, destination, delta).await?;

                    partner.amount_minor = new.amount_minor;
                    partner.occurred_at = new.occurred_at;
                    transactions::ActiveModel::from(&partner)
                        .update(&db_tx)
                        .await?;
                }
            }

            transactions::ActiveModel::from(&new).update(&db_tx).await?;
            Ok(new)
        })
    }

    /// Deletes a posting and reverses its balance effect. Deleting a transfer
    /// leg deletes both legs. Returns the deleted posting.
    pub async fn delete_posting(
        &self,
        actor: &Actor,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        with_write_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let posting = self
                .editable_posting(&db_tx, &snapshot, actor, transaction_id)
                .await?;
            let mut legs = vec![posting.clone()];
            legs.extend(self.partner_leg(&db_tx, &posting).await?);
            for leg in &legs {
                apply_delta(&db_tx, leg.account_id, -leg.signed_amount()).await?;
                transactions::Entity::delete_by_id(leg.id)
                    .exec(&db_tx)
                    .await?;
            }
            reopen_plans(&db_tx, legs.iter().map(|leg| leg.id).collect()).await?;
            Ok(posting)
        })
    }

    /// Postings on accounts visible to `actor`.
    pub async fn list_postings(
        &self,
        actor: &Actor,
        filter: &PostingListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        validate_list_filter(filter)?;
        with_tx!(self, |db_tx| {
            let snapshot = self.snapshot_for(&db_tx, actor).await?;
            let account_ids: Vec<Uuid> = match filter.account_id {
                Some(id) => vec![snapshot.require_visible(actor, id)?.id],
                None => snapshot.accounts_for(actor).iter().map(|a| a.id).collect(),
            };

            let mut query = transactions::Entity::find()
                .filter(transactions::Column::AccountId.is_in(account_ids));
            if let Some(kind) = filter.kind {
                query = query.filter(transactions::Column::Kind.eq(kind.as_str()));
            }
            if let Some(search) = normalize_optional_text(filter.search.as_deref()) {
                query = query.filter(transactions::Column::Description.contains(search));
            }
            if let Some(from) = filter.from {
                query = query.filter(transactions::Column::OccurredAt.gte(from));
            }
            if let Some(to) = filter.to {
                query = query.filter(transactions::Column::OccurredAt.lt(to));
            }
            query = match filter.sort {
                PostingSort::DateDesc => query
                    .order_by_desc(transactions::Column::OccurredAt)
                    .order_by_desc(transactions::Column::Id),
                PostingSort::DateAsc => query
                    .order_by_asc(transactions::Column::OccurredAt)
                    .order_by_asc(transactions::Column::Id),
                PostingSort::AmountDesc => query
                    .order_by_desc(transactions::Column::AmountMinor)
                    .order_by_desc(transactions::Column::OccurredAt),
                PostingSort::AmountAsc => query
                    .order_by_asc(transactions::Column::AmountMinor)
                    .order_by_desc(transactions::Column::OccurredAt),
            };
            if let Some(limit) = filter.limit {
                query = query.limit(limit);
            }
            query
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}
