mod common;

use common::{Household, at};
use ledger::{
    AccountKind, EngineError, NewAccountCmd, PostCmd, PostingListFilter, PostingSort,
    TransactionKind, TransferCmd, UpdatePostingCmd,
};

#[tokio::test]
async fn balance_tracks_the_sum_of_postings() {
    let home = Household::new().await;
    let account = home.personal(&home.head).await;

    home.income(&home.head, account, 10_000).await;
    home.engine
        .post(PostCmd::new(
            home.head,
            account,
            TransactionKind::Expense,
            2_550,
            at(2025, 3, 11),
        ))
        .await
        .unwrap();

    assert_eq!(home.balance(account).await, 7_450);
    assert!(home.engine.audit_balances(&home.head).await.unwrap().is_empty());
}

#[tokio::test]
async fn expense_may_take_a_personal_account_negative() {
    let home = Household::new().await;
    let account = home.personal(&home.parent).await;

    home.engine
        .post(PostCmd::new(
            home.parent,
            account,
            TransactionKind::Expense,
            500,
            at(2025, 3, 1),
        ))
        .await
        .unwrap();

    assert_eq!(home.balance(account).await, -500);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let home = Household::new().await;
    let account = home.personal(&home.head).await;

    for amount in [0, -100] {
        let err = home
            .engine
            .post(PostCmd::new(
                home.head,
                account,
                TransactionKind::Income,
                amount,
                at(2025, 3, 1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }
    assert_eq!(home.balance(account).await, 0);
}

#[tokio::test]
async fn common_and_goal_accounts_only_take_transfers() {
    let home = Household::new().await;
    let common = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Household", AccountKind::Common))
        .await
        .unwrap();
    let goal = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Bike", AccountKind::Goal).goal(50_000, None))
        .await
        .unwrap();

    for account_id in [common.id, goal.id] {
        let err = home
            .engine
            .post(PostCmd::new(
                home.head,
                account_id,
                TransactionKind::Income,
                1_000,
                at(2025, 3, 1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAccountType(_)));
    }
}

#[tokio::test]
async fn dependents_post_only_to_their_own_account() {
    let home = Household::new().await;
    let teen_account = home.personal(&home.teen).await;
    let child_account = home.personal(&home.child).await;
    let head_account = home.personal(&home.head).await;

    home.income(&home.teen, teen_account, 2_000).await;
    assert_eq!(home.balance(teen_account).await, 2_000);

    let err = home
        .engine
        .post(PostCmd::new(
            home.teen,
            child_account,
            TransactionKind::Income,
            100,
            at(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // Shared with the teen, still not theirs to post to.
    home.engine
        .share_account(&home.head, head_account, home.teen.user_id)
        .await
        .unwrap();
    let err = home
        .engine
        .post(PostCmd::new(
            home.teen,
            head_account,
            TransactionKind::Expense,
            100,
            at(2025, 3, 1),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
}

#[tokio::test]
async fn guardians_post_to_a_childs_account() {
    let home = Household::new().await;
    let child_account = home.personal(&home.child).await;

    home.income(&home.parent, child_account, 1_500).await;

    assert_eq!(home.balance(child_account).await, 1_500);
}

#[tokio::test]
async fn update_reverses_the_old_effect_first() {
    let home = Household::new().await;
    let account = home.personal(&home.head).await;
    home.income(&home.head, account, 1_000).await;
    let expense = home
        .engine
        .post(PostCmd::new(
            home.head,
            account,
            TransactionKind::Expense,
            100,
            at(2025, 3, 2),
        ))
        .await
        .unwrap();
    assert_eq!(home.balance(account).await, 900);

    home.engine
        .update_posting(UpdatePostingCmd::new(home.head, expense.id).amount_minor(150))
        .await
        .unwrap();
    assert_eq!(home.balance(account).await, 850);

    home.engine
        .update_posting(UpdatePostingCmd::new(home.head, expense.id).kind(TransactionKind::Income))
        .await
        .unwrap();
    assert_eq!(home.balance(account).await, 1_150);
    assert!(home.engine.audit_balances(&home.head).await.unwrap().is_empty());
}

#[tokio::test]
async fn dependents_cannot_edit_postings() {
    let home = Household::new().await;
    let account = home.personal(&home.teen).await;
    let posting = home.income(&home.teen, account, 700).await;

    let err = home
        .engine
        .update_posting(UpdatePostingCmd::new(home.teen, posting).amount_minor(900))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    let err = home.engine.delete_posting(&home.teen, posting).await.unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert_eq!(home.balance(account).await, 700);
}

#[tokio::test]
async fn delete_reverses_the_posting() {
    let home = Household::new().await;
    let account = home.personal(&home.parent).await;
    let keep = home.income(&home.parent, account, 400).await;
    let drop = home.income(&home.parent, account, 250).await;

    let deleted = home.engine.delete_posting(&home.parent, drop).await.unwrap();

    assert_eq!(deleted.id, drop);
    assert_eq!(home.balance(account).await, 400);
    let err = home.engine.delete_posting(&home.parent, drop).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    home.engine.delete_posting(&home.parent, keep).await.unwrap();
    assert_eq!(home.balance(account).await, 0);
}

#[tokio::test]
async fn archived_accounts_reject_postings() {
    let home = Household::new().await;
    let emergency = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Rainy day", AccountKind::Emergency))
        .await
        .unwrap();
    home.income(&home.head, emergency.id, 5_000).await;

    home.engine
        .set_account_archived(&home.head, emergency.id, true)
        .await
        .unwrap();
    let err = home
        .engine
        .post(PostCmd::new(
            home.head,
            emergency.id,
            TransactionKind::Expense,
            100,
            at(2025, 3, 3),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let listed = home
        .engine
        .list_accounts(&home.head, Some(AccountKind::Emergency), false)
        .await
        .unwrap();
    assert!(listed.is_empty());
    let listed = home
        .engine
        .list_accounts(&home.head, Some(AccountKind::Emergency), true)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn listing_filters_and_sorts_visible_postings() {
    let home = Household::new().await;
    let head_account = home.personal(&home.head).await;
    let teen_account = home.personal(&home.teen).await;
    for (amount, day, description) in [(300, 5, "groceries"), (1_200, 1, "salary"), (80, 9, "Groceries run")] {
        let kind = if description == "salary" {
            TransactionKind::Income
        } else {
            TransactionKind::Expense
        };
        home.engine
            .post(
                PostCmd::new(home.head, head_account, kind, amount, at(2025, 3, day))
                    .description(description),
            )
            .await
            .unwrap();
    }
    home.income(&home.teen, teen_account, 50).await;

    let all = home
        .engine
        .list_postings(&home.head, &PostingListFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.windows(2).all(|w| w[0].occurred_at >= w[1].occurred_at));

    let teen_view = home
        .engine
        .list_postings(&home.teen, &PostingListFilter::default())
        .await
        .unwrap();
    assert_eq!(teen_view.len(), 1);

    let filter = PostingListFilter {
        account_id: Some(head_account),
        kind: Some(TransactionKind::Expense),
        search: Some("groceries".to_string()),
        sort: PostingSort::AmountDesc,
        ..Default::default()
    };
    let groceries = home.engine.list_postings(&home.head, &filter).await.unwrap();
    let amounts: Vec<i64> = groceries.iter().map(|p| p.amount_minor).collect();
    assert_eq!(amounts, vec![300, 80]);

    let filter = PostingListFilter {
        from: Some(at(2025, 3, 2)),
        to: Some(at(2025, 3, 1)),
        ..Default::default()
    };
    let err = home.engine.list_postings(&home.head, &filter).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidValue(_)));
}

#[tokio::test]
async fn transfer_legs_are_updated_together() {
    let home = Household::new().await;
    let from = home.personal(&home.head).await;
    let to = home.personal(&home.child).await;
    home.income(&home.head, from, 1_000).await;
    home.engine
        .transfer(TransferCmd::new(home.head, from, to, 200, at(2025, 3, 4)))
        .await
        .unwrap();
    let leg = home
        .engine
        .list_postings(
            &home.head,
            &PostingListFilter {
                account_id: Some(to),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .remove(0);

    home.engine
        .update_posting(UpdatePostingCmd::new(home.head, leg.id).amount_minor(350))
        .await
        .unwrap();
    assert_eq!(home.balance(from).await, 650);
    assert_eq!(home.balance(to).await, 350);

    let err = home
        .engine
        .update_posting(UpdatePostingCmd::new(home.head, leg.id).amount_minor(5_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientFunds(_)));

    let err = home
        .engine
        .update_posting(UpdatePostingCmd::new(home.head, leg.id).kind(TransactionKind::Expense))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    home.engine.delete_posting(&home.head, leg.id).await.unwrap();
    assert_eq!(home.balance(from).await, 1_000);
    assert_eq!(home.balance(to).await, 0);
    assert!(home.engine.audit_balances(&home.head).await.unwrap().is_empty());
}
