mod common;

use common::{Household, at};
use ledger::{
    AccountKind, EngineError, NewAccountCmd, PostingListFilter, TransactionKind, TransferCmd,
};

#[tokio::test]
async fn transfer_moves_money_in_two_linked_legs() {
    let home = Household::new().await;
    let from = home.personal(&home.head).await;
    let goal = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Holiday", AccountKind::Goal))
        .await
        .unwrap()
        .id;
    home.income(&home.head, from, 10_000).await;

    let transfer_id = home
        .engine
        .transfer(
            TransferCmd::new(home.head, from, goal, 2_500, at(2025, 3, 12)).description("June trip"),
        )
        .await
        .unwrap();

    assert_eq!(home.balance(from).await, 7_500);
    assert_eq!(home.balance(goal).await, 2_500);

    let legs = home.engine.transfer_legs(&home.head, transfer_id).await.unwrap();
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].kind, TransactionKind::Expense);
    assert_eq!(legs[0].account_id, from);
    assert_eq!(legs[0].description.as_deref(), Some("Transfer -> Holiday: June trip"));
    assert_eq!(legs[1].kind, TransactionKind::Income);
    assert_eq!(legs[1].account_id, goal);
    assert_eq!(legs[1].description.as_deref(), Some("Transfer <- Ana's account: June trip"));
    assert!(legs.iter().all(|leg| leg.transfer_id == Some(transfer_id)));
    assert!(!legs[0].is_family_expense);
}

#[tokio::test]
async fn insufficient_funds_leaves_no_trace() {
    let home = Household::new().await;
    let from = home.personal(&home.head).await;
    let to = home.personal(&home.parent).await;
    home.income(&home.head, from, 100).await;

    let err = home
        .engine
        .transfer(TransferCmd::new(home.head, from, to, 101, at(2025, 3, 12)))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InsufficientFunds(_)));
    assert_eq!(home.balance(from).await, 100);
    assert_eq!(home.balance(to).await, 0);
    let postings = home
        .engine
        .list_postings(&home.head, &PostingListFilter::default())
        .await
        .unwrap();
    assert_eq!(postings.len(), 1);
}

#[tokio::test]
async fn exact_balance_can_be_transferred() {
    let home = Household::new().await;
    let from = home.personal(&home.teen).await;
    let goal = home
        .engine
        .create_account(
            NewAccountCmd::new(home.teen, "Console", AccountKind::Goal).goal(30_000, None),
        )
        .await
        .unwrap()
        .id;
    home.income(&home.teen, from, 4_000).await;

    home.engine
        .transfer(TransferCmd::new(home.teen, from, goal, 4_000, at(2025, 3, 12)))
        .await
        .unwrap();

    assert_eq!(home.balance(from).await, 0);
    assert_eq!(home.balance(goal).await, 4_000);
}

#[tokio::test]
async fn same_account_and_bad_amounts_are_invalid() {
    let home = Household::new().await;
    let account = home.personal(&home.head).await;
    let other = home.personal(&home.parent).await;
    home.income(&home.head, account, 1_000).await;

    let err = home
        .engine
        .transfer(TransferCmd::new(home.head, account, account, 100, at(2025, 3, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    let err = home
        .engine
        .transfer(TransferCmd::new(home.head, account, other, 0, at(2025, 3, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(home.balance(account).await, 1_000);
}

#[tokio::test]
async fn dependents_transfer_only_from_their_own_accounts() {
    let home = Household::new().await;
    let head_account = home.personal(&home.head).await;
    let teen_account = home.personal(&home.teen).await;
    home.income(&home.head, head_account, 1_000).await;
    home.engine
        .share_account(&home.head, head_account, home.teen.user_id)
        .await
        .unwrap();

    let err = home
        .engine
        .transfer(TransferCmd::new(home.teen, head_account, teen_account, 100, at(2025, 3, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));
    assert_eq!(home.balance(head_account).await, 1_000);
}

#[tokio::test]
async fn guardian_to_child_transfer_is_a_family_expense() {
    let home = Household::new().await;
    let from = home.personal(&home.parent).await;
    let to = home.personal(&home.child).await;
    home.income(&home.parent, from, 2_000).await;

    let transfer_id = home
        .engine
        .transfer(
            TransferCmd::new(home.parent, from, to, 500, at(2025, 3, 15)).description("allowance"),
        )
        .await
        .unwrap();

    let legs = home.engine.transfer_legs(&home.parent, transfer_id).await.unwrap();
    assert!(legs[0].is_family_expense);
    assert!(!legs[1].is_family_expense);

    // The child only sees its own leg.
    let child_legs = home.engine.transfer_legs(&home.child, transfer_id).await.unwrap();
    assert_eq!(child_legs.len(), 1);
    assert_eq!(child_legs[0].account_id, to);
}

#[tokio::test]
async fn archived_destination_rejects_transfers() {
    let home = Household::new().await;
    let from = home.personal(&home.head).await;
    let emergency = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Rainy day", AccountKind::Emergency))
        .await
        .unwrap()
        .id;
    home.income(&home.head, from, 1_000).await;
    home.engine
        .set_account_archived(&home.head, emergency, true)
        .await
        .unwrap();

    let err = home
        .engine
        .transfer(TransferCmd::new(home.head, from, emergency, 100, at(2025, 3, 1)))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::InvalidState(_)));
    assert_eq!(home.balance(from).await, 1_000);
}

#[tokio::test]
async fn concurrent_transfers_never_overdraw() {
    let home = Household::new().await;
    let from = home.personal(&home.head).await;
    let to = home.personal(&home.parent).await;
    home.income(&home.head, from, 1_000).await;

    let attempt = || {
        home.engine
            .transfer(TransferCmd::new(home.head, from, to, 300, at(2025, 3, 20)))
    };
    let (a, b, c, d) = tokio::join!(attempt(), attempt(), attempt(), attempt());
    let results = [a, b, c, d];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, EngineError::InsufficientFunds(_))));
    assert_eq!(home.balance(from).await, 100);
    assert_eq!(home.balance(to).await, 900);
    assert!(home.engine.audit_balances(&home.head).await.unwrap().is_empty());
}
