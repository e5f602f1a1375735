mod common;

use std::collections::HashSet;

use common::{Household, member};
use ledger::{AccountKind, EngineError, NewAccountCmd, Role};
use uuid::Uuid;

async fn visible(home: &Household, actor: &ledger::Actor) -> HashSet<Uuid> {
    home.engine
        .list_accounts(actor, None, true)
        .await
        .unwrap()
        .into_iter()
        .map(|account| account.id)
        .collect()
}

#[tokio::test]
async fn dependents_see_only_their_own_account() {
    let home = Household::new().await;
    home.engine
        .create_account(NewAccountCmd::new(home.head, "Household", AccountKind::Common))
        .await
        .unwrap();

    let child_view = visible(&home, &home.child).await;
    assert_eq!(child_view, HashSet::from([home.personal(&home.child).await]));

    let head_account = home.personal(&home.head).await;
    let err = home
        .engine
        .account(&home.teen, head_account)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn parents_see_dependents_but_not_the_heads_personal_account() {
    let home = Household::new().await;
    let common = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Household", AccountKind::Common))
        .await
        .unwrap();

    let parent_view = visible(&home, &home.parent).await;
    assert!(parent_view.contains(&home.personal(&home.parent).await));
    assert!(parent_view.contains(&home.personal(&home.teen).await));
    assert!(parent_view.contains(&home.personal(&home.child).await));
    assert!(parent_view.contains(&common.id));
    assert!(!parent_view.contains(&home.personal(&home.head).await));
    assert_eq!(parent_view.len(), 4);

    assert_eq!(visible(&home, &home.head).await.len(), 5);
}

#[tokio::test]
async fn guardians_added_later_still_see_dependents() {
    let home = Household::new().await;
    let late = member(&home.engine, home.family_id, "Carmen", Role::Parent).await;

    let view = visible(&home, &late).await;
    assert!(view.contains(&home.personal(&home.child).await));
    assert!(view.contains(&home.personal(&home.teen).await));
}

#[tokio::test]
async fn owners_share_and_unshare_their_accounts() {
    let home = Household::new().await;
    let head_account = home.personal(&home.head).await;

    home.engine
        .share_account(&home.head, head_account, home.teen.user_id)
        .await
        .unwrap();
    // Sharing twice is a no-op.
    home.engine
        .share_account(&home.head, head_account, home.teen.user_id)
        .await
        .unwrap();
    assert!(visible(&home, &home.teen).await.contains(&head_account));

    // A grantee cannot pass the account on.
    let err = home
        .engine
        .share_account(&home.teen, head_account, home.child.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied(_)));

    home.engine
        .unshare_account(&home.head, head_account, home.teen.user_id)
        .await
        .unwrap();
    assert!(!visible(&home, &home.teen).await.contains(&head_account));

    let err = home
        .engine
        .unshare_account(&home.head, head_account, home.head.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn sharing_with_outsiders_is_rejected() {
    let home = Household::new().await;
    let other = home.engine.create_family("Other").await.unwrap();
    let outsider = member(&home.engine, other.id, "Zoe", Role::HeadOfFamily).await;
    let head_account = home.personal(&home.head).await;

    let err = home
        .engine
        .share_account(&home.head, head_account, outsider.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    // Heads of family see nothing outside their own family.
    assert!(!visible(&home, &outsider).await.contains(&head_account));
}

#[tokio::test]
async fn common_balance_is_the_sum_of_guardian_accounts() {
    let home = Household::new().await;
    let common = home
        .engine
        .create_account(NewAccountCmd::new(home.head, "Household", AccountKind::Common))
        .await
        .unwrap();
    let head_account = home.personal(&home.head).await;
    let parent_account = home.personal(&home.parent).await;
    let child_account = home.personal(&home.child).await;

    home.income(&home.head, head_account, 1_000).await;
    home.income(&home.parent, parent_account, 500).await;
    home.income(&home.parent, child_account, 300).await;

    let shown = home.engine.account(&home.head, common.id).await.unwrap();
    assert_eq!(shown.balance_minor, 1_500);
    let listed = home
        .engine
        .list_accounts(&home.parent, Some(AccountKind::Common), false)
        .await
        .unwrap();
    assert_eq!(listed[0].balance_minor, 1_500);
}

#[tokio::test]
async fn members_list_their_family() {
    let home = Household::new().await;
    let members = home.engine.family_members(&home.child).await.unwrap();
    let names: Vec<&str> = members.iter().map(|user| user.name.as_str()).collect();
    assert_eq!(names, vec!["ana", "luis", "mateo", "sofia"]);
}
