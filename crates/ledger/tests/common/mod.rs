#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::Database;

use ledger::{AccountKind, Actor, Engine, PostCmd, Role, TransactionKind};
use migration::MigratorTrait;
use uuid::Uuid;

pub async fn engine() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    Engine::builder().database(db).build().await.unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

/// A family with one member of every role, created guardians first.
pub struct Household {
    pub engine: Engine,
    pub family_id: Uuid,
    pub head: Actor,
    pub parent: Actor,
    pub teen: Actor,
    pub child: Actor,
}

impl Household {
    pub async fn new() -> Self {
        let engine = engine().await;
        let family = engine.create_family("Rivera").await.unwrap();
        let head = member(&engine, family.id, "Ana", Role::HeadOfFamily).await;
        let parent = member(&engine, family.id, "Luis", Role::Parent).await;
        let teen = member(&engine, family.id, "Sofia", Role::Teen).await;
        let child = member(&engine, family.id, "Mateo", Role::Child).await;
        Self {
            engine,
            family_id: family.id,
            head,
            parent,
            teen,
            child,
        }
    }

    /// The Personal account of `actor`.
    pub async fn personal(&self, actor: &Actor) -> Uuid {
        self.engine
            .list_accounts(actor, Some(AccountKind::Personal), false)
            .await
            .unwrap()
            .into_iter()
            .find(|account| account.owner_id == Some(actor.user_id))
            .unwrap()
            .id
    }

    pub async fn balance(&self, account_id: Uuid) -> i64 {
        self.engine
            .account(&self.head, account_id)
            .await
            .unwrap()
            .balance_minor
    }

    pub async fn income(&self, actor: &Actor, account_id: Uuid, amount_minor: i64) -> Uuid {
        self.engine
            .post(PostCmd::new(
                *actor,
                account_id,
                TransactionKind::Income,
                amount_minor,
                at(2025, 3, 10),
            ))
            .await
            .unwrap()
            .id
    }
}

pub async fn member(engine: &Engine, family_id: Uuid, display_name: &str, role: Role) -> Actor {
    engine
        .create_user(family_id, &display_name.to_lowercase(), display_name, role)
        .await
        .unwrap()
        .actor()
}
