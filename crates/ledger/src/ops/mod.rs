use sea_orm::DatabaseConnection;
use tokio::sync::Mutex;

use crate::ResultEngine;

mod access;
mod accounts;
mod analytics;
mod balances;
mod categories;
mod expected_expenses;
mod families;
mod postings;
mod rules;
mod sharing;
mod transfers;

pub use balances::BalanceDrift;
pub use postings::{PostingListFilter, PostingSort};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
///
/// The block runs as its own future, so an early `return` or `?` inside it
/// ends the block and still reaches the commit or rollback below.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = async { $body }.await;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// Like `with_tx!`, holding the engine's write gate until the transaction ends.
///
/// Scheduler ticks and user mutations share the gate, so writes against the
/// same account are applied one after the other.
macro_rules! with_write_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let _gate = $self.write_gate.lock().await;
        let $tx = $self.database.begin().await?;
        let result: $crate::ResultEngine<_> = async { $body }.await;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use {with_tx, with_write_tx};

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    write_gate: Mutex<()>,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            write_gate: Mutex::new(()),
        })
    }
}
