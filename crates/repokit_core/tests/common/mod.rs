#![allow(dead_code)]

use repokit_core::db::{open_store_in_memory, SqliteStore};
use repokit_core::model::entity::{EntityId, Timestamp};
use repokit_core::store::{Row, Statement, StoreDriver, StoreResult};
use repokit_core::{AuditingInterceptor, Clock, FlushMode, Session, SessionConfig};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicI64, Ordering};

/// SQLite driver that records every statement it runs.
pub struct CountingStore {
    inner: SqliteStore,
    queries: Cell<usize>,
    executes: Cell<usize>,
    statements: RefCell<Vec<String>>,
}

impl CountingStore {
    pub fn in_memory() -> Self {
        Self {
            inner: open_store_in_memory().unwrap(),
            queries: Cell::new(0),
            executes: Cell::new(0),
            statements: RefCell::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }

    pub fn executes(&self) -> usize {
        self.executes.get()
    }

    pub fn calls(&self) -> usize {
        self.queries() + self.executes()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    pub fn reset(&self) {
        self.queries.set(0);
        self.executes.set(0);
        self.statements.borrow_mut().clear();
    }

    pub fn sqlite(&self) -> &SqliteStore {
        &self.inner
    }
}

impl StoreDriver for CountingStore {
    fn query(&self, statement: &Statement) -> StoreResult<Vec<Row>> {
        self.queries.set(self.queries.get() + 1);
        self.statements.borrow_mut().push(statement.sql.clone());
        self.inner.query(statement)
    }

    fn execute(&self, statement: &Statement) -> StoreResult<usize> {
        self.executes.set(self.executes.get() + 1);
        self.statements.borrow_mut().push(statement.sql.clone());
        self.inner.execute(statement)
    }

    fn next_id(&self, sequence: &str) -> StoreResult<EntityId> {
        self.inner.next_id(sequence)
    }

    fn begin(&self) -> StoreResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> StoreResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> StoreResult<()> {
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn savepoint(&self, name: &str) -> StoreResult<()> {
        self.inner.savepoint(name)
    }

    fn release_savepoint(&self, name: &str) -> StoreResult<()> {
        self.inner.release_savepoint(name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> StoreResult<()> {
        self.inner.rollback_to_savepoint(name)
    }
}

pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// Advances by `step` on every reading, starting at `start`.
pub struct StepClock {
    next: AtomicI64,
    step: i64,
}

impl StepClock {
    pub fn new(start: Timestamp, step: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
            step,
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> Timestamp {
        self.next.fetch_add(self.step, Ordering::SeqCst)
    }
}

pub fn auditor(actor: &str) -> AuditingInterceptor {
    let actor = actor.to_string();
    AuditingInterceptor::new(move || Some(actor.clone()))
}

pub fn session(driver: &dyn StoreDriver) -> Session<'_> {
    Session::new(driver, auditor("tester"))
}

pub fn commit_mode_session(driver: &dyn StoreDriver) -> Session<'_> {
    Session::with_config(
        driver,
        auditor("tester"),
        SessionConfig {
            flush_mode: FlushMode::Commit,
        },
    )
}
