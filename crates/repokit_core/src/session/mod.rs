//! Identity map and unit of work.
//!
//! # Responsibility
//! - Track every entity loaded or inserted during one unit of work.
//! - Reconcile in-memory mutations with the store on `flush`.
//! - Route inserts and updates through the auditing interceptor.
//!
//! # Invariants
//! - At most one in-memory instance per `(table, id)` per session.
//! - Snapshots refresh only after every statement of a flush succeeded.
//! - Read-only entries carry no snapshot and are never dirty-checked.
//! - A session is single-threaded (`Rc` handles make it `!Send`).
//! - Handles must not be borrowed while a session call runs.
//! - A failed flush undoes its own writes, also inside a caller transaction.
//! - Sessions sharing a driver take turns: while one holds the driver's
//!   transaction, writes from the others fail with `StoreUnavailable`.

mod audit;

pub use audit::{ActorResolver, AuditingInterceptor, Clock, SystemClock};

use crate::model::entity::{
    AuditFields, Entity, EntityId, EntitySchema, Managed, AUDIT_COLUMNS,
};
use crate::model::relation::Reference;
use crate::model::value::Value;
use crate::repo::error::{RepoError, RepoResult};
use crate::store::{Row, RowView, Statement, StoreDriver, StoreError, StoreErrorKind, StoreResult};
use log::{debug, error, info, warn};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;
use uuid::Uuid;

/// When pending changes are written to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Before every query, count and bulk statement, and on commit.
    #[default]
    Auto,
    /// Only on explicit `flush` or `commit`.
    Commit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub flush_mode: FlushMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    New,
    Managed,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntityKey {
    table: &'static str,
    id: EntityId,
}

impl EntityKey {
    fn of<E: Entity>(id: EntityId) -> Self {
        Self {
            table: E::schema().table,
            id,
        }
    }
}

/// Type-erased view of a tracked `RefCell<E>`.
trait Tracked {
    fn schema(&self) -> &'static EntitySchema;
    fn values(&self) -> Vec<Value>;
    fn audit(&self) -> AuditFields;
    fn validate(&self) -> RepoResult<()>;
    fn stamp_update(&self, auditor: &AuditingInterceptor);
}

impl<E: Entity> Tracked for RefCell<E> {
    fn schema(&self) -> &'static EntitySchema {
        E::schema()
    }

    fn values(&self) -> Vec<Value> {
        self.borrow().values()
    }

    fn audit(&self) -> AuditFields {
        self.borrow().audit().clone()
    }

    fn validate(&self) -> RepoResult<()> {
        self.borrow().validate()
    }

    fn stamp_update(&self, auditor: &AuditingInterceptor) {
        let mut entity = self.borrow_mut();
        auditor.on_update(entity.audit_mut(), E::schema().auditing);
    }
}

struct Entry {
    handle: Rc<dyn Any>,
    tracked: Rc<dyn Tracked>,
    snapshot: Option<Vec<Value>>,
    state: EntryState,
    seq: u64,
}

impl Entry {
    fn new<E: Entity>(handle: &Managed<E>, state: EntryState, read_only: bool, seq: u64) -> Self {
        let snapshot = (!read_only).then(|| handle.borrow().values());
        Self {
            handle: Rc::clone(handle) as Rc<dyn Any>,
            tracked: Rc::clone(handle) as Rc<dyn Tracked>,
            snapshot,
            state,
            seq,
        }
    }

    fn handle<E: Entity>(&self) -> RepoResult<Managed<E>> {
        Rc::clone(&self.handle)
            .downcast::<RefCell<E>>()
            .map_err(|_| {
                RepoError::InvalidData(format!(
                    "identity map entry is not a {}",
                    E::schema().name
                ))
            })
    }

    fn is_same<E: Entity>(&self, handle: &Managed<E>) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.handle), Rc::as_ptr(handle))
    }

    /// Column indexes (into `value_columns`) that differ from the snapshot.
    fn changed_columns(&self) -> Vec<usize> {
        let Some(snapshot) = &self.snapshot else {
            return Vec::new();
        };
        let current = self.tracked.values();
        current
            .iter()
            .zip(snapshot)
            .enumerate()
            .filter(|(_, (now, then))| now != then)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Counts of tracked entries by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub tracked: usize,
    pub new: usize,
    pub removed: usize,
    pub read_only: usize,
}

/// Statements written by one `flush`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl FlushSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// Undo boundary of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushScope {
    /// No caller transaction: the flush owns a whole transaction.
    Transaction,
    /// Inside the caller's transaction.
    Savepoint,
}

const FLUSH_SAVEPOINT: &str = "repokit_flush";

impl FlushScope {
    fn open(self, driver: &dyn StoreDriver) -> StoreResult<()> {
        match self {
            Self::Transaction => driver.begin(),
            Self::Savepoint => driver.savepoint(FLUSH_SAVEPOINT),
        }
    }

    fn close(self, driver: &dyn StoreDriver) -> RepoResult<()> {
        let closed = match self {
            Self::Transaction => driver.commit(),
            Self::Savepoint => driver.release_savepoint(FLUSH_SAVEPOINT),
        };
        Ok(closed?)
    }

    fn undo(self, driver: &dyn StoreDriver) -> StoreResult<()> {
        match self {
            Self::Transaction => driver.rollback(),
            Self::Savepoint => driver.rollback_to_savepoint(FLUSH_SAVEPOINT),
        }
    }
}

struct PendingWrite {
    key: EntityKey,
    kind: WriteKind,
    statement: Statement,
}

/// One unit of work over a shared store driver.
pub struct Session<'d> {
    id: Uuid,
    driver: &'d dyn StoreDriver,
    auditor: AuditingInterceptor,
    config: SessionConfig,
    entries: HashMap<EntityKey, Entry>,
    next_seq: u64,
    in_transaction: bool,
}

impl<'d> Session<'d> {
    pub fn new(driver: &'d dyn StoreDriver, auditor: AuditingInterceptor) -> Self {
        Self::with_config(driver, auditor, SessionConfig::default())
    }

    pub fn with_config(
        driver: &'d dyn StoreDriver,
        auditor: AuditingInterceptor,
        config: SessionConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(
            "event=session_open module=session status=ok session_id={} flush_mode={:?}",
            id, config.flush_mode
        );
        Self {
            id,
            driver,
            auditor,
            config,
            entries: HashMap::new(),
            next_seq: 0,
            in_transaction: false,
        }
    }

    /// Correlation id used in log events.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.config.flush_mode
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub(crate) fn driver(&self) -> &'d dyn StoreDriver {
        self.driver
    }

    /// Returns the tracked instance for `id`, reading the store only when the
    /// identity is not tracked yet. Entities removed in this session yield
    /// `None`.
    pub fn load<E: Entity>(&mut self, id: EntityId) -> RepoResult<Option<Managed<E>>> {
        if let Some(entry) = self.entries.get(&EntityKey::of::<E>(id)) {
            if entry.state == EntryState::Removed {
                return Ok(None);
            }
            return entry.handle::<E>().map(Some);
        }

        let schema = E::schema();
        let statement = Statement::new(
            format!(
                "SELECT {} FROM {} WHERE {} = ?",
                schema.all_columns().join(", "),
                schema.table,
                schema.id.column
            ),
            vec![Value::Integer(id)],
        );
        let rows = self.driver.query(&statement)?;
        match rows.first() {
            Some(row) => self.attach_row::<E>(row.view(), false).map(Some),
            None => Ok(None),
        }
    }

    /// Starts tracking a new entity. The id comes from the store sequence
    /// when absent; the INSERT itself is written at flush.
    pub fn insert<E: Entity>(&mut self, mut entity: E) -> RepoResult<Managed<E>> {
        let schema = E::schema();
        let id = match entity.id() {
            Some(id) => id,
            None => {
                self.ensure_write_access()?;
                let id = self.driver.next_id(schema.sequence)?;
                entity.assign_id(id);
                id
            }
        };
        let key = EntityKey::of::<E>(id);
        if self.entries.contains_key(&key) {
            return Err(RepoError::Validation(format!(
                "{} {id} is already tracked by this session",
                schema.name
            )));
        }

        self.auditor.on_insert(entity.audit_mut(), schema.auditing);
        let handle = Rc::new(RefCell::new(entity));
        self.register(key, &handle, EntryState::New, false);
        Ok(handle)
    }

    /// Copies a detached entity's state onto the managed instance with the
    /// same id. Audit fields stay under interceptor control. Entities
    /// without an id, or whose id the store does not know, are inserted.
    pub fn merge<E: Entity>(&mut self, entity: E) -> RepoResult<Managed<E>> {
        let Some(id) = entity.id() else {
            return self.insert(entity);
        };
        let Some(managed) = self.load::<E>(id)? else {
            return self.insert(entity);
        };
        if let Some(entry) = self.entries.get_mut(&EntityKey::of::<E>(id)) {
            // A merge makes a read-only instance writable again.
            if entry.snapshot.is_none() {
                entry.snapshot = Some(managed.borrow().values());
            }
        }
        {
            let mut current = managed.borrow_mut();
            let audit = current.audit().clone();
            *current = entity;
            *current.audit_mut() = audit;
        }
        Ok(managed)
    }

    /// Schedules a tracked entity for deletion. Entities never flushed are
    /// simply forgotten.
    pub fn remove<E: Entity>(&mut self, handle: &Managed<E>) -> RepoResult<()> {
        let key = self.key_of(handle)?;
        let state = match self.entries.get(&key) {
            Some(entry) if entry.is_same(handle) => entry.state,
            _ => {
                return Err(RepoError::Validation(format!(
                    "cannot remove a detached {} instance",
                    E::schema().name
                )))
            }
        };
        if state == EntryState::New {
            self.entries.remove(&key);
        } else if let Some(entry) = self.entries.get_mut(&key) {
            entry.state = EntryState::Removed;
        }
        Ok(())
    }

    /// Whether this exact instance is tracked (and not scheduled for removal).
    pub fn contains<E: Entity>(&self, handle: &Managed<E>) -> bool {
        let Some(id) = handle.borrow().id() else {
            return false;
        };
        self.entries
            .get(&EntityKey::of::<E>(id))
            .is_some_and(|entry| entry.state != EntryState::Removed && entry.is_same(handle))
    }

    /// Stops tracking one instance without flushing it.
    pub fn detach<E: Entity>(&mut self, handle: &Managed<E>) -> bool {
        let Some(id) = handle.borrow().id() else {
            return false;
        };
        let key = EntityKey::of::<E>(id);
        if self
            .entries
            .get(&key)
            .is_some_and(|entry| entry.is_same(handle))
        {
            self.entries.remove(&key);
            return true;
        }
        false
    }

    /// Detaches everything without flushing.
    pub fn clear(&mut self) {
        let detached = self.entries.len();
        self.entries.clear();
        info!(
            "event=session_clear module=session status=ok session_id={} detached={}",
            self.id, detached
        );
    }

    /// Whether a flush would write anything.
    pub fn is_dirty(&self) -> bool {
        self.entries.values().any(|entry| match entry.state {
            EntryState::New | EntryState::Removed => true,
            EntryState::Managed => !entry.changed_columns().is_empty(),
        })
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            tracked: self.entries.len(),
            ..SessionStats::default()
        };
        for entry in self.entries.values() {
            match entry.state {
                EntryState::New => stats.new += 1,
                EntryState::Removed => stats.removed += 1,
                EntryState::Managed => {}
            }
            if entry.snapshot.is_none() {
                stats.read_only += 1;
            }
        }
        stats
    }

    /// Loads the target of a lazy reference through the identity map and
    /// caches it on the reference.
    pub fn resolve<T: Entity>(
        &mut self,
        reference: &mut Reference<T>,
    ) -> RepoResult<Option<Managed<T>>> {
        if let Some(target) = reference.target() {
            return Ok(Some(target));
        }
        let Some(id) = reference.id() else {
            return Ok(None);
        };
        let target = self.load::<T>(id)?;
        if let Some(target) = &target {
            reference.resolve(Rc::clone(target));
        }
        Ok(target)
    }

    /// Writes inserts (registration order), dirty updates, then deletes.
    ///
    /// Without a caller transaction the statements run inside a transaction
    /// of their own; inside one they run under a savepoint. Either way a
    /// failure undoes this flush's writes and leaves the session untouched,
    /// so the caller can fix the state and flush again. Failed entries stay
    /// dirty; nothing is retried.
    pub fn flush(&mut self) -> RepoResult<FlushSummary> {
        let started_at = Instant::now();
        let writes = self.pending_writes()?;
        if writes.is_empty() {
            return Ok(FlushSummary::default());
        }

        let scope = if self.in_transaction {
            FlushScope::Savepoint
        } else {
            self.ensure_write_access()?;
            FlushScope::Transaction
        };
        scope.open(self.driver)?;
        let outcome = self
            .apply(&writes)
            .and_then(|()| scope.close(self.driver));
        if let Err(err) = outcome {
            if let Err(undo_err) = scope.undo(self.driver) {
                warn!(
                    "event=session_flush module=session status=rollback_failed session_id={} scope={:?} error={}",
                    self.id, scope, undo_err
                );
            }
            error!(
                "event=session_flush module=session status=error session_id={} scope={:?} duration_ms={} error_code={} error={}",
                self.id,
                scope,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            return Err(err);
        }

        let summary = self.settle(&writes);
        info!(
            "event=session_flush module=session status=ok session_id={} inserted={} updated={} deleted={} duration_ms={}",
            self.id,
            summary.inserted,
            summary.updated,
            summary.deleted,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    /// Opens a caller transaction on the driver.
    pub fn begin(&mut self) -> RepoResult<()> {
        if self.in_transaction {
            return Err(RepoError::Validation(
                "session already has an open transaction".to_string(),
            ));
        }
        self.ensure_write_access()?;
        self.driver.begin()?;
        self.in_transaction = true;
        Ok(())
    }

    /// Flushes, then commits. A failed flush leaves the transaction open so
    /// the caller can fix state or roll back.
    pub fn commit(&mut self) -> RepoResult<()> {
        if !self.in_transaction {
            return Err(RepoError::Validation(
                "no open transaction to commit".to_string(),
            ));
        }
        self.flush()?;
        self.driver.commit()?;
        self.in_transaction = false;
        Ok(())
    }

    /// Rolls back the caller transaction and detaches everything.
    pub fn rollback(&mut self) -> RepoResult<()> {
        if !self.in_transaction {
            return Err(RepoError::Validation(
                "no open transaction to roll back".to_string(),
            ));
        }
        self.in_transaction = false;
        self.clear();
        self.driver.rollback()?;
        Ok(())
    }

    /// Fails with `StoreUnavailable` while another session's transaction
    /// holds the driver.
    pub(crate) fn ensure_write_access(&self) -> RepoResult<()> {
        if self.in_transaction || !self.driver.in_transaction() {
            return Ok(());
        }
        warn!(
            "event=session_write module=session status=blocked session_id={} reason=driver_transaction_held",
            self.id
        );
        Err(RepoError::StoreUnavailable(StoreError::new(
            StoreErrorKind::Unavailable,
            "store driver is held by another session's transaction",
        )))
    }

    /// Flushes when the flush mode asks for it before a statement.
    pub(crate) fn auto_flush(&mut self) -> RepoResult<()> {
        if self.config.flush_mode == FlushMode::Auto {
            self.flush()?;
        }
        Ok(())
    }

    /// Decodes a root entity from `row`, returning the tracked instance when
    /// the identity is already known. Tracked state is never overwritten.
    pub(crate) fn attach_row<E: Entity>(
        &mut self,
        row: RowView<'_>,
        read_only: bool,
    ) -> RepoResult<Managed<E>> {
        let id = row.int(E::schema().id.column)?;
        let key = EntityKey::of::<E>(id);
        if let Some(entry) = self.entries.get(&key) {
            return entry.handle::<E>();
        }
        let handle = Rc::new(RefCell::new(E::from_row(row)?));
        self.register(key, &handle, EntryState::Managed, read_only);
        Ok(handle)
    }

    /// Materializes root entities and their fetched relations from one
    /// result set.
    pub(crate) fn hydrate<E: Entity>(
        &mut self,
        rows: &[Row],
        fetched: &[&str],
        read_only: bool,
    ) -> RepoResult<Vec<Managed<E>>> {
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let handle = self.attach_row::<E>(row.view(), read_only)?;
            for relation in fetched {
                let mut context = FetchContext {
                    session: &mut *self,
                    row,
                    read_only,
                };
                E::attach_fetched(&handle, relation, &mut context)?;
            }
            result.push(handle);
        }
        Ok(result)
    }

    fn register<E: Entity>(
        &mut self,
        key: EntityKey,
        handle: &Managed<E>,
        state: EntryState,
        read_only: bool,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(key, Entry::new(handle, state, read_only, seq));
    }

    fn key_of<E: Entity>(&self, handle: &Managed<E>) -> RepoResult<EntityKey> {
        handle
            .borrow()
            .id()
            .map(EntityKey::of::<E>)
            .ok_or_else(|| {
                RepoError::Validation(format!(
                    "{} instance has no id and is not tracked",
                    E::schema().name
                ))
            })
    }

    /// Validates every pending write, then stamps updates and renders
    /// statements. Nothing reaches the store here.
    fn pending_writes(&self) -> RepoResult<Vec<PendingWrite>> {
        let mut ordered: Vec<(&EntityKey, &Entry)> = self.entries.iter().collect();
        ordered.sort_by_key(|(_, entry)| entry.seq);

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for (key, entry) in ordered {
            match entry.state {
                EntryState::New => {
                    entry.tracked.validate()?;
                    inserts.push((*key, entry));
                }
                EntryState::Managed => {
                    let changed = entry.changed_columns();
                    if !changed.is_empty() {
                        entry.tracked.validate()?;
                        updates.push((*key, entry, changed));
                    }
                }
                EntryState::Removed => deletes.push((*key, entry)),
            }
        }

        let mut writes = Vec::with_capacity(inserts.len() + updates.len() + deletes.len());
        for (key, entry) in inserts {
            writes.push(PendingWrite {
                key,
                kind: WriteKind::Insert,
                statement: insert_statement(key, entry.tracked.as_ref()),
            });
        }
        for (key, entry, changed) in updates {
            entry.tracked.stamp_update(&self.auditor);
            writes.push(PendingWrite {
                key,
                kind: WriteKind::Update,
                statement: update_statement(key, entry.tracked.as_ref(), &changed),
            });
        }
        for (key, entry) in deletes {
            let schema = entry.tracked.schema();
            writes.push(PendingWrite {
                key,
                kind: WriteKind::Delete,
                statement: Statement::new(
                    format!("DELETE FROM {} WHERE {} = ?", schema.table, schema.id.column),
                    vec![Value::Integer(key.id)],
                ),
            });
        }
        Ok(writes)
    }

    fn apply(&self, writes: &[PendingWrite]) -> RepoResult<()> {
        for write in writes {
            let changed = self.driver.execute(&write.statement)?;
            if write.kind == WriteKind::Update && changed == 0 {
                let name = self
                    .entries
                    .get(&write.key)
                    .map_or(write.key.table, |entry| entry.tracked.schema().name);
                return Err(RepoError::not_found(name, Some(write.key.id)));
            }
        }
        Ok(())
    }

    fn settle(&mut self, writes: &[PendingWrite]) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for write in writes {
            match write.kind {
                WriteKind::Insert | WriteKind::Update => {
                    if let Some(entry) = self.entries.get_mut(&write.key) {
                        entry.snapshot = Some(entry.tracked.values());
                        entry.state = EntryState::Managed;
                    }
                    if write.kind == WriteKind::Insert {
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                WriteKind::Delete => {
                    self.entries.remove(&write.key);
                    summary.deleted += 1;
                }
            }
        }
        summary
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!(
                "event=session_close module=session status=rollback session_id={} reason=open_transaction",
                self.id
            );
            if let Err(err) = self.driver.rollback() {
                error!(
                    "event=session_close module=session status=error session_id={} error={}",
                    self.id, err
                );
            }
        }
    }
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("tracked", &self.entries.len())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

fn insert_statement(key: EntityKey, tracked: &dyn Tracked) -> Statement {
    let schema = tracked.schema();
    let columns: Vec<&str> = schema.all_columns();
    let mut params = Vec::with_capacity(columns.len());
    params.push(Value::Integer(key.id));
    params.extend(tracked.values());
    params.extend(tracked.audit().values());
    Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        ),
        params,
    )
}

/// Writes the changed value columns plus the `last_modified_*` pair.
fn update_statement(key: EntityKey, tracked: &dyn Tracked, changed: &[usize]) -> Statement {
    let schema = tracked.schema();
    let value_columns: Vec<&str> = schema.value_columns().collect();
    let values = tracked.values();
    let [_, _, modified_by, modified_at] = tracked.audit().values();

    let mut assignments = Vec::with_capacity(changed.len() + 2);
    let mut params = Vec::with_capacity(changed.len() + 3);
    for &index in changed {
        assignments.push(format!("{} = ?", value_columns[index]));
        params.push(values[index].clone());
    }
    assignments.push(format!("{} = ?", AUDIT_COLUMNS[2]));
    assignments.push(format!("{} = ?", AUDIT_COLUMNS[3]));
    params.push(modified_by);
    params.push(modified_at);
    params.push(Value::Integer(key.id));

    Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            schema.table,
            assignments.join(", "),
            schema.id.column
        ),
        params,
    )
}

/// Access to the current result row while an entity attaches a fetched
/// relation.
pub struct FetchContext<'a, 'd> {
    session: &'a mut Session<'d>,
    row: &'a Row,
    read_only: bool,
}

impl FetchContext<'_, '_> {
    /// Materializes the `relation`-scoped columns as a tracked `T`, or `None`
    /// for an unmatched left join.
    pub fn materialize<T: Entity>(&mut self, relation: &str) -> RepoResult<Option<Managed<T>>> {
        let view = self.row.scope(relation);
        if view.is_absent(T::schema().id.column) {
            return Ok(None);
        }
        self.session
            .attach_row::<T>(view, self.read_only)
            .map(Some)
    }
}
