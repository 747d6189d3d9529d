//! Generic repository facade over one entity type.
//!
//! # Responsibility
//! - Expose CRUD, query, paging and bulk operations for `E`.
//! - Compose the session, the query resolver, the pagination engine and the
//!   bulk executor; the facade itself holds no state.
//!
//! # Invariants
//! - Every call works inside the caller's session; identity is per session.
//! - `bulk_update` clears the session when the contract asks for it.

use crate::model::entity::{Entity, EntityId, Managed};
use crate::query::{self, exec, page, Args, Page, Pageable, QueryMethod, QueryPlan, Slice, Sort};
use crate::repo::bulk;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::{FlushSummary, Session};
use crate::store::Row;
use std::marker::PhantomData;

pub struct Repository<E: Entity> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }

    /// Compiles a method contract for `E` without running it.
    pub fn resolve(&self, method: &QueryMethod, args: &Args) -> RepoResult<QueryPlan> {
        query::resolve(E::schema(), method, args)
    }

    /// Inserts entities without an id; merges the rest onto their managed
    /// instance.
    pub fn save(&self, session: &mut Session<'_>, entity: E) -> RepoResult<Managed<E>> {
        if entity.id().is_none() {
            session.insert(entity)
        } else {
            session.merge(entity)
        }
    }

    pub fn save_and_flush(&self, session: &mut Session<'_>, entity: E) -> RepoResult<Managed<E>> {
        let saved = self.save(session, entity)?;
        session.flush()?;
        Ok(saved)
    }

    pub fn find_by_id(
        &self,
        session: &mut Session<'_>,
        id: EntityId,
    ) -> RepoResult<Option<Managed<E>>> {
        session.load::<E>(id)
    }

    /// Like `find_by_id`, but a missing id is `NotFound`.
    pub fn get_by_id(&self, session: &mut Session<'_>, id: EntityId) -> RepoResult<Managed<E>> {
        session
            .load::<E>(id)?
            .ok_or_else(|| RepoError::not_found(E::schema().name, Some(id)))
    }

    pub fn exists_by_id(&self, session: &mut Session<'_>, id: EntityId) -> RepoResult<bool> {
        Ok(session.load::<E>(id)?.is_some())
    }

    pub fn find_all(&self, session: &mut Session<'_>) -> RepoResult<Vec<Managed<E>>> {
        exec::list(session, &QueryPlan::select_all(E::schema()))
    }

    pub fn find_all_sorted(
        &self,
        session: &mut Session<'_>,
        sort: &Sort,
    ) -> RepoResult<Vec<Managed<E>>> {
        let plan = QueryPlan::select_all(E::schema());
        let order = plan.order_terms(sort.orders())?;
        exec::list_window(session, &plan, &order, None)
    }

    pub fn find_all_paged(
        &self,
        session: &mut Session<'_>,
        pageable: &Pageable,
    ) -> RepoResult<Page<Managed<E>>> {
        page::page(session, &QueryPlan::select_all(E::schema()), pageable)
    }

    pub fn delete(&self, session: &mut Session<'_>, entity: &Managed<E>) -> RepoResult<()> {
        session.remove(entity)
    }

    /// Returns whether an entity with `id` existed.
    pub fn delete_by_id(&self, session: &mut Session<'_>, id: EntityId) -> RepoResult<bool> {
        match session.load::<E>(id)? {
            Some(entity) => {
                session.remove(&entity)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn count(&self, session: &mut Session<'_>) -> RepoResult<u64> {
        exec::count(session, &QueryPlan::select_all(E::schema()))
    }

    pub fn flush(&self, session: &mut Session<'_>) -> RepoResult<FlushSummary> {
        session.flush()
    }

    pub fn find_list(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<Vec<Managed<E>>> {
        let plan = self.resolve(method, args)?;
        exec::list(session, &plan)
    }

    /// At most one result; more than one is `NotUnique`.
    pub fn find_one(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<Option<Managed<E>>> {
        let plan = self.resolve(method, args)?;
        exec::single(session, &plan)
    }

    /// Exactly one result; none is `NotFound`, more than one `NotUnique`.
    pub fn find_required(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<Managed<E>> {
        self.find_one(session, method, args)?
            .ok_or_else(|| RepoError::not_found(E::schema().name, None))
    }

    /// Scalar projections (`select m.username from Member m`).
    pub fn find_projected(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<Vec<Row>> {
        let plan = self.resolve(method, args)?;
        exec::rows(session, &plan)
    }

    pub fn count_by(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<u64> {
        let plan = self.resolve(method, args)?;
        exec::count(session, &plan)
    }

    pub fn exists_by(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<bool> {
        Ok(self.count_by(session, method, args)? > 0)
    }

    /// Loads every match and removes it through the session, so deletes are
    /// written at flush like any other removal.
    pub fn delete_by(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<usize> {
        let matches = self.find_list(session, method, args)?;
        for entity in &matches {
            session.remove(entity)?;
        }
        Ok(matches.len())
    }

    pub fn find_page(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
        pageable: &Pageable,
    ) -> RepoResult<Page<Managed<E>>> {
        let plan = self.resolve(method, args)?;
        page::page(session, &plan, pageable)
    }

    pub fn find_slice(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
        pageable: &Pageable,
    ) -> RepoResult<Slice<Managed<E>>> {
        let plan = self.resolve(method, args)?;
        page::slice(session, &plan, pageable)
    }

    /// Runs a modifying contract; clears the session afterwards when the
    /// contract says `clear_automatically`.
    pub fn bulk_update(
        &self,
        session: &mut Session<'_>,
        method: &QueryMethod,
        args: &Args,
    ) -> RepoResult<usize> {
        let plan = self.resolve(method, args)?;
        let affected = bulk::execute(session, &plan)?;
        if plan
            .hints()
            .modifying
            .is_some_and(|modifying| modifying.clear_automatically)
        {
            session.clear();
        }
        Ok(affected)
    }
}

impl<E: Entity> Default for Repository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: Entity> Copy for Repository<E> {}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::schema().name)
            .finish()
    }
}
