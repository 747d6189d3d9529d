//! Pagination engine: `Page` (content + total) and `Slice` (content +
//! has-next) over a select plan.
//!
//! # Invariants
//! - `content.len() == min(size, remaining)`.
//! - `Slice` never issues a count query; it reads one extra row instead.
//! - `Page` skips the count query when the content alone determines the
//!   total (a short first page, or a short non-empty later page).

use crate::model::entity::{Entity, Managed};
use crate::query::exec;
use crate::query::plan::{QueryPlan, Window};
use crate::query::Sort;
use crate::repo::error::{RepoError, RepoResult};
use crate::session::Session;
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Zero-based page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pageable {
    pub page: usize,
    pub size: usize,
    #[serde(default)]
    pub sort: Sort,
}

impl Pageable {
    pub fn of(page: usize, size: usize) -> Self {
        Self {
            page,
            size,
            sort: Sort::unsorted(),
        }
    }

    pub fn sorted(page: usize, size: usize, sort: Sort) -> Self {
        Self { page, size, sort }
    }

    pub fn offset(&self) -> RepoResult<usize> {
        self.page
            .checked_mul(self.size)
            .ok_or_else(|| RepoError::malformed("page offset overflows"))
    }

    fn validate(&self) -> RepoResult<()> {
        if self.size == 0 {
            return Err(RepoError::malformed("page size must be at least 1"));
        }
        self.offset().map(|_| ())
    }
}

/// One page of results plus the total across all pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    number: usize,
    size: usize,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, number: usize, size: usize, total_elements: u64) -> Self {
        Self {
            content,
            number,
            size,
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size as u64)
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    pub fn has_next(&self) -> bool {
        ((self.number as u64) + 1).saturating_mul(self.size as u64) < self.total_elements
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Converts the content, keeping the paging metadata.
    pub fn map<U>(self, convert: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(convert).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

/// One page of results that only knows whether another page follows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice<T> {
    content: Vec<T>,
    number: usize,
    size: usize,
    has_next: bool,
}

impl<T> Slice<T> {
    pub fn new(content: Vec<T>, number: usize, size: usize, has_next: bool) -> Self {
        Self {
            content,
            number,
            size,
            has_next,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn is_first(&self) -> bool {
        self.number == 0
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    pub fn map<U>(self, convert: impl FnMut(T) -> U) -> Slice<U> {
        Slice {
            content: self.content.into_iter().map(convert).collect(),
            number: self.number,
            size: self.size,
            has_next: self.has_next,
        }
    }
}

fn prepare(plan: &QueryPlan, pageable: &Pageable) -> RepoResult<usize> {
    pageable.validate()?;
    if plan.limit().is_some() {
        return Err(RepoError::malformed(format!(
            "`{}` limits its results and cannot be paged",
            plan.source()
        )));
    }
    pageable.offset()
}

/// Content query plus, when needed, the decoupled count query.
pub(crate) fn page<E: Entity>(
    session: &mut Session<'_>,
    plan: &QueryPlan,
    pageable: &Pageable,
) -> RepoResult<Page<Managed<E>>> {
    let started_at = Instant::now();
    let offset = prepare(plan, pageable)?;
    let order = plan.order_terms(pageable.sort.orders())?;
    exec::ensure_entity_select::<E>(plan)?;

    let content = exec::list_window::<E>(
        session,
        plan,
        &order,
        Some(Window {
            offset,
            limit: pageable.size,
        }),
    )?;
    let count_skipped = (offset == 0 || !content.is_empty()) && content.len() < pageable.size;
    let total = if count_skipped {
        (offset + content.len()) as u64
    } else {
        exec::count(session, plan)?
    };

    info!(
        "event=page_query module=query status=ok entity={} mode=page page={} size={} rows={} total={} count_skipped={} duration_ms={}",
        plan.root().name,
        pageable.page,
        pageable.size,
        content.len(),
        total,
        count_skipped,
        started_at.elapsed().as_millis()
    );
    Ok(Page::new(content, pageable.page, pageable.size, total))
}

/// Content query reading `size + 1` rows; never counts.
pub(crate) fn slice<E: Entity>(
    session: &mut Session<'_>,
    plan: &QueryPlan,
    pageable: &Pageable,
) -> RepoResult<Slice<Managed<E>>> {
    let started_at = Instant::now();
    let offset = prepare(plan, pageable)?;
    let order = plan.order_terms(pageable.sort.orders())?;
    exec::ensure_entity_select::<E>(plan)?;

    let mut content = exec::list_window::<E>(
        session,
        plan,
        &order,
        Some(Window {
            offset,
            limit: pageable.size.saturating_add(1),
        }),
    )?;
    let has_next = content.len() > pageable.size;
    content.truncate(pageable.size);

    info!(
        "event=page_query module=query status=ok entity={} mode=slice page={} size={} rows={} has_next={} duration_ms={}",
        plan.root().name,
        pageable.page,
        pageable.size,
        content.len(),
        has_next,
        started_at.elapsed().as_millis()
    );
    Ok(Slice::new(content, pageable.page, pageable.size, has_next))
}
