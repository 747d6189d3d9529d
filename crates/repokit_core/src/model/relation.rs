//! Owning references and inverse navigation collections.
//!
//! # Invariants
//! - Only the owning `Reference` contributes a persisted foreign key.
//! - `InverseCollection` holds weak handles and is never written to the store;
//!   it is kept consistent by `set_owning_relation`.

use crate::model::entity::{Entity, EntityId, Managed};
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

/// Owning side of a to-one association.
///
/// Starts unresolved (id only) when loaded lazily, or resolved when the
/// target was fetched in the same round trip or assigned in memory.
pub struct Reference<T: Entity> {
    id: Option<EntityId>,
    target: Option<Managed<T>>,
}

impl<T: Entity> Reference<T> {
    /// Lazy reference to a stored row; resolve it through the session.
    pub fn to_id(id: EntityId) -> Self {
        Self {
            id: Some(id),
            target: None,
        }
    }

    pub fn to(target: &Managed<T>) -> Self {
        Self {
            id: None,
            target: Some(Rc::clone(target)),
        }
    }

    /// Foreign key value. A resolved target wins over the loaded id, so a
    /// target that received its id after assignment is still picked up.
    pub fn id(&self) -> Option<EntityId> {
        match &self.target {
            Some(target) => target.borrow().id(),
            None => self.id,
        }
    }

    pub fn target(&self) -> Option<Managed<T>> {
        self.target.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    /// Whether this points at an in-memory instance that has no id yet.
    pub fn is_transient(&self) -> bool {
        self.target.is_some() && self.id().is_none()
    }

    pub(crate) fn resolve(&mut self, target: Managed<T>) {
        self.id = target.borrow().id();
        self.target = Some(target);
    }
}

impl<T: Entity> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: self.target.clone(),
        }
    }
}

impl<T: Entity> Debug for Reference<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reference")
            .field("entity", &T::schema().name)
            .field("id", &self.id())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Inverse side of an association: a navigation cache of owners.
pub struct InverseCollection<O: Entity> {
    items: Vec<Weak<RefCell<O>>>,
}

impl<O: Entity> InverseCollection<O> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Live owners, in insertion order.
    pub fn items(&self) -> Vec<Managed<O>> {
        self.items.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|item| item.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, owner: &Managed<O>) -> bool {
        self.items
            .iter()
            .any(|item| std::ptr::eq(item.as_ptr(), Rc::as_ptr(owner)))
    }

    fn add(&mut self, owner: &Managed<O>) {
        if !self.contains(owner) {
            self.items.push(Rc::downgrade(owner));
        }
    }

    fn remove(&mut self, owner: &Managed<O>) {
        let owner = Rc::as_ptr(owner);
        self.items
            .retain(|item| item.strong_count() > 0 && !std::ptr::eq(item.as_ptr(), owner));
    }
}

impl<O: Entity> Default for InverseCollection<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Entity> Clone for InverseCollection<O> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<O: Entity> Debug for InverseCollection<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InverseCollection")
            .field("entity", &O::schema().name)
            .field("len", &self.len())
            .finish()
    }
}

/// Points `owner` at `target` and keeps both inverse collections in step.
///
/// This is the only mutation that changes the stored foreign key; passing
/// `None` clears the association.
pub fn set_owning_relation<O: Entity, T: Entity>(
    owner: &Managed<O>,
    target: Option<&Managed<T>>,
    owning: fn(&mut O) -> &mut Option<Reference<T>>,
    inverse: fn(&mut T) -> &mut InverseCollection<O>,
) {
    let previous = {
        let mut owner_state = owner.borrow_mut();
        let slot = owning(&mut owner_state);
        let previous = slot.take().and_then(|reference| reference.target());
        *slot = target.map(Reference::to);
        previous
    };
    sync_inverse_collection(owner, previous.as_ref(), target, inverse);
}

/// Moves `owner` from the previous target's collection to the new one.
pub(crate) fn sync_inverse_collection<O: Entity, T: Entity>(
    owner: &Managed<O>,
    previous: Option<&Managed<T>>,
    target: Option<&Managed<T>>,
    inverse: fn(&mut T) -> &mut InverseCollection<O>,
) {
    if let Some(previous) = previous {
        let unchanged = target.is_some_and(|target| Rc::ptr_eq(previous, target));
        if !unchanged {
            inverse(&mut previous.borrow_mut()).remove(owner);
        }
    }
    if let Some(target) = target {
        inverse(&mut target.borrow_mut()).add(owner);
    }
}
