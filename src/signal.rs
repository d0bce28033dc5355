//! Per-owner registry of native event subscriptions.
//!
//! Every subscription is identified by (owner, target object, signal name);
//! at most one live subscription exists per identity, and setting a new
//! handler atomically replaces the old one. Owners release everything at once
//! through [`SignalStore::clear`] when the owning node is destroyed.

use crate::props::{Key, SignalHandler};
use crate::toolkit::{HandlerId, ObjectId, Toolkit};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{trace, warn};

/// Explicit owner token; allocated per node (or renderer) so subscription
/// lifetimes are auditable without weak references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

/// Signals that participate in object lifecycle or structural factory
/// callbacks; these are never suppressed by the block counter.
const LIFECYCLE_SIGNALS: &[&str] = &[
    "realize",
    "unrealize",
    "map",
    "unmap",
    "show",
    "hide",
    "destroy",
    "resize",
    "render",
    "setup",
    "bind",
    "unbind",
    "teardown",
];

fn is_lifecycle(signal: &str) -> bool {
    LIFECYCLE_SIGNALS.contains(&signal)
}

struct Entry {
    /// The driver's handler, kept for pointer-identity no-op checks.
    handler: SignalHandler,
    token: HandlerId,
}

type OwnerMap = HashMap<(ObjectId, Key), Entry>;

pub struct SignalStore {
    toolkit: Rc<dyn Toolkit>,
    owners: RefCell<HashMap<OwnerId, OwnerMap>>,
    next_owner: Cell<u64>,
    block_depth: Rc<Cell<u32>>,
}

impl SignalStore {
    pub fn new(toolkit: Rc<dyn Toolkit>) -> Self {
        Self {
            toolkit,
            owners: RefCell::new(HashMap::new()),
            next_owner: Cell::new(1),
            block_depth: Rc::new(Cell::new(0)),
        }
    }

    /// Allocate a fresh owner token.
    pub fn owner(&self) -> OwnerId {
        let id = self.next_owner.get();
        self.next_owner.set(id + 1);
        OwnerId(id)
    }

    /// Register `handler` for (owner, target, signal), first releasing any
    /// existing subscription for that exact identity. `None` releases without
    /// replacing. Setting the identical handler reference again is a no-op.
    pub fn set(
        &self,
        owner: OwnerId,
        target: ObjectId,
        signal: &str,
        handler: Option<SignalHandler>,
    ) -> crate::Result<()> {
        self.set_blockable(owner, target, signal, handler, true)
    }

    /// Like [`set`](Self::set), but lets the caller opt the subscription out
    /// of delivery suppression.
    pub fn set_blockable(
        &self,
        owner: OwnerId,
        target: ObjectId,
        signal: &str,
        handler: Option<SignalHandler>,
        blockable: bool,
    ) -> crate::Result<()> {
        let key = (target, Key::from(signal));

        if let Some(new) = &handler {
            let owners = self.owners.borrow();
            if let Some(existing) = owners.get(&owner).and_then(|map| map.get(&key)) {
                if Rc::ptr_eq(&existing.handler, new) {
                    return Ok(());
                }
            }
        }

        // Release the replaced identity before connecting the new handler.
        if let Some(existing) = self
            .owners
            .borrow_mut()
            .get_mut(&owner)
            .and_then(|map| map.remove(&key))
        {
            self.toolkit.disconnect(target, existing.token)?;
        }

        let Some(handler) = handler else {
            return Ok(());
        };

        let token = self.toolkit.connect(
            target,
            signal,
            self.wrap(signal, handler.clone(), blockable),
        )?;
        trace!(?target, signal, "signal connected");

        self.owners
            .borrow_mut()
            .entry(owner)
            .or_default()
            .insert(key, Entry { handler, token });
        Ok(())
    }

    /// Release every subscription registered by `owner`. Idempotent; safe on
    /// an owner that never subscribed.
    pub fn clear(&self, owner: OwnerId) {
        let Some(map) = self.owners.borrow_mut().remove(&owner) else {
            return;
        };

        for ((target, signal), entry) in map {
            if let Err(error) = self.toolkit.disconnect(target, entry.token) {
                warn!(?target, %signal, %error, "failed to disconnect signal");
            }
        }
    }

    /// Suppress delivery (not registration) of blockable, non-lifecycle
    /// handlers. Reentrant; each `block_all` needs a matching `unblock_all`.
    pub fn block_all(&self) {
        self.block_depth.set(self.block_depth.get() + 1);
    }

    pub fn unblock_all(&self) {
        let depth = self.block_depth.get();
        if depth > 0 {
            self.block_depth.set(depth - 1);
        }
    }

    pub fn force_unblock_all(&self) {
        self.block_depth.set(0);
    }

    /// RAII form of `block_all`/`unblock_all`.
    pub fn blocked(&self) -> BlockGuard<'_> {
        self.block_all();
        BlockGuard { store: self }
    }

    /// Number of live subscriptions held by `owner` (diagnostics and tests).
    pub fn subscription_count(&self, owner: OwnerId) -> usize {
        self.owners
            .borrow()
            .get(&owner)
            .map(|map| map.len())
            .unwrap_or(0)
    }

    fn wrap(&self, signal: &str, handler: SignalHandler, blockable: bool) -> SignalHandler {
        let depth = Rc::clone(&self.block_depth);
        let lifecycle = is_lifecycle(signal);
        Rc::new(move |args| {
            if blockable && !lifecycle && depth.get() > 0 {
                return;
            }
            handler(args);
        })
    }
}

pub struct BlockGuard<'a> {
    store: &'a SignalStore,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.store.unblock_all();
    }
}
