//! Handle registry - engine-owned resources behind opaque tokens.
//!
//! Every resource handed across the boundary is an entry in this arena,
//! addressed by a generation-checked token instead of a raw address. A
//! stale or double-freed handle fails the generation check and is
//! rejected; it can never dereference freed memory.
//!
//! Tokens pack the slot index into the low 32 bits and the slot
//! generation into the high 32 bits. Generations start at 1 and bump on
//! every removal, so 0 never names a live resource and stays reserved as
//! the boundary failure sentinel.

use crate::connection::Connection;
use crate::replica::Replica;
use crate::transaction::Transaction;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex, MutexGuard};

/// Opaque boundary token; 0 is the failure sentinel, never a resource.
pub type RawHandle = u64;

/// A resource owned by the registry.
#[derive(Debug)]
pub enum Resource {
    Connection(Connection),
    Replica(Replica),
    Transaction(Transaction),
}

impl Resource {
    /// The query side of the resource, if it has one. Replica pairs
    /// multiplex queries through their paired connection.
    pub fn connection(&self) -> Option<&Connection> {
        match self {
            Resource::Connection(conn) => Some(conn),
            Resource::Replica(replica) => Some(replica.connection()),
            Resource::Transaction(_) => None,
        }
    }

    /// The replica pair, for sync calls.
    pub fn replica(&self) -> Option<&Replica> {
        match self {
            Resource::Replica(replica) => Some(replica),
            _ => None,
        }
    }

    /// The transaction, for transaction-scoped calls.
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Resource::Transaction(trx) => Some(trx),
            _ => None,
        }
    }
}

struct Slot {
    generation: u32,
    entry: Option<Arc<Resource>>,
}

/// Arena of slots with a free list; see the module docs for the token
/// scheme.
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Registry {
    fn insert(&mut self, resource: Resource) -> RawHandle {
        let entry = Some(Arc::new(resource));
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.entry = entry;
                encode(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    entry,
                });
                encode(self.slots.len() - 1, 1)
            }
        }
    }

    fn get(&self, handle: RawHandle) -> Option<Arc<Resource>> {
        let (index, generation) = decode(handle);
        let slot = self.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.entry.clone()
    }

    fn remove(&mut self, handle: RawHandle) -> Option<Arc<Resource>> {
        let (index, generation) = decode(handle);
        let slot = self.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let entry = slot.entry.take()?;
        // retire the token; 0 stays reserved for the failure sentinel
        slot.generation = slot.generation.checked_add(1).unwrap_or(1);
        self.free.push(index);
        Some(entry)
    }
}

fn encode(index: usize, generation: u32) -> RawHandle {
    ((generation as u64) << 32) | index as u64
}

fn decode(handle: RawHandle) -> (usize, u32) {
    ((handle & 0xFFFF_FFFF) as usize, (handle >> 32) as u32)
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

fn registry() -> MutexGuard<'static, Registry> {
    match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Register a resource and return its boundary token.
pub fn insert(resource: Resource) -> RawHandle {
    registry().insert(resource)
}

/// Resolve a token to its resource. Stale, foreign and zero tokens
/// resolve to `None`.
///
/// The returned `Arc` is cloned out of the registry, so the registry
/// lock is never held across a kernel call and in-flight operations
/// keep the resource alive across a concurrent close.
pub fn get(handle: RawHandle) -> Option<Arc<Resource>> {
    registry().get(handle)
}

/// Unregister a resource. Returns it so the caller drops it outside the
/// registry lock; a second removal of the same token is a `None` no-op.
pub fn remove(handle: RawHandle) -> Option<Arc<Resource>> {
    registry().remove(handle)
}
