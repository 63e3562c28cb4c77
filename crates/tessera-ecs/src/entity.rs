//! Entity identifiers and the sparse-set entity index.
//!
//! An [`EntityId`] is an opaque 32-bit handle. It stays fixed for the whole
//! life of the entity and is handed out again after the entity is destroyed.
//!
//! [`EntityIndex`] keeps two parallel tables:
//!
//! - `dense`: every identity ever issued, live ones packed at the front
//!   (`dense[..live]`), recycled ones after them (`dense[live..]`).
//! - `sparse`: identity value -> position in `dense`.
//!
//! For every live `e`, `dense[sparse[e]] == e`.

use std::fmt;

use crate::seq::Seq;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque, reusable entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Construct an `EntityId` from its raw value.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw `u32` representation.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SlotSwap
// ---------------------------------------------------------------------------

/// Two dense slots exchanged by [`EntityIndex::destroy`].
///
/// Tables indexed by dense slot must apply the same swap to stay aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSwap {
    /// Slot the destroyed entity occupied; now holds the previously last live entity.
    pub freed: usize,
    /// Former last live slot; now holds the destroyed identity.
    pub last: usize,
}

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

/// Sparse-set allocator of [`EntityId`]s with O(1) create, destroy and lookup.
#[derive(Debug, Default)]
pub struct EntityIndex {
    dense: Seq<EntityId>,
    /// Indexed by `EntityId.0`; value is the dense slot.
    sparse: Seq<u32>,
    /// Number of live entities; `dense[..live]` is the live range.
    live: usize,
}

impl EntityIndex {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index with room for `capacity` identities before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            dense: Seq::with_capacity(capacity),
            sparse: Seq::with_capacity(capacity),
            live: 0,
        }
    }

    /// Issue an identity.
    ///
    /// A recycled identity sitting just past the live range is reused first;
    /// otherwise the next sequential value is issued.
    pub fn create(&mut self) -> EntityId {
        let id = if self.live == self.dense.len() {
            let id = EntityId(next_identity(self.dense.len()));
            self.dense.push(id);
            self.sparse.push(self.live as u32);
            id
        } else {
            let id = self.dense[self.live];
            self.sparse[id.index()] = self.live as u32;
            id
        };
        self.live += 1;
        id
    }

    /// Retire a live identity so it can be reused by a later [`create`](Self::create).
    ///
    /// Returns the dense slots that were exchanged, or `None` when the entity
    /// already occupied the last live slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live (double destroy or never issued).
    pub fn destroy(&mut self, id: EntityId) -> Option<SlotSwap> {
        assert!(self.is_live(id), "destroy of dead entity {id:?}");

        let freed = self.sparse[id.index()] as usize;
        let last = self.live - 1;
        let swap = if freed < last {
            let moved = self.dense[last];
            self.dense.swap(freed, last);
            self.sparse[moved.index()] = freed as u32;
            self.sparse[id.index()] = last as u32;
            Some(SlotSwap { freed, last })
        } else {
            None
        };
        self.live -= 1;
        swap
    }

    /// Whether `id` refers to a live entity. Never-issued ids are not live.
    #[inline]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.sparse
            .get(id.index())
            .is_some_and(|&slot| (slot as usize) < self.live)
    }

    /// Dense slot of a live entity.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not live.
    #[inline]
    pub fn slot(&self, id: EntityId) -> usize {
        assert!(self.is_live(id), "entity {id:?} is not live");
        self.sparse[id.index()] as usize
    }

    /// The live identities, in dense-slot order.
    ///
    /// The order changes on every `create`/`destroy`.
    #[inline]
    pub fn live(&self) -> &[EntityId] {
        &self.dense.as_slice()[..self.live]
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of distinct identities ever issued (live plus recyclable).
    #[inline]
    pub fn issued(&self) -> usize {
        self.dense.len()
    }
}

/// The raw value of the identity issued after `issued` others.
fn next_identity(issued: usize) -> u32 {
    u32::try_from(issued)
        .unwrap_or_else(|_| panic!("entity identity space exhausted: {issued} identities issued"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
