//! Archetype storage for the ECS.
//!
//! An [`Archetype`] stores all entities that share the exact same set of
//! component types (its *signature*). Within each archetype, components are
//! laid out as a Structure-of-Arrays: one type-erased [`Column`] per component
//! type, plus column 0 which holds the owning [`EntityId`] of every row. All
//! columns share one row count and one capacity.
//!
//! # Safety
//!
//! This module contains `unsafe` code in [`Column`] because component data is
//! stored as type-erased byte buffers. Columns do not know their own length
//! or capacity; [`Archetype`] owns those and guarantees every column access
//! stays inside the allocation. Component types are [`bytemuck::Pod`], so any
//! byte pattern written into a cell is a valid value and rows can be moved
//! with plain byte copies.
// Note: unsafe_code is allowed on this module via #[allow(unsafe_code)] in lib.rs

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::ptr::{self, NonNull};

use tracing::trace;

use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
use crate::entity::EntityId;
use crate::seq::Seq;

/// Capacity an archetype grows to on its first row unless configured otherwise.
pub const DEFAULT_MIN_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within the world. Indices into the world's
/// archetype table, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// The archetype with the empty signature. Every entity starts here.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Column -- type-erased cell storage
// ---------------------------------------------------------------------------

/// A type-erased, densely packed array of values of a single type.
///
/// Length and capacity are tracked by the owning [`Archetype`].
struct Column {
    /// Heap allocation, or an aligned dangling pointer when nothing is allocated.
    data: NonNull<u8>,
    item_size: usize,
    item_align: usize,
    /// Rust type stored in the column, checked by typed access.
    type_id: TypeId,
}

// SAFETY: a column owns its allocation exclusively and only stores `Pod`
// bytes of `Component` types, which are `Send + Sync`.
unsafe impl Send for Column {}
// SAFETY: shared access only reads; writes go through `&mut Column`.
unsafe impl Sync for Column {}

impl Column {
    fn new(item_size: usize, item_align: usize, type_id: TypeId) -> Self {
        Self {
            data: dangling(item_align),
            item_size,
            item_align,
            type_id,
        }
    }

    fn for_component(info: &ComponentInfo) -> Self {
        Self::new(info.size, info.align, info.type_id)
    }

    fn for_entities() -> Self {
        Self::new(
            std::mem::size_of::<EntityId>(),
            std::mem::align_of::<EntityId>(),
            TypeId::of::<EntityId>(),
        )
    }

    fn array_layout(&self, capacity: usize) -> Layout {
        self.item_size
            .checked_mul(capacity)
            .and_then(|bytes| Layout::from_size_align(bytes, self.item_align).ok())
            .unwrap_or_else(|| panic!("capacity overflow: {capacity} rows"))
    }

    /// Move the column into an allocation of `new_cap` rows.
    ///
    /// # Safety
    ///
    /// `old_cap` must be the capacity the column currently has allocated and
    /// `new_cap` must be greater than it.
    unsafe fn reallocate(&mut self, old_cap: usize, new_cap: usize) {
        debug_assert!(new_cap > old_cap);
        if self.item_size == 0 {
            return;
        }
        let new_layout = self.array_layout(new_cap);
        let new_data = if old_cap == 0 {
            alloc::alloc(new_layout)
        } else {
            alloc::realloc(self.data.as_ptr(), self.array_layout(old_cap), new_layout.size())
        };
        self.data = NonNull::new(new_data).unwrap_or_else(|| alloc::handle_alloc_error(new_layout));
    }

    /// Release the allocation.
    ///
    /// # Safety
    ///
    /// `capacity` must be the capacity the column currently has allocated.
    unsafe fn deallocate(&mut self, capacity: usize) {
        if self.item_size > 0 && capacity > 0 {
            alloc::dealloc(self.data.as_ptr(), self.array_layout(capacity));
        }
        self.data = dangling(self.item_align);
    }

    /// Base pointer of the column; row `r` starts at `base + r * item_size`.
    #[inline]
    fn base(&self) -> *mut u8 {
        self.data.as_ptr()
    }

    /// # Safety
    ///
    /// `row` must be below the allocated capacity.
    #[inline]
    unsafe fn cell(&self, row: usize) -> *mut u8 {
        self.data.as_ptr().add(row * self.item_size)
    }

    /// # Safety
    ///
    /// `row` must be below the allocated capacity.
    #[inline]
    unsafe fn zero(&mut self, row: usize) {
        ptr::write_bytes(self.cell(row), 0, self.item_size);
    }

    /// # Safety
    ///
    /// `row` must be below the allocated capacity and `src` must be readable
    /// for `item_size` bytes without overlapping the cell.
    #[inline]
    unsafe fn write(&mut self, row: usize, src: *const u8) {
        ptr::copy_nonoverlapping(src, self.cell(row), self.item_size);
    }

    /// # Safety
    ///
    /// `src` and `dst` must be distinct rows below the allocated capacity.
    #[inline]
    unsafe fn copy_row(&mut self, src: usize, dst: usize) {
        ptr::copy_nonoverlapping(self.cell(src), self.cell(dst), self.item_size);
    }

    /// Bytes of the first `len` rows.
    ///
    /// # Safety
    ///
    /// The first `len` rows must be allocated and initialized.
    #[inline]
    unsafe fn bytes(&self, len: usize) -> &[u8] {
        std::slice::from_raw_parts(self.data.as_ptr(), len * self.item_size)
    }

    /// # Safety
    ///
    /// The first `len` rows must be allocated and initialized.
    #[inline]
    unsafe fn bytes_mut(&mut self, len: usize) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.data.as_ptr(), len * self.item_size)
    }

    #[inline]
    fn check_type<T: 'static>(&self) {
        assert!(
            self.type_id == TypeId::of::<T>(),
            "column does not store values of type `{}`",
            std::any::type_name::<T>()
        );
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("item_size", &self.item_size)
            .field("item_align", &self.item_align)
            .finish()
    }
}

#[inline]
fn dangling(align: usize) -> NonNull<u8> {
    // Alignments are non-zero powers of two, so this is a valid, aligned address.
    NonNull::new(align as *mut u8).unwrap_or(NonNull::dangling())
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// An archetype stores all entities that share the exact same set of
/// component types.
///
/// `columns[0]` holds entity ids; `columns[1 + i]` holds the component at
/// signature position `i`.
#[derive(Debug)]
pub struct Archetype {
    /// Unique identifier of this archetype.
    id: ArchetypeId,
    /// Strictly ascending component types stored here.
    signature: Seq<ComponentTypeId>,
    columns: Seq<Column>,
    len: usize,
    capacity: usize,
    min_capacity: usize,
}

impl Archetype {
    /// Create a new, empty archetype.
    ///
    /// # Panics
    ///
    /// Panics if `signature` is not strictly ascending, or names a type that
    /// `registry` did not issue.
    pub fn new(
        id: ArchetypeId,
        signature: Seq<ComponentTypeId>,
        registry: &ComponentRegistry,
        min_capacity: usize,
    ) -> Self {
        assert!(
            signature.as_slice().windows(2).all(|w| w[0] < w[1]),
            "archetype signature must be strictly ascending: {signature:?}"
        );
        let mut columns = Seq::with_capacity(signature.len() + 1);
        columns.push(Column::for_entities());
        for &type_id in signature.iter() {
            columns.push(Column::for_component(registry.details(type_id)));
        }

        Self {
            id,
            signature,
            columns,
            len: 0,
            capacity: 0,
            min_capacity: min_capacity.max(1),
        }
    }

    /// The archetype's unique ID.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The sorted set of component type IDs that define this archetype.
    #[inline]
    pub fn signature(&self) -> &[ComponentTypeId] {
        self.signature.as_slice()
    }

    /// Number of rows (entities) stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of rows that fit before the columns are reallocated.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Signature position of `type_id`, or `None` if this archetype lacks it.
    pub fn find_component(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.signature.iter().position(|&t| t == type_id)
    }

    #[inline]
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.find_component(type_id).is_some()
    }

    /// The entity IDs stored in this archetype, in row order.
    pub fn entities(&self) -> &[EntityId] {
        // SAFETY: rows below `len` are initialized; column 0 stores `EntityId`.
        bytemuck::cast_slice(unsafe { self.columns[0].bytes(self.len) })
    }

    /// The entity stored at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= len`.
    pub fn entity_at(&self, row: usize) -> EntityId {
        self.check_row(row);
        self.entities()[row]
    }

    /// Append a row for `entity` and return its index.
    ///
    /// Every component cell of the new row is zero-filled.
    pub fn add_entity(&mut self, entity: EntityId) -> usize {
        if self.len == self.capacity {
            self.grow();
        }
        let row = self.len;
        // SAFETY: `row < capacity` after `grow`; `entity` is a readable `EntityId`.
        unsafe {
            self.columns[0].write(row, bytemuck::bytes_of(&entity).as_ptr());
            for column in self.columns.as_mut_slice()[1..].iter_mut() {
                column.zero(row);
            }
        }
        self.len += 1;
        row
    }

    /// Remove `row` by moving the last row into it.
    ///
    /// Returns the entity that now lives at `row` when a move happened, so
    /// the caller can update that entity's location. Returns `None` when
    /// `row` was the last row.
    ///
    /// # Panics
    ///
    /// Panics if `row >= len`.
    pub fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        self.check_row(row);
        let last = self.len - 1;
        if row != last {
            for column in self.columns.iter_mut() {
                // SAFETY: both rows are below `len`, and distinct.
                unsafe { column.copy_row(last, row) };
            }
        }
        self.len -= 1;
        if row != last {
            let moved = self.entities()[row];
            trace!(archetype = self.id.0, row, ?moved, "swap-removed row");
            Some(moved)
        } else {
            None
        }
    }

    /// Overwrite the cell at (`row`, `type_id`) with raw `bytes`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= len`, if the archetype lacks `type_id`, or if
    /// `bytes` is not exactly one value long.
    pub fn set_component_raw(&mut self, row: usize, type_id: ComponentTypeId, bytes: &[u8]) {
        self.check_row(row);
        let column = self.column_index(type_id);
        let column = &mut self.columns[column];
        assert_eq!(
            bytes.len(),
            column.item_size,
            "value for {type_id:?} has the wrong size"
        );
        // SAFETY: `row < len`; `bytes` is a separate buffer of `item_size` bytes,
        // and every byte pattern is a valid `Pod` value.
        unsafe { column.write(row, bytes.as_ptr()) };
    }

    /// Overwrite the cell at (`row`, `type_id`) with `value`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`set_component_raw`](Self::set_component_raw),
    /// or if the column does not store `T`.
    pub fn set_component<T: Component>(&mut self, row: usize, type_id: ComponentTypeId, value: T) {
        self.columns[self.column_index(type_id)].check_type::<T>();
        self.set_component_raw(row, type_id, bytemuck::bytes_of(&value));
    }

    /// The raw bytes of the cell at (`row`, `type_id`), or `None` if the
    /// archetype lacks `type_id`.
    pub fn component_bytes(&self, row: usize, type_id: ComponentTypeId) -> Option<&[u8]> {
        self.check_row(row);
        let column = &self.columns[self.find_component(type_id)? + 1];
        // SAFETY: rows below `len` are initialized.
        let bytes = unsafe { column.bytes(self.len) };
        Some(&bytes[row * column.item_size..(row + 1) * column.item_size])
    }

    /// Typed reference to the cell at (`row`, `type_id`).
    ///
    /// # Panics
    ///
    /// Panics if `row >= len` or if the column does not store `T`.
    pub fn get<T: Component>(&self, row: usize, type_id: ComponentTypeId) -> Option<&T> {
        self.check_row(row);
        self.column::<T>(type_id).map(|values| &values[row])
    }

    /// Typed mutable reference to the cell at (`row`, `type_id`).
    pub fn get_mut<T: Component>(&mut self, row: usize, type_id: ComponentTypeId) -> Option<&mut T> {
        self.check_row(row);
        self.column_mut::<T>(type_id).map(|values| &mut values[row])
    }

    /// All values of `type_id` in row order.
    pub fn column<T: Component>(&self, type_id: ComponentTypeId) -> Option<&[T]> {
        let column = &self.columns[self.find_component(type_id)? + 1];
        column.check_type::<T>();
        if column.item_size == 0 {
            // SAFETY: zero-sized values need no storage; a dangling pointer is valid.
            return Some(unsafe { std::slice::from_raw_parts(NonNull::<T>::dangling().as_ptr(), self.len) });
        }
        // SAFETY: rows below `len` are initialized.
        Some(bytemuck::cast_slice(unsafe { column.bytes(self.len) }))
    }

    pub fn column_mut<T: Component>(&mut self, type_id: ComponentTypeId) -> Option<&mut [T]> {
        let len = self.len;
        let index = self.find_component(type_id)? + 1;
        let column = &mut self.columns[index];
        column.check_type::<T>();
        if column.item_size == 0 {
            // SAFETY: zero-sized values need no storage; a dangling pointer is valid.
            return Some(unsafe { std::slice::from_raw_parts_mut(NonNull::<T>::dangling().as_ptr(), len) });
        }
        // SAFETY: rows below `len` are initialized.
        Some(bytemuck::cast_slice_mut(unsafe { column.bytes_mut(len) }))
    }

    /// Copy every cell of `row` whose type `dest` also stores into `dest_row`.
    ///
    /// Types present here but absent from `dest` are skipped, which is what
    /// a component removal needs; for an addition `dest` is a superset.
    ///
    /// # Panics
    ///
    /// Panics if either row is out of range.
    pub fn copy_row_into(&self, row: usize, dest: &mut Archetype, dest_row: usize) {
        self.check_row(row);
        dest.check_row(dest_row);
        for (pos, &type_id) in self.signature.iter().enumerate() {
            let Some(dest_pos) = dest.find_component(type_id) else {
                continue;
            };
            let src = &self.columns[pos + 1];
            // SAFETY: `row < self.len`; the cell is read into a different
            // archetype's allocation, so the ranges cannot overlap.
            unsafe {
                let src_ptr = src.cell(row);
                dest.columns[dest_pos + 1].write(dest_row, src_ptr);
            }
        }
    }

    /// Match this archetype against a query.
    ///
    /// `canonical` is the requested type set sorted ascending and
    /// `permutation[i]` is the caller's position for `canonical[i]`. When the
    /// signature is a superset of `canonical`, the base pointer of each
    /// matched column is written to `out[permutation[i]]` and the row count is
    /// returned. Otherwise `out` is left in an unspecified state and 0 is
    /// returned; an empty but matching archetype also returns 0.
    pub fn try_match(
        &self,
        canonical: &[ComponentTypeId],
        permutation: &[usize],
        out: &mut [*mut u8],
    ) -> usize {
        debug_assert_eq!(canonical.len(), permutation.len());
        debug_assert_eq!(canonical.len(), out.len());

        let signature = self.signature.as_slice();
        let mut pos = 0;
        for (i, &wanted) in canonical.iter().enumerate() {
            while pos < signature.len() && signature[pos] < wanted {
                pos += 1;
            }
            if pos == signature.len() || signature[pos] != wanted {
                return 0;
            }
            out[permutation[i]] = self.columns[pos + 1].base();
            pos += 1;
        }
        self.len
    }

    // -- internal helpers ---------------------------------------------------

    fn grow(&mut self) {
        let old_cap = self.capacity;
        let new_cap = old_cap
            .checked_mul(2)
            .unwrap_or_else(|| panic!("capacity overflow: {old_cap} rows"))
            .max(self.min_capacity);
        for column in self.columns.iter_mut() {
            // SAFETY: every column is allocated for exactly `old_cap` rows.
            unsafe { column.reallocate(old_cap, new_cap) };
        }
        self.capacity = new_cap;
        trace!(archetype = self.id.0, old_cap, new_cap, "grew archetype columns");
    }

    /// Column index (not signature position) for `type_id`.
    fn column_index(&self, type_id: ComponentTypeId) -> usize {
        match self.find_component(type_id) {
            Some(pos) => pos + 1,
            None => panic!("{type_id:?} is not part of archetype {:?}", self.id),
        }
    }

    #[inline]
    fn check_row(&self, row: usize) {
        assert!(
            row < self.len,
            "row {row} out of range for archetype {:?} with {} rows",
            self.id,
            self.len
        );
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        let capacity = self.capacity;
        for column in self.columns.iter_mut() {
            // SAFETY: every column is allocated for exactly `capacity` rows.
            unsafe { column.deallocate(capacity) };
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
