//! Address sorted free lists of memory cells
//!
//! A free region starts with a [`MemoryCell`] recording its size and the next free region.
//! Lists are kept in ascending address order so that a region being returned can be merged
//! with its neighbours.

use std::mem;
use std::ptr::{self, NonNull};

use super::MemoryError;

/// Header written at the start of every free region.
#[repr(C)]
pub(crate) struct MemoryCell {
    size: usize,
    next: *mut MemoryCell,
}

/// Size of a cell header, which is also the granularity of the emergency area.
pub(crate) const CELL_SIZE: usize = mem::size_of::<MemoryCell>();

/// Singly linked list of free regions, sorted by address.
#[derive(Debug)]
pub(crate) struct CellList {
    head: *mut MemoryCell,
}

impl Default for CellList {
    fn default() -> Self {
        Self {
            head: ptr::null_mut(),
        }
    }
}

impl CellList {
    /// Take a region of exactly `size` bytes from the list.
    ///
    /// The first cell at least `size` long is used. An exact match is unlinked. A larger cell
    /// gives up its tail when `divide` is set, otherwise the search continues.
    ///
    /// # Safety
    ///
    /// Every cell on the list must be a live, writable region owned by the list's owner.
    pub(crate) unsafe fn search(
        &mut self,
        size: usize,
        block: usize,
        divide: bool,
    ) -> Option<NonNull<u8>> {
        debug_assert!(size % block == 0);
        let mut prev: *mut MemoryCell = ptr::null_mut();
        let mut cell = self.head;
        while !cell.is_null() {
            let cell_size = (*cell).size;
            if cell_size >= size {
                debug_assert!(cell_size % block == 0);
                if cell_size == size {
                    let next = (*cell).next;
                    if prev.is_null() {
                        self.head = next;
                    } else {
                        (*prev).next = next;
                    }
                    return NonNull::new(cell.cast());
                } else if divide {
                    (*cell).size = cell_size - size;
                    return NonNull::new(cell.cast::<u8>().add(cell_size - size));
                }
            }
            prev = cell;
            cell = (*cell).next;
        }
        None
    }

    /// Return a region of `size` bytes to the list.
    ///
    /// The region is merged with its predecessor and successor when they are address
    /// contiguous and `can_merge(lower, upper)` allows it. A region overlapping a cell already
    /// on the list is rejected with [`MemoryError::FreeUnAllocated`].
    ///
    /// # Safety
    ///
    /// `p` must point to `size` writable bytes, aligned for a [`MemoryCell`], which are not in
    /// use by anyone else. The list invariants of [`CellList::search`] apply.
    pub(crate) unsafe fn chain<F>(
        &mut self,
        p: NonNull<u8>,
        size: usize,
        block: usize,
        can_merge: F,
    ) -> Result<(), MemoryError>
    where
        F: Fn(usize, usize) -> bool,
    {
        debug_assert!(size >= block && size % block == 0);
        let addr = p.as_ptr() as usize;

        let mut prev: *mut MemoryCell = ptr::null_mut();
        let mut next = self.head;
        while !next.is_null() && (next as usize) <= addr {
            prev = next;
            next = (*next).next;
        }

        if !prev.is_null() && prev as usize + (*prev).size > addr {
            return Err(MemoryError::FreeUnAllocated);
        }
        if !next.is_null() && addr + size > next as usize {
            return Err(MemoryError::FreeUnAllocated);
        }

        let mut cell = p.as_ptr().cast::<MemoryCell>();
        cell.write(MemoryCell { size, next });

        if prev.is_null() {
            self.head = cell;
        } else if prev as usize + (*prev).size == addr && can_merge(prev as usize, addr) {
            (*prev).next = next;
            (*prev).size += size;
            cell = prev;
        } else {
            (*prev).next = cell;
        }

        if !next.is_null()
            && cell as usize + (*cell).size == next as usize
            && can_merge(cell as usize, next as usize)
        {
            (*cell).next = (*next).next;
            (*cell).size += (*next).size;
        }
        Ok(())
    }

    /// Unlink every cell for which `release(addr, size)` returns true.
    ///
    /// # Safety
    ///
    /// The list invariants of [`CellList::search`] apply. `release` may free the memory of the
    /// cell it is given; the cell is not touched again afterwards.
    pub(crate) unsafe fn retain_unless<F>(&mut self, mut release: F)
    where
        F: FnMut(usize, usize) -> bool,
    {
        let mut prev: *mut MemoryCell = ptr::null_mut();
        let mut cell = self.head;
        while !cell.is_null() {
            let next = (*cell).next;
            if release(cell as usize, (*cell).size) {
                if prev.is_null() {
                    self.head = next;
                } else {
                    (*prev).next = next;
                }
            } else {
                prev = cell;
            }
            cell = next;
        }
    }

    /// Forget every cell.
    pub(crate) fn clear(&mut self) {
        self.head = ptr::null_mut();
    }

    /// `(address, size)` of every cell, in list order.
    ///
    /// # Safety
    ///
    /// The list invariants of [`CellList::search`] apply.
    pub(crate) unsafe fn cells(&self) -> Vec<(usize, usize)> {
        let mut cells = vec![];
        let mut cell = self.head;
        while !cell.is_null() {
            cells.push((cell as usize, (*cell).size));
            cell = (*cell).next;
        }
        cells
    }
}
