use std::alloc::{Layout, alloc, dealloc};
use std::mem::align_of;
use std::ptr::NonNull;

use crate::heap_obj::Address;

struct Granule(usize);

struct Space {
    start: *mut u8,
    end: *mut u8
}

impl Space {
    const ALIGN: usize = align_of::<Granule>();

    fn new(mut size: usize) -> Option<Self> {
        size &= !(Self::ALIGN - 1);
        if size == 0 {
            return None;
        }

        unsafe {
            let start = alloc(Layout::from_size_align(size, Self::ALIGN).ok()?);
            if start.is_null() {
                return None;
            }

            Some(Self {
                start,
                end: start.add(size)
            })
        }
    }
}

impl Drop for Space {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.start, Layout::from_size_align_unchecked(
                self.end as usize - self.start as usize,
                Self::ALIGN
            ));
        }
    }
}

/// Contiguous bump-allocated space. Objects are laid out upwards from
/// `start()` with no gaps other than alignment padding.
pub struct Heap {
    space: Space,
    free: *mut u8
}

impl Heap {
    pub const ALIGN: usize = Space::ALIGN;

    pub fn new(size: usize) -> Option<Self> {
        let space = Space::new(size)?;
        let free = space.start;
        Some(Self { space, free })
    }

    pub unsafe fn alloc_raw(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let align = layout.align().max(Self::ALIGN);
        let addr = Address(self.free as usize).align_up(align);
        let new_free = addr.0.checked_add(layout.size())?
            .checked_add(Self::ALIGN - 1)? & !(Self::ALIGN - 1);

        if new_free <= self.space.end as usize {
            self.free = new_free as *mut u8;

            Some(NonNull::new_unchecked(addr.as_ptr()))
        } else {
            None
        }
    }

    pub fn start(&self) -> Address { Address(self.space.start as usize) }

    pub fn top(&self) -> Address { Address(self.free as usize) }

    pub fn end(&self) -> Address { Address(self.space.end as usize) }

    pub fn used(&self) -> usize { self.top() - self.start() }

    /// Whether `addr` lies within the allocated part of the heap.
    pub fn contains(&self, addr: Address) -> bool { self.start() <= addr && addr < self.top() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_lifecycle() {
        Heap::new(1 << 20 /* 1 MiB */).unwrap();
    }

    #[test]
    fn empty_heap() {
        assert!(Heap::new(0).is_none());
    }

    #[test]
    fn alloc_raw_bumps_upwards() {
        let mut heap = Heap::new(1 << 10).unwrap();

        unsafe {
            let layout = Layout::new::<[usize; 2]>();
            let a = heap.alloc_raw(layout).unwrap();
            let b = heap.alloc_raw(layout).unwrap();

            assert_eq!(Address(a.as_ptr() as usize), heap.start());
            assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, layout.size());
            assert_eq!(heap.used(), 2 * layout.size());
            assert!(heap.contains(Address(b.as_ptr() as usize)));
            assert!(!heap.contains(heap.top()));
        }
    }

    #[test]
    fn alloc_raw_exhausts() {
        let mut heap = Heap::new(4 * Heap::ALIGN).unwrap();

        unsafe {
            let layout = Layout::from_size_align(3 * Heap::ALIGN, Heap::ALIGN).unwrap();
            assert!(heap.alloc_raw(layout).is_some());
            assert!(heap.alloc_raw(layout).is_none());
            assert_eq!(heap.used(), 3 * Heap::ALIGN);
        }
    }
}
