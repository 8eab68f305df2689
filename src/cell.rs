use std::mem::{offset_of, size_of};

use crate::heap_obj::{Address, Header, NonIndexed, HEADER_SIZE, POINTER_SIZE};
use crate::mutator::{Mutator, WriteBarrier};
use crate::oref::{Gc, ORef, ORefEnum, Reify};
use crate::r#type::{BodyDescriptor, ObjectType};

/// A heap object holding one mutable value, shared by everyone holding the
/// cell instead of a copy of the value (boxed globals, captured variables).
///
/// ```text
/// [header: HEADER_SIZE][value: POINTER_SIZE]
/// ```
#[repr(C)]
pub struct Cell {
    header: Header,
    value: std::cell::Cell<ORef>
}

const _: () = assert!(offset_of!(Cell, value) == Cell::VALUE_OFFSET);
const _: () = assert!(size_of::<Cell>() == Cell::SIZE);

impl Reify for Cell {
    const TYPE: ObjectType = ObjectType::Cell;
}

unsafe impl NonIndexed for Cell {
    const BODY: BodyDescriptor = BodyDescriptor::fixed(
        Self::VALUE_OFFSET, Self::VALUE_OFFSET + POINTER_SIZE, Self::SIZE
    );
}

impl Cell {
    pub const VALUE_OFFSET: usize = HEADER_SIZE;

    pub const SIZE: usize = Self::VALUE_OFFSET + POINTER_SIZE;

    pub fn value(&self) -> ORef { self.value.get() }

    /// Stores `v`. Heap references are reported to `barrier` before this
    /// returns.
    pub fn set_value<B: WriteBarrier + ?Sized>(&self, barrier: &mut B, v: ORef) {
        self.value.set(v);

        if let ORefEnum::Gc(target) = v.into() {
            barrier.record_write(Gc::from_ref(self).as_any(), self.value_address(), target);
        }
    }

    pub fn address(&self) -> Address { Address::of(self) }

    pub fn value_address(&self) -> Address { Gc::from_ref(self).value_address() }

    /// Inverse of `value_address`. `addr` must be the value slot of a live
    /// cell; nothing is checked.
    pub unsafe fn from_value_address(addr: Address) -> Gc<Cell> {
        Gc::from_address(addr - Self::VALUE_OFFSET)
    }

    pub const fn describe_pointer_fields() -> BodyDescriptor { Self::BODY }
}

impl Gc<Cell> {
    pub fn new(mt: &mut Mutator, v: ORef) -> Option<Self> {
        unsafe {
            let nptr = mt.alloc_static::<Cell>()?;
            nptr.as_ptr().write(Cell {
                header: Header::new(Cell::TYPE),
                value: std::cell::Cell::new(v)
            });
            Some(Gc::new_unchecked(nptr))
        }
    }

    pub fn value_address(self) -> Address { self.address() + Cell::VALUE_OFFSET }
}
