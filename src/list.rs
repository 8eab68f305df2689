use std::cell::Cell;
use std::mem::size_of;

use crate::heap_obj::{Address, Header, NonIndexed, HEADER_SIZE, POINTER_SIZE};
use crate::mutator::{Mutator, WriteBarrier};
use crate::oref::{Gc, ORef, ORefEnum, Reify};
use crate::r#type::{BodyDescriptor, ObjectType};

#[repr(C)]
pub struct Pair {
    header: Header,
    car: Cell<ORef>,
    cdr: Cell<ORef>
}

const _: () = assert!(size_of::<Pair>() == Pair::BODY.size);

impl Reify for Pair {
    const TYPE: ObjectType = ObjectType::Pair;
}

unsafe impl NonIndexed for Pair {
    const BODY: BodyDescriptor = BodyDescriptor::fixed(
        HEADER_SIZE, HEADER_SIZE + 2*POINTER_SIZE, HEADER_SIZE + 2*POINTER_SIZE
    );
}

impl Pair {
    pub fn car(&self) -> ORef { self.car.get() }

    pub fn cdr(&self) -> ORef { self.cdr.get() }

    pub fn car_address(&self) -> Address { Address::of(&self.car) }

    pub fn cdr_address(&self) -> Address { Address::of(&self.cdr) }

    pub fn set_car<B: WriteBarrier + ?Sized>(&self, barrier: &mut B, v: ORef) {
        self.car.set(v);
        self.write_barrier(barrier, self.car_address(), v);
    }

    pub fn set_cdr<B: WriteBarrier + ?Sized>(&self, barrier: &mut B, v: ORef) {
        self.cdr.set(v);
        self.write_barrier(barrier, self.cdr_address(), v);
    }

    fn write_barrier<B: WriteBarrier + ?Sized>(&self, barrier: &mut B, slot: Address, v: ORef) {
        if let ORefEnum::Gc(target) = v.into() {
            barrier.record_write(Gc::from_ref(self).as_any(), slot, target);
        }
    }
}

impl Gc<Pair> {
    pub fn new(mt: &mut Mutator, car: ORef, cdr: ORef) -> Option<Self> {
        unsafe {
            let nptr = mt.alloc_static::<Pair>()?;
            nptr.as_ptr().write(Pair {
                header: Header::new(Pair::TYPE),
                car: Cell::new(car),
                cdr: Cell::new(cdr)
            });
            Some(Gc::new_unchecked(nptr))
        }
    }
}
