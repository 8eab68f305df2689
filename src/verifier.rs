use std::collections::HashSet;
use std::mem::size_of;

use thiserror::Error;

use crate::cell::Cell;
use crate::heap::Heap;
use crate::heap_obj::Address;
use crate::list::Pair;
use crate::mutator::Mutator;
use crate::oref::{Gc, ORef, ORefEnum};
use crate::r#type::{BodyDescriptor, ObjectType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("object @ {0} is misaligned")]
    Misaligned(Address),

    #[error("object @ {address} has invalid header type {raw}")]
    InvalidHeader { address: Address, raw: usize },

    #[error("no body descriptor registered for {0:?}")]
    MissingDescriptor(ObjectType),

    #[error("malformed body descriptor for {ty:?}: {desc:?}")]
    MalformedDescriptor { ty: ObjectType, desc: BodyDescriptor },

    #[error("slot @ {slot} points outside the heap to {target}")]
    DanglingPointer { slot: Address, target: Address },

    #[error("slot @ {slot} points into the middle of an object at {target}")]
    InteriorPointer { slot: Address, target: Address },

    #[error("value address of cell @ {0} does not map back to it")]
    ValueAddressMismatch(Address),

    #[error("heap walk stopped at {stopped}, heap top is {top}")]
    TruncatedWalk { stopped: Address, top: Address }
}

fn rust_size_of(r#type: ObjectType) -> usize {
    match r#type {
        ObjectType::Cell => size_of::<Cell>(),
        ObjectType::Pair => size_of::<Pair>()
    }
}

pub fn verify_descriptor(r#type: ObjectType, desc: BodyDescriptor) -> Result<(), VerifyError> {
    if desc.is_well_formed() && desc.size == rust_size_of(r#type) {
        Ok(())
    } else {
        Err(VerifyError::MalformedDescriptor { ty: r#type, desc })
    }
}

fn slot_value(slot: Address) -> ORef { unsafe { *slot.as_ptr::<ORef>() } }

/// Checks the header and body of `obj` and that each heap reference in it
/// points at something with a valid header.
pub fn verify_object(mt: &Mutator, obj: Gc<()>) -> Result<(), VerifyError> {
    let address = obj.address();
    if !address.is_aligned(Heap::ALIGN) {
        return Err(VerifyError::Misaligned(address));
    }

    let r#type = obj.r#type()
        .ok_or(VerifyError::InvalidHeader { address, raw: obj.header().raw_type() })?;
    let desc = mt.descriptors().get(r#type)
        .ok_or(VerifyError::MissingDescriptor(r#type))?;
    verify_descriptor(r#type, desc)?;

    for slot in mt.pointer_slots(obj) {
        if let ORefEnum::Gc(target) = slot_value(slot).into() {
            let target = target.address();
            if !mt.heap().contains(target) {
                return Err(VerifyError::DanglingPointer { slot, target });
            }
            if !target.is_aligned(Heap::ALIGN) {
                return Err(VerifyError::Misaligned(target));
            }
            let target_obj = unsafe { Gc::<()>::from_address(target) };
            if target_obj.r#type().is_none() {
                return Err(VerifyError::InteriorPointer { slot, target });
            }
        }
    }

    Ok(())
}

pub fn verify_cell(mt: &Mutator, cell: &Cell) -> Result<(), VerifyError> {
    let gc = Gc::from_ref(cell);
    verify_object(mt, gc.as_any())?;

    if unsafe { Cell::from_value_address(cell.value_address()) } != gc
        || cell.value_address() - cell.address() != Cell::VALUE_OFFSET
    {
        return Err(VerifyError::ValueAddressMismatch(cell.address()));
    }

    Ok(())
}

/// Verifies every descriptor and object, then that every heap reference
/// targets an object start.
pub fn verify_heap(mt: &Mutator) -> Result<(), VerifyError> {
    for r#type in ObjectType::ALL {
        match mt.descriptors().get(r#type) {
            Some(desc) => verify_descriptor(r#type, desc)?,
            None => return Err(VerifyError::MissingDescriptor(r#type))
        }
    }

    let mut starts = HashSet::new();
    let mut end = mt.heap().start();
    for obj in mt.objects() {
        verify_object(mt, obj)?;
        if let Ok(cell) = obj.try_cast::<Cell>() {
            verify_cell(mt, unsafe { cell.as_ref() })?;
        }

        starts.insert(obj.address());
        // `objects` only yields objects with a descriptor:
        let size = obj.r#type().and_then(|r#type| mt.descriptors().get(r#type))
            .map_or(0, |desc| desc.size);
        end = (obj.address() + size).align_up(Heap::ALIGN);
    }

    if end != mt.heap().top() {
        return Err(VerifyError::TruncatedWalk { stopped: end, top: mt.heap().top() });
    }

    for &obj in starts.iter() {
        for slot in mt.pointer_slots(unsafe { Gc::<()>::from_address(obj) }) {
            if let ORefEnum::Gc(target) = slot_value(slot).into() {
                if !starts.contains(&target.address()) {
                    return Err(VerifyError::InteriorPointer { slot, target: target.address() });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap_obj::{NonIndexed, HEADER_SIZE};
    use crate::mutator::Cfg;
    use crate::oref::Fixnum;

    fn zero() -> ORef { ORef::from(Fixnum::from(0u8)) }

    #[test]
    fn descriptors_are_consistent() {
        assert_eq!(verify_descriptor(ObjectType::Cell, Cell::BODY), Ok(()));
        assert_eq!(verify_descriptor(ObjectType::Pair, Pair::BODY), Ok(()));
        assert!(verify_descriptor(ObjectType::Pair, Cell::BODY).is_err());
    }

    #[test]
    fn well_formed_heap() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        let p = Gc::<Pair>::new(&mut mt, a.into(), zero()).unwrap();
        let b = Gc::<Cell>::new(&mut mt, p.into()).unwrap();
        unsafe { a.as_ref() }.set_value(&mut mt, b.into());

        assert_eq!(verify_cell(&mt, unsafe { a.as_ref() }), Ok(()));
        assert_eq!(verify_heap(&mt), Ok(()));
    }

    #[test]
    fn self_referencing_cell() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        unsafe { a.as_ref() }.set_value(&mut mt, a.into());

        assert_eq!(verify_heap(&mt), Ok(()));
    }

    #[test]
    fn null_value_is_not_a_reference() {
        let mut mt = Mutator::new(Cfg { debug: true, ..Cfg::default() }).unwrap();
        let null = unsafe { ORef::from_bits(0) };
        let a = Gc::<Cell>::new(&mut mt, null).unwrap();
        let b = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        unsafe { b.as_ref() }.set_value(&mut mt, null);

        assert!(mt.remembered().is_empty());
        assert_eq!(verify_cell(&mt, unsafe { a.as_ref() }), Ok(()));
        assert_eq!(verify_heap(&mt), Ok(()));
    }

    #[test]
    fn corrupt_header() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        unsafe { a.as_ptr().cast::<usize>().write(0) };

        assert_eq!(
            verify_object(&mt, a.as_any()),
            Err(VerifyError::InvalidHeader { address: a.address(), raw: 0 })
        );
        assert!(matches!(verify_heap(&mt), Err(VerifyError::TruncatedWalk { .. })));
    }

    #[test]
    fn interior_pointer() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        let p = Gc::<Pair>::new(&mut mt, zero(), zero()).unwrap();

        // Points at the car slot of `p`, which holds a fixnum:
        let bogus = unsafe { ORef::from_bits((p.address() + HEADER_SIZE).0) };
        unsafe { a.as_ref() }.set_value(&mut mt, bogus);

        assert_eq!(
            verify_object(&mt, a.as_any()),
            Err(VerifyError::InteriorPointer { slot: a.value_address(), target: p.address() + HEADER_SIZE })
        );
    }

    #[test]
    fn interior_pointer_at_header_like_word() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();
        // Fixnum 128 is the word 0x101, which decodes as a `Cell` header:
        let p = Gc::<Pair>::new(&mut mt, ORef::from(Fixnum::from(128u8)), zero()).unwrap();

        let target = p.address() + HEADER_SIZE;
        unsafe { a.as_ref() }.set_value(&mut mt, unsafe { ORef::from_bits(target.0) });

        assert_eq!(verify_object(&mt, a.as_any()), Ok(()));
        assert_eq!(
            verify_heap(&mt),
            Err(VerifyError::InteriorPointer { slot: a.value_address(), target })
        );
    }

    #[test]
    fn dangling_pointer() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let a = Gc::<Cell>::new(&mut mt, zero()).unwrap();

        let outside = mt.heap().top();
        let bogus = unsafe { ORef::from_bits(outside.0) };
        unsafe { a.as_ref() }.set_value(&mut mt, bogus);

        assert_eq!(
            verify_heap(&mt),
            Err(VerifyError::DanglingPointer { slot: a.value_address(), target: outside })
        );
    }
}
