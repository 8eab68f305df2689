use std::alloc::Layout;
use std::iter;
use std::mem::align_of;
use std::ptr::NonNull;

use crate::heap::Heap;
use crate::heap_obj::{Address, HeaderFlags, NonIndexed};
use crate::oref::Gc;
use crate::r#type::{BodyDescriptors, ObjectType};
use crate::cell::Cell;
use crate::list::Pair;
use crate::verifier::verify_object;

/// Notified after every store of a heap reference into a heap object.
pub trait WriteBarrier {
    fn record_write(&mut self, host: Gc<()>, slot: Address, target: Gc<()>);
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub heap_size: usize,
    /// Verify the host object on every barriered write.
    pub debug: bool
}

impl Default for Cfg {
    fn default() -> Self {
        Self {
            heap_size: 1 << 20 /* 1 MiB */,
            debug: false
        }
    }
}

pub struct Mutator {
    heap: Heap,
    descriptors: BodyDescriptors,
    remembered: Vec<Gc<()>>,
    cfg: Cfg
}

impl Mutator {
    pub fn new(cfg: Cfg) -> Option<Self> {
        let heap = Heap::new(cfg.heap_size)?;

        let mut descriptors = BodyDescriptors::new();
        descriptors.register(ObjectType::Cell, Cell::describe_pointer_fields());
        descriptors.register(ObjectType::Pair, Pair::BODY);

        log::debug!("created mutator: heap {} @ {}, debug = {}", cfg.heap_size, heap.start(), cfg.debug);

        Some(Self {
            heap,
            descriptors,
            remembered: Vec::new(),
            cfg
        })
    }

    pub fn cfg(&self) -> &Cfg { &self.cfg }

    pub fn heap(&self) -> &Heap { &self.heap }

    pub fn descriptors(&self) -> &BodyDescriptors { &self.descriptors }

    /// Reserves uninitialized space for a `T`. The caller must write the
    /// whole object, header included, before anything walks the heap.
    pub unsafe fn alloc_static<T: NonIndexed>(&mut self) -> Option<NonNull<T>> {
        let layout = Layout::from_size_align_unchecked(T::BODY.size, align_of::<T>());
        let nptr = self.heap.alloc_raw(layout)?.cast::<T>();
        log::trace!("allocated {:?} @ {}", T::TYPE, Address(nptr.as_ptr() as usize));
        Some(nptr)
    }

    /// All objects in allocation order. Stops early at an object whose
    /// header type has no descriptor.
    pub fn objects(&self) -> impl Iterator<Item = Gc<()>> + '_ {
        let mut addr = self.heap.start();
        iter::from_fn(move || {
            if addr >= self.heap.top() {
                return None;
            }

            let obj = unsafe { Gc::<()>::from_address(addr) };
            let desc = self.descriptors.get(obj.r#type()?)?;
            addr = (addr + desc.size).align_up(Heap::ALIGN);
            Some(obj)
        })
    }

    pub fn pointer_slots(&self, obj: Gc<()>) -> impl Iterator<Item = Address> {
        self.descriptors.pointer_slots(obj)
    }

    pub fn remembered(&self) -> &[Gc<()>] { &self.remembered }

    pub fn take_remembered(&mut self) -> Vec<Gc<()>> {
        for host in self.remembered.iter() {
            host.header().remove_flag(HeaderFlags::REMEMBERED);
        }

        std::mem::take(&mut self.remembered)
    }
}

impl WriteBarrier for Mutator {
    fn record_write(&mut self, host: Gc<()>, slot: Address, target: Gc<()>) {
        log::trace!("write barrier: {} <- {} in {}", slot, target.address(), host.address());

        if !host.header().has_flag(HeaderFlags::REMEMBERED) {
            host.header().add_flag(HeaderFlags::REMEMBERED);
            self.remembered.push(host);
        }

        if self.cfg.debug {
            if let Err(err) = verify_object(self, host) {
                log::error!("write to {} left {} malformed: {}", slot, host.address(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oref::{Fixnum, ORef};

    #[test]
    fn mutator_new() {
        let mt = Mutator::new(Cfg::default()).unwrap();
        assert_eq!(mt.descriptors().get(ObjectType::Cell), Some(Cell::describe_pointer_fields()));
        assert_eq!(mt.descriptors().get(ObjectType::Pair), Some(Pair::BODY));
        assert_eq!(mt.objects().count(), 0);
    }

    #[test]
    fn mutator_without_heap() {
        assert!(Mutator::new(Cfg { heap_size: 0, debug: false }).is_none());
    }

    #[test]
    fn objects_in_allocation_order() {
        let mut mt = Mutator::new(Cfg::default()).unwrap();
        let zero = ORef::from(Fixnum::from(0u8));

        let a = Gc::<Cell>::new(&mut mt, zero).unwrap();
        let p = Gc::<Pair>::new(&mut mt, zero, zero).unwrap();
        let b = Gc::<Cell>::new(&mut mt, a.into()).unwrap();

        let objs = mt.objects().collect::<Vec<_>>();
        assert_eq!(objs, vec![a.as_any(), p.as_any(), b.as_any()]);
    }

    #[test]
    fn barrier_remembers_host_once() {
        let mut mt = Mutator::new(Cfg { debug: true, ..Cfg::default() }).unwrap();
        let zero = ORef::from(Fixnum::from(0u8));

        let cell = Gc::<Cell>::new(&mut mt, zero).unwrap();
        let target = Gc::<Cell>::new(&mut mt, zero).unwrap();

        mt.record_write(cell.as_any(), cell.value_address(), target.as_any());
        mt.record_write(cell.as_any(), cell.value_address(), target.as_any());
        assert_eq!(mt.remembered(), &[cell.as_any()]);
        assert!(cell.header().has_flag(HeaderFlags::REMEMBERED));

        assert_eq!(mt.take_remembered(), vec![cell.as_any()]);
        assert!(mt.remembered().is_empty());
        assert!(!cell.header().has_flag(HeaderFlags::REMEMBERED));
    }

    #[test]
    fn debug_barrier_keeps_malformed_store() {
        let mut mt = Mutator::new(Cfg { debug: true, ..Cfg::default() }).unwrap();
        let zero = ORef::from(Fixnum::from(0u8));
        let cell = Gc::<Cell>::new(&mut mt, zero).unwrap();

        // Outside the allocated heap, so verifying the host fails:
        let dangling = unsafe { ORef::from_bits(mt.heap().top().0) };
        unsafe { cell.as_ref() }.set_value(&mut mt, dangling);

        assert_eq!(unsafe { cell.as_ref() }.value(), dangling);
        assert_eq!(mt.remembered(), &[cell.as_any()]);
        assert!(verify_object(&mt, cell.as_any()).is_err());
    }

    #[test]
    fn out_of_memory() {
        let mut mt = Mutator::new(Cfg { heap_size: Cell::SIZE, debug: false }).unwrap();
        let zero = ORef::from(Fixnum::from(0u8));

        assert!(Gc::<Cell>::new(&mut mt, zero).is_some());
        assert!(Gc::<Cell>::new(&mut mt, zero).is_none());
    }
}
