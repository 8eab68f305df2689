use crate::heap_obj::{Address, POINTER_SIZE};
use crate::oref::Gc;

/// Closed set of heap object types, stored in every `Header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ObjectType {
    Cell = 1,
    Pair
}

impl ObjectType {
    pub const COUNT: usize = Self::Pair as usize;

    pub const ALL: [Self; Self::COUNT] = [Self::Cell, Self::Pair];

    fn index(self) -> usize { self as usize - 1 }
}

impl TryFrom<usize> for ObjectType {
    type Error = ();

    fn try_from(raw: usize) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Cell),
            2 => Ok(Self::Pair),
            _ => Err(())
        }
    }
}

/// Byte range `[start, end)` of the pointer slots in an object of `size`
/// bytes. Offsets are from the object start, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyDescriptor {
    pub start: usize,
    pub end: usize,
    pub size: usize
}

impl BodyDescriptor {
    pub const fn fixed(start: usize, end: usize, size: usize) -> Self {
        assert!(start <= end && end <= size);
        assert!((end - start) % POINTER_SIZE == 0);
        Self { start, end, size }
    }

    pub fn slot_count(self) -> usize { (self.end - self.start) / POINTER_SIZE }

    pub fn slot_offsets(self) -> impl Iterator<Item = usize> {
        (self.start..self.end).step_by(POINTER_SIZE)
    }

    pub fn is_well_formed(self) -> bool {
        self.start <= self.end && self.end <= self.size
            && (self.end - self.start) % POINTER_SIZE == 0
    }
}

/// Per-type body descriptors, consumed by whoever scans the heap.
pub struct BodyDescriptors {
    descriptors: [Option<BodyDescriptor>; ObjectType::COUNT]
}

impl BodyDescriptors {
    pub fn new() -> Self { Self { descriptors: [None; ObjectType::COUNT] } }

    pub fn register(&mut self, r#type: ObjectType, desc: BodyDescriptor) {
        debug_assert!(desc.is_well_formed());

        if let Some(old) = self.descriptors[r#type.index()].replace(desc) {
            log::warn!("replaced body descriptor of {:?}: {:?} -> {:?}", r#type, old, desc);
        } else {
            log::debug!("registered body descriptor of {:?}: {:?}", r#type, desc);
        }
    }

    pub fn get(&self, r#type: ObjectType) -> Option<BodyDescriptor> {
        self.descriptors[r#type.index()]
    }

    /// Addresses of the pointer slots of the live object `obj`.
    pub fn pointer_slots(&self, obj: Gc<()>) -> impl Iterator<Item = Address> {
        let base = obj.address();
        obj.r#type()
            .and_then(|r#type| self.get(r#type))
            .into_iter()
            .flat_map(BodyDescriptor::slot_offsets)
            .map(move |offset| base + offset)
    }
}

impl Default for BodyDescriptors {
    fn default() -> Self { Self::new() }
}
