use std::cell::Cell;
use std::mem::size_of;
use std::ops::{Add, Sub};

use crate::oref::{ORef, Reify};
use crate::r#type::{BodyDescriptor, ObjectType};

pub const POINTER_SIZE: usize = size_of::<ORef>();

pub const HEADER_SIZE: usize = size_of::<Header>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub usize);

impl Address {
    pub fn of<T>(obj: &T) -> Self { Self(obj as *const T as usize) }

    pub fn is_aligned(self, align: usize) -> bool { self.0 & (align - 1) == 0 }

    pub fn align_up(self, align: usize) -> Self { Self((self.0 + align - 1) & !(align - 1)) }

    pub fn as_ptr<T>(self) -> *mut T { self.0 as *mut T }
}

impl Add<usize> for Address {
    type Output = Self;

    fn add(self, offset: usize) -> Self { Self(self.0 + offset) }
}

impl Sub<usize> for Address {
    type Output = Self;

    fn sub(self, offset: usize) -> Self { Self(self.0 - offset) }
}

impl Sub<Address> for Address {
    type Output = usize;

    fn sub(self, other: Address) -> usize { self.0 - other.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFlags(pub usize);

impl HeaderFlags {
    pub const NONE: Self = Self(0);
    pub const REMEMBERED: Self = Self(1 << 0);

    pub const fn contains(self, flag: Self) -> bool { self.0 & flag.0 == flag.0 }
}

/// The word at the start of every heap object.
///
/// ```text
/// bits 0..8:  flags
/// bits 8..:   object type
/// ```
///
/// An all-zero word decodes to no type, so zeroed memory never passes as an
/// object.
#[repr(transparent)]
pub struct Header(Cell<usize>);

const _: () = assert!(HEADER_SIZE == POINTER_SIZE);

impl Header {
    const TYPE_SHIFT: usize = 8;

    const FLAG_BITS: usize = (1 << Self::TYPE_SHIFT) - 1;

    pub const fn new(r#type: ObjectType) -> Self {
        Self(Cell::new((r#type as usize) << Self::TYPE_SHIFT))
    }

    pub fn raw_type(&self) -> usize { self.0.get() >> Self::TYPE_SHIFT }

    pub fn r#type(&self) -> Option<ObjectType> { ObjectType::try_from(self.raw_type()).ok() }

    pub fn flags(&self) -> HeaderFlags { HeaderFlags(self.0.get() & Self::FLAG_BITS) }

    pub fn has_flag(&self, flag: HeaderFlags) -> bool { self.flags().contains(flag) }

    pub fn add_flag(&self, flag: HeaderFlags) { self.0.set(self.0.get() | flag.0); }

    pub fn remove_flag(&self, flag: HeaderFlags) { self.0.set(self.0.get() & !flag.0); }
}

/// Objects of a single fixed size whose first field is a `Header`.
///
/// Implementors must be `#[repr(C)]` with `header: Header` first, and `BODY`
/// must describe exactly the `ORef` fields of the struct.
pub unsafe trait NonIndexed: Reify + Sized {
    const BODY: BodyDescriptor;

    fn header(&self) -> &Header {
        unsafe { &*(self as *const Self as *const Header) }
    }
}
