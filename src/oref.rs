use std::fmt::{self, Debug};
use std::mem::size_of;
use std::ptr::NonNull;

use thiserror::Error;

use crate::heap_obj::{Address, Header};
use crate::r#type::ObjectType;

trait Tagged {
    const TAG: usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ORef(usize);

impl ORef {
    pub const TAG_SIZE: usize = 1;

    const TAG_BITS: usize = (1 << Self::TAG_SIZE) - 1;

    const PAYLOAD_BITS: usize = 8*size_of::<Self>() - Self::TAG_SIZE;

    const SHIFT: usize = Self::TAG_SIZE;

    pub fn tag(self) -> usize { self.0 & Self::TAG_BITS }

    fn is_tagged<T: Tagged>(self) -> bool { self.tag() == T::TAG }

    pub fn bits(self) -> usize { self.0 }

    pub unsafe fn from_bits(bits: usize) -> Self { Self(bits) }

    pub unsafe fn unchecked_cast<T>(self) -> Gc<T> {
        Gc::new_unchecked(NonNull::new_unchecked(self.0 as *mut T))
    }

    pub fn try_cast<T: Reify>(self) -> Result<Gc<T>, CastError> {
        match Gc::<()>::try_from(self) {
            Ok(obj) => obj.try_cast::<T>(),
            Err(()) => Err(CastError::NotHeapObject(self))
        }
    }

    pub fn instance_of<T: Reify>(self) -> bool { self.try_cast::<T>().is_ok() }
}

pub enum ORefEnum {
    Null,
    Gc(Gc<()>),
    Fixnum(isize)
}

impl From<ORef> for ORefEnum {
    fn from(oref: ORef) -> Self {
        match oref.tag() {
            Gc::<()>::TAG => match Gc::<()>::try_from(oref) {
                Ok(obj) => Self::Gc(obj),
                Err(()) => Self::Null
            },
            Fixnum::TAG => Self::Fixnum(Fixnum(oref.0).into()),
            _ => unreachable!()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixnum(usize);

impl Tagged for Fixnum {
    const TAG: usize = Gc::<()>::TAG + 1;
}

impl Fixnum {
    pub const MIN: isize = -(1 << (ORef::PAYLOAD_BITS - 1));

    pub const MAX: isize = (1 << (ORef::PAYLOAD_BITS - 1)) - 1;
}

impl From<Fixnum> for ORef {
    fn from(n: Fixnum) -> Self { ORef(n.0) }
}

impl TryFrom<ORef> for Fixnum {
    type Error = ();

    fn try_from(oref: ORef) -> Result<Self, Self::Error> {
        if oref.is_tagged::<Self>() {
            Ok(Self(oref.0))
        } else {
            Err(())
        }
    }
}

impl TryFrom<isize> for Fixnum {
    type Error = ();

    fn try_from(n: isize) -> Result<Self, Self::Error> {
        // Bounds check `MIN <= n <= MAX` from Hacker's Delight 4-1:
        if n.wrapping_sub(Fixnum::MIN) as usize <= (Fixnum::MAX - Fixnum::MIN) as usize {
            Ok(Fixnum(((n as usize) << ORef::SHIFT) | Fixnum::TAG))
        } else {
            Err(())
        }
    }
}

impl From<Fixnum> for isize {
    fn from(n: Fixnum) -> Self { (n.0 as isize) >> ORef::SHIFT }
}

impl From<u8> for Fixnum {
    fn from(n: u8) -> Self { Self((n as usize) << ORef::SHIFT | Fixnum::TAG) }
}

/// Static type tag of a heap object type.
pub trait Reify {
    const TYPE: ObjectType;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("{0:?} is not a heap object")]
    NotHeapObject(ORef),

    #[error("expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: ObjectType, found: ObjectType },

    #[error("object @ {address} has invalid header type {raw}")]
    InvalidHeader { address: Address, raw: usize }
}

/// Pointer to the start (header) of a heap object.
pub struct Gc<T>(NonNull<T>);

impl<T> Gc<T> {
    pub const TAG: usize = 0;

    pub unsafe fn new_unchecked(ptr: NonNull<T>) -> Self { Self(ptr) }

    pub fn from_ref(obj: &T) -> Self { Self(NonNull::from(obj)) }

    /// `addr` must be non-null. Nothing else is checked.
    pub unsafe fn from_address(addr: Address) -> Self {
        Self(NonNull::new_unchecked(addr.as_ptr()))
    }

    pub fn address(self) -> Address { Address(self.0.as_ptr() as usize) }

    pub fn as_ptr(self) -> *mut T { self.0.as_ptr() }

    pub unsafe fn as_ref<'a>(self) -> &'a T { &*self.0.as_ptr() }

    pub fn header(&self) -> &Header { unsafe { &*(self.0.as_ptr() as *const Header) } }

    pub fn r#type(self) -> Option<ObjectType> { self.header().r#type() }

    pub unsafe fn unchecked_cast<R>(self) -> Gc<R> { Gc::<R>(self.0.cast()) }

    pub fn as_any(self) -> Gc<()> { Gc(self.0.cast()) }
}

impl Gc<()> {
    pub fn instance_of<T: Reify>(self) -> bool { self.header().raw_type() == T::TYPE as usize }

    pub fn try_cast<T: Reify>(self) -> Result<Gc<T>, CastError> {
        if self.instance_of::<T>() {
            Ok(unsafe { self.unchecked_cast::<T>() })
        } else {
            match self.r#type() {
                Some(found) => Err(CastError::TypeMismatch { expected: T::TYPE, found }),
                None => Err(CastError::InvalidHeader {
                    address: self.address(),
                    raw: self.header().raw_type()
                })
            }
        }
    }
}

impl<T> Debug for Gc<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_tuple("Gc")
            .field(&self.0)
            .finish()
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self { Self(self.0) }
}

impl<T> Copy for Gc<T> {}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool { self.0 == other.0 }
}

impl<T> Eq for Gc<T> {}

impl<T> From<Gc<T>> for ORef {
    fn from(obj: Gc<T>) -> Self { Self(obj.0.as_ptr() as usize) }
}

impl TryFrom<ORef> for Gc<()> {
    type Error = ();

    fn try_from(obj: ORef) -> Result<Self, Self::Error> {
        if obj.tag() == Gc::<()>::TAG && obj.0 != 0 {
            Ok(unsafe { obj.unchecked_cast::<()>() })
        } else {
            Err(())
        }
    }
}
