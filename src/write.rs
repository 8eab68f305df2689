use std::fmt::{self, Display};

use pretty::RcDoc;

use crate::cell::Cell;
use crate::heap_obj::{Address, NonIndexed};
use crate::list::Pair;
use crate::oref::{Gc, ORef, ORefEnum};
use crate::r#type::ObjectType;

pub const WIDTH: usize = 80;

impl Display for Address {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result { write!(fmt, "{:#x}", self.0) }
}

impl Display for ORef {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match (*self).into() {
            ORefEnum::Null => write!(fmt, "#<null>"),
            ORefEnum::Gc(obj) => obj.fmt(fmt),
            ORefEnum::Fixnum(n) => write!(fmt, "{}", n)
        }
    }
}

impl<T> Display for Gc<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.r#type() {
            Some(ObjectType::Cell) => write!(fmt, "#<cell @ {}>", self.address()),
            Some(ObjectType::Pair) => write!(fmt, "#<pair @ {}>", self.address()),
            None => write!(fmt, "#<object @ {}>", self.address())
        }
    }
}

fn slot_doc(name: &str, address: Address, v: ORef) -> RcDoc<'static, ()> {
    RcDoc::line()
        .append(RcDoc::text(format!("{} @ {}:", name, address)))
        .append(RcDoc::text(" "))
        .append(RcDoc::as_string(v))
}

fn object_doc(name: &str, address: Address, size: usize, slots: RcDoc<'static, ()>)
    -> RcDoc<'static, ()>
{
    RcDoc::text(format!("#<{} @ {}", name, address))
        .append(RcDoc::line()
            .append(RcDoc::text(format!("size: {}", size)))
            .append(slots)
            .nest(2))
        .append(RcDoc::text(">"))
        .group()
}

pub fn render(doc: &RcDoc<()>, width: usize) -> String {
    doc.pretty(width).to_string()
}

impl Cell {
    /// Shallow layout dump; the value is printed as a reference only.
    pub fn to_doc(&self) -> RcDoc<'static, ()> {
        object_doc("cell", self.address(), Self::BODY.size,
            slot_doc("value", self.value_address(), self.value()))
    }
}

impl Pair {
    pub fn to_doc(&self) -> RcDoc<'static, ()> {
        object_doc("pair", Address::of(self), Self::BODY.size,
            slot_doc("car", self.car_address(), self.car())
                .append(slot_doc("cdr", self.cdr_address(), self.cdr())))
    }
}

impl Gc<()> {
    pub fn to_doc(self) -> RcDoc<'static, ()> {
        if let Ok(cell) = self.try_cast::<Cell>() {
            unsafe { cell.as_ref() }.to_doc()
        } else if let Ok(pair) = self.try_cast::<Pair>() {
            unsafe { pair.as_ref() }.to_doc()
        } else {
            RcDoc::as_string(self)
        }
    }
}
