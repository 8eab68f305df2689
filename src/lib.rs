pub mod oref;
pub mod heap_obj;
pub mod r#type;
pub mod heap;
pub mod mutator;
pub mod cell;
pub mod list;
pub mod verifier;
pub mod write;
