//! KMI (kernel module interface) support: trim propagation and symbol lists.

pub mod symbol_list;
pub mod trim;

pub use symbol_list::flatten_symbol_list;
pub use trim::{effective_trim, GlobalOverrides, TrimState};
