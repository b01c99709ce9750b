//! Async resource nodes.

mod nodes;
mod search;

pub use nodes::{Action, Collection, Item, Member, Namespace};
pub use search::Search;
