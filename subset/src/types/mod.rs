//! Data types shared by the graph, closure, scheduling and transfer stages.

mod cell;
mod relationship;
mod row_set;
mod table_row;

pub use cell::*;
pub use relationship::*;
pub use row_set::*;
pub use table_row::*;
