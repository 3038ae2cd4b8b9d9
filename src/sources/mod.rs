//! Record sources.
//!
//! The costbook is exported as structured JSON; this module turns such a
//! file into a lazy, restartable sequence of validated [`CostRecord`]s.
//!
//! [`CostRecord`]: crate::models::CostRecord

mod json;

pub use json::{InputLayout, RecordSource, Records};
