//! Pure review-scheduling calculators.
//!
//! Everything in this module is synchronous, side-effect-free and reads no
//! clock; "now" is always an argument. Safe to call concurrently.

pub mod interval;
pub mod next_due;
pub mod overdue;

pub use interval::{due_from_period, next_from_interval};
pub use next_due::compute_next_due;
pub use overdue::is_overdue;
