//! Core value types shared by the document layer and the aggregation services.

pub mod macros;
pub mod time;

pub use time::{day_of_year, week_of_year};
