//! Transfer accounting helpers.

pub mod progress;
