//! Extension host backends.

pub mod inmemory;

pub use inmemory::{Delivery, InMemoryHost};
