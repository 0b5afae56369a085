//! Task execution service adapters.

pub mod memory;

pub use memory::LocalTaskEngine;
