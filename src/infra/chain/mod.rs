//! Chain query adapters.

pub mod memory;

pub use memory::InMemoryChain;
