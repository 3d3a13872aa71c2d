pub mod models;
pub mod repository;
pub mod traits;

#[cfg(test)]
pub mod memory;

pub use repository::LedgerRepository;
pub use traits::LedgerStore;
