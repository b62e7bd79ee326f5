//! Identity / content store
//!
//! The worker pool, the reward loop and the HTTP intake only see the
//! [`Store`] trait. Two backends exist: [`MemoryStore`] for dev mode and
//! tests, and [`MongoStore`] for production.

pub mod memory;
pub mod mongo;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use store::Store;
