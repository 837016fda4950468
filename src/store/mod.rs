//! Store Module
//!
//! In-memory key-value map rebuilt from the transaction log.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - No knowledge of logging; durability is layered on top
//!
//! ## Data Structure Choice
//! HashMap wrapped in RwLock: callers never see key order, and
//! every mutation is a single map operation held under the write lock.

mod keystore;

pub use keystore::KeyStore;
