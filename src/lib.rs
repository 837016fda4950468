//! # kvlog
//!
//! A minimal durable key-value store:
//! - In-memory map with single-writer/multi-reader locking
//! - Asynchronous transaction log (bounded queue, one writer thread)
//! - Crash recovery by replaying the log in sequence order
//! - File or SQLite log backends behind one trait
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvService                             │
//! │              (many concurrent request threads)               │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │ 1. mutate                     │ 2. enqueue
//!                ▼                               ▼
//!         ┌─────────────┐               ┌─────────────────┐
//!         │  KeyStore   │               │  bounded queue  │
//!         │  (RwLock)   │               │   (cap = 16)    │
//!         └──────▲──────┘               └────────┬────────┘
//!                │                               │
//!                │ replay at startup             ▼
//!                │                      ┌─────────────────┐
//!                └──────────────────────│  writer thread  │
//!                                       │ file | sqlite   │
//!                                       └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod wal;
pub mod service;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use service::KvService;
pub use store::KeyStore;
pub use wal::{Event, EventType, TransactionLog};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
