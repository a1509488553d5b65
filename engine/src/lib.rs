//! # Ferrite Engine
//!
//! An embedded storage-engine front-end for host-language bindings.
//!
//! Ferrite wraps the libSQL kernel with the lifecycle logic a dynamic
//! host language needs: connections to local (optionally encrypted)
//! database files, serialized transactions, transparent replication
//! against a remote primary, and a C-compatible boundary that can never
//! crash the host process.
//!
//! ## Design Principles
//!
//! - **The boundary never crashes**: every native error becomes the
//!   failure sentinel of the wire shape the function returns
//! - **Handles are tokens, not addresses**: resources live in an
//!   engine-owned registry with generation checks, so stale and
//!   double-freed handles are rejected instead of undefined behavior
//! - **Synchronous at the surface**: each boundary call blocks until the
//!   kernel operation completes; async I/O stays inside
//! - **Materialized results**: query results cross the boundary as one
//!   self-describing JSON payload, never as streams
//!
//! ## Core Concepts
//!
//! ### Connections
//!
//! [`Connection::open_local`] opens or creates a single database file,
//! optionally encrypted at rest. Queries bind positional parameters and
//! return a fully materialized [`ResultSet`]; mutations return their
//! affected-row count.
//!
//! ### Transactions
//!
//! [`Connection::begin`] hands out at most one open [`Transaction`] per
//! connection. A transaction is Open until commit or rollback makes it
//! terminal; terminal transactions reject further work cleanly.
//!
//! ### Replicas
//!
//! [`Replica::connect`] pairs a local replica file with a remote
//! primary. Sync runs on demand or on a background interval; with
//! read-your-writes enabled, reads observe the replica's own committed
//! writes even before sync catches up.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrite_engine::{Connection, OpenMode, Value};
//!
//! let conn = Connection::open_local(":memory:", OpenMode::default(), None).unwrap();
//! conn.exec("CREATE TABLE users (email TEXT)", vec![]).unwrap();
//! conn.exec(
//!     "INSERT INTO users VALUES (?1)",
//!     vec![Value::Text("alice@example.org".to_string())],
//! )
//! .unwrap();
//!
//! let set = conn.query("SELECT email FROM users", vec![]).unwrap();
//! assert_eq!(set.row_count(), 1);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module provides the C-compatible surface for host
//! languages. Handles cross as opaque 64-bit tokens, results as owned
//! JSON strings or boxed integers, and every pointer-returning function
//! documents null as its failure value.

pub mod connection;
pub mod encode;
pub mod error;
pub mod ffi;
pub mod registry;
pub mod replica;
pub mod runtime;
pub mod transaction;

// Re-export main types at crate root
pub use connection::{Connection, OpenMode};
pub use encode::{CellValue, ResultSet};
pub use error::Error;
pub use registry::{RawHandle, Resource};
pub use replica::Replica;
pub use transaction::{Behavior, Transaction, TrxStatus};

// The kernel's value type is the engine's parameter type
pub use libsql::Value;
