//! # querylab — a shell-dialect console for a course-catalog document store
//!
//! querylab parses one-line commands in the familiar
//! `db.collection.method(args)` shell dialect, plans them into a closed
//! set of store operations, and executes them against a pluggable
//! document store.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use querylab::prelude::*;
//!
//! let console = QueryConsole::new(MemoryStore::new());
//! let response = console
//!     .execute(r#"db.courses.find({ price: { $lt: 30 } }).sort({ rating: -1 }).limit(5)"#)
//!     .await;
//! assert!(response.success);
//! ```
//!
//! ## Pipeline
//!
//! | Stage      | Job                                                  |
//! |------------|------------------------------------------------------|
//! | `scan`     | Balanced-span extraction of method and chain calls   |
//! | `sanitize` | `ObjectId(…)`/`new Date(…)` → typed-value markers    |
//! | `parser`   | Relaxed-JSON argument literals → [`ast::Value`]      |
//! | `validate` | Per-collection rules on write payloads               |
//! | `dispatch` | Command → one [`ast::StoreOperation`]                |
//! | `engine`   | Runs the operation, shapes the response              |

pub mod ast;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod parser;
pub mod sanitize;
pub mod scan;
pub mod store;
pub mod validate;

pub mod prelude {
    pub use crate::ast::{ChainCall, ObjectId, ShellCommand, StoreOperation, Value};
    pub use crate::config::Config;
    pub use crate::engine::{QueryConsole, Response};
    pub use crate::error::{ShellError, ShellResult};
    pub use crate::parser::parse;
    pub use crate::store::{DocumentStore, MemoryStore, StoreError};
}

/// Parse one console line into a command, without executing it.
///
/// # Example
///
/// ```
/// let cmd = querylab::parse(r#"db.courses.find({ level: "beginner" })"#).unwrap();
/// assert_eq!(cmd.collection, "courses");
/// assert_eq!(cmd.method, "find");
/// ```
pub fn parse(line: &str) -> error::ShellResult<ast::ShellCommand> {
    parser::parse(line)
}
