#![deny(missing_docs)]
//! Database bindings for the YCSB benchmark harness.
//!
//! Two bindings implement the [`Db`] contract: [`RedisDb`] drives a
//! Redis-compatible server over RESP, [`JcrDb`] drives a content repository
//! through a node-tree [`Session`](jcr::Session).

#[macro_use]
extern crate slog;
extern crate failure;

use failure::Error as FailError;
use slog::{Drain, Logger};

mod db;
mod error;

pub mod client;
pub mod jcr;
pub mod properties;
pub mod protocol;
pub mod redis;

/// Bindings Result
pub type Result<T> = std::result::Result<T, FailError>;

pub use db::{Db, FieldSet, Fields, Status, ERROR, OK};
pub use error::Error;
pub use jcr::JcrDb;
pub use properties::Properties;
pub use redis::RedisDb;

/// Return the logger in `log`, installing the default terminal logger first
/// if there is none.
pub fn get_logger(log: &mut Option<Logger>) -> Logger {
    log.get_or_insert_with(|| {
        let decorator = slog_term::TermDecorator::new().stderr().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        Logger::root(drain, o!())
    })
    .clone()
}
