use slog::Logger;

use std::collections::{HashMap, HashSet};

use crate::{Error, Result};

/// A record: field name to value.
pub type Fields = HashMap<String, String>;
/// Names of the fields a read or scan should return.
pub type FieldSet = HashSet<String>;
/// Outcome of an operation as seen by the harness.
pub type Status = i32;

/// The operation succeeded.
pub const OK: Status = 0;
/// The operation failed, the reason is in the adapter's log.
pub const ERROR: Status = 1;

/// The contract every binding offers to the benchmark harness.
///
/// The harness creates one instance per worker thread. Operations never fail
/// loudly: every backend error is logged and turned into a nonzero status.
pub trait Db {
    /// Insert a new record made of `values`.
    /// Fails if a record already exists under `key`.
    fn insert(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    /// Read a record into `result`.
    /// `None` or an empty set selects every field; otherwise each requested
    /// field must exist.
    fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&FieldSet>,
        result: &mut Fields,
    ) -> Status;

    /// Overwrite the given fields of an existing record, leaving the others
    /// untouched.
    fn update(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    /// Remove an existing record. Removing an absent record is an error.
    fn delete(&mut self, table: &str, key: &str) -> Status;

    /// Remove every record of a table.
    fn truncate(&mut self, table: &str) -> Status;

    /// Read up to `count` records starting at `start_key`.
    fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<Fields>,
    ) -> Status;

    /// Flush what is pending and release the connection.
    /// The adapter cannot be used afterwards.
    fn cleanup(&mut self) -> Result<()>;
}

/// `None` when every field is wanted.
pub(crate) fn selection(fields: Option<&FieldSet>) -> Option<&FieldSet> {
    fields.filter(|f| !f.is_empty())
}

pub(crate) fn status(log: &Logger, op: &str, res: Result<()>) -> Status {
    let e = match res {
        Ok(()) => return OK,
        Err(e) => e,
    };
    match e.downcast_ref::<Error>() {
        Some(Error::NotFound(_)) | Some(Error::Conflict(_)) => {
            debug!(log, "{} failed: {}", op, e);
        }
        Some(Error::Unsupported(_)) => {
            warn!(log, "{} failed: {}", op, e);
        }
        _ => {
            error!(log, "{} failed: {}", op, e);
        }
    }
    ERROR
}
