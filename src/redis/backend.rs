use crate::{Fields, Result};

/// A write queued inside a `MULTI`/`EXEC` transaction.
/// Every one of them replies with an integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set hash fields: `HSET key field value [field value ...]`.
    HSet(String, Vec<(String, String)>),
    /// Add a member to a sorted set with score 0.
    ZAdd(String, String),
    /// Remove a member from a sorted set.
    ZRem(String, String),
    /// Delete keys.
    Del(Vec<String>),
}

impl Command {
    /// The command as RESP arguments.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Command::HSet(key, fields) => {
                let mut args = Vec::with_capacity(2 + 2 * fields.len());
                args.push("HSET");
                args.push(key.as_str());
                for (f, v) in fields {
                    args.push(f.as_str());
                    args.push(v.as_str());
                }
                args
            }
            Command::ZAdd(key, member) => vec!["ZADD", key.as_str(), "0", member.as_str()],
            Command::ZRem(key, member) => vec!["ZREM", key.as_str(), member.as_str()],
            Command::Del(keys) => {
                let mut args = vec!["DEL"];
                args.extend(keys.iter().map(String::as_str));
                args
            }
        }
    }

    pub(crate) fn hset(key: &str, values: &Fields) -> Command {
        let fields = values
            .iter()
            .map(|(f, v)| (f.to_owned(), v.to_owned()))
            .collect();
        Command::HSet(key.to_owned(), fields)
    }
}

/// The key-value client calls the redis binding is built on.
pub trait KvBackend {
    /// Whether `key` exists.
    fn exists(&mut self, key: &str) -> Result<bool>;

    /// Every field of a hash; empty when the key is absent.
    fn hgetall(&mut self, key: &str) -> Result<Fields>;

    /// The given fields of a hash, `None` for the absent ones.
    fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>>;

    /// Up to `count` members of a sorted set, in lexicographic order,
    /// starting at the first member not smaller than `start`.
    fn zrange_by_lex(&mut self, key: &str, start: &str, count: usize) -> Result<Vec<String>>;

    /// Every member of a sorted set.
    fn zrange_all(&mut self, key: &str) -> Result<Vec<String>>;

    /// Abort the next transaction if one of `keys` changes before it runs.
    fn watch(&mut self, keys: &[&str]) -> Result<()>;

    /// Forget every watched key.
    fn unwatch(&mut self) -> Result<()>;

    /// Run `cmds` as one transaction and return their integer replies.
    /// `None` when a watched key changed and nothing was applied.
    fn exec(&mut self, cmds: &[Command]) -> Result<Option<Vec<i64>>>;

    /// Close the connection.
    fn quit(&mut self) -> Result<()>;
}
