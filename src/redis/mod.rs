//! Redis binding.
//!
//! A record is a hash stored at `<table>:<key>`. Every table also keeps a
//! sorted set `__index__:<table>` holding its record keys with score 0, so
//! that `ZRANGEBYLEX` yields them in key order for scans. Record and index
//! are always written inside the same `MULTI`/`EXEC` transaction.

mod backend;

use serde_derive::Deserialize;
use slog::Logger;

pub use backend::{Command, KvBackend};

use crate::client::RespClient;
use crate::db::{selection, status};
use crate::properties::{flag, number};
use crate::{get_logger, Db, Error, FieldSet, Fields, Properties, Result, Status};

const INDEX: &str = "__index__";
const TRUNCATE_ATTEMPTS: usize = 16;

/// Port used when neither `redis.port` nor `redis.host` names one.
pub const DEFAULT_PORT: u16 = 6379;

/// Settings read from the `redis.*` properties.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedisConfig {
    /// `redis.host`, may carry a port as `host:port`.
    #[serde(default = "default_host")]
    pub host: String,
    /// `redis.port`
    #[serde(default = "default_port", deserialize_with = "number")]
    pub port: u16,
    /// `redis.password`, sent with `AUTH` when present.
    #[serde(default)]
    pub password: Option<String>,
    /// `redis.db`, the database to `SELECT`.
    #[serde(default, deserialize_with = "number")]
    pub db: i64,
    /// `redis.properties`, echo the configuration at start-up.
    #[serde(default, rename = "properties", deserialize_with = "flag")]
    pub verbose: bool,
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            password: None,
            db: 0,
            verbose: false,
        }
    }
}

impl RedisConfig {
    /// Read the `redis.*` properties.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let mut config: RedisConfig = props.deserialize("redis.")?;
        let (host, port) = split_host_port(&config.host)?;
        config.host = host;
        if let Some(port) = port {
            config.port = port;
        }
        Ok(config)
    }

    /// Print the configuration to stdout.
    pub fn print(&self) {
        println!();
        println!("Redis driver properties:");
        println!("  redis.host:     {}", self.host);
        println!("  redis.port:     {}", self.port);
        println!("  redis.db:       {}", self.db);
        println!(
            "  redis.password: {}",
            if self.password.is_some() { "(set)" } else { "(none)" }
        );
    }
}

/// Split `host:port` or `[v6addr]:port`. A bare IPv6 address carries no port.
fn split_host_port(host: &str) -> Result<(String, Option<u16>)> {
    let (name, port) = if host.starts_with('[') {
        let end = match host.find(']') {
            Some(end) => end,
            None => return Err(Error::Config(format!("bad redis.host: {:?}", host)))?,
        };
        match &host[end + 1..] {
            "" => (&host[1..end], None),
            rest if rest.starts_with(':') => (&host[1..end], Some(&rest[1..])),
            _ => return Err(Error::Config(format!("bad redis.host: {:?}", host)))?,
        }
    } else {
        match host.rfind(':') {
            Some(at) if !host[..at].contains(':') => (&host[..at], Some(&host[at + 1..])),
            _ => (host, None),
        }
    };
    let port = match port.map(str::parse::<u16>) {
        None => None,
        Some(Ok(port)) => Some(port),
        Some(Err(_)) => {
            return Err(Error::Config(format!("bad port in redis.host: {:?}", host)))?;
        }
    };
    Ok((name.to_owned(), port))
}

/// Keys of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    index: String,
}

impl Table {
    /// Tables need no round trip: they exist as soon as a record is written.
    pub fn resolve(name: &str) -> Table {
        Table {
            name: name.to_owned(),
            index: format!("{}:{}", INDEX, name),
        }
    }

    /// The key of a record of this table.
    pub fn record(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }

    /// The sorted set ordering the records of this table.
    pub fn index(&self) -> &str {
        &self.index
    }
}

/// The redis binding. Owns one connection.
pub struct RedisDb<C: KvBackend = RespClient> {
    conn: Option<C>,
    log: Logger,
}

impl RedisDb<RespClient> {
    /// Connect, authenticate and select the configured database.
    pub fn connect<LOG>(config: &RedisConfig, log: LOG) -> Result<Self>
    where
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into()).new(o!("binding" => "redis"));
        let mut client = RespClient::connect(&config.host, config.port, log.clone())?;
        if let Err(e) = handshake(&mut client, config) {
            drop(client);
            return Err(Error::Connection(e.to_string()))?;
        }
        Ok(Self::with_backend(client, log))
    }

    /// Read the configuration from `props` and connect.
    pub fn from_properties<LOG>(props: &Properties, log: LOG) -> Result<Self>
    where
        LOG: Into<Option<Logger>>,
    {
        let config = RedisConfig::from_properties(props)?;
        if config.verbose {
            config.print();
        }
        Self::connect(&config, log)
    }
}

fn handshake(client: &mut RespClient, config: &RedisConfig) -> Result<()> {
    if let Some(ref password) = config.password {
        client.auth(password)?;
    }
    if config.db != 0 {
        client.select(config.db)?;
    }
    Ok(())
}

impl<C: KvBackend> RedisDb<C> {
    /// Wrap an established connection.
    pub fn with_backend<LOG>(conn: C, log: LOG) -> Self
    where
        LOG: Into<Option<Logger>>,
    {
        Self {
            conn: Some(conn),
            log: get_logger(&mut log.into()),
        }
    }

    fn conn(&mut self) -> Result<&mut C> {
        match self.conn {
            Some(ref mut conn) => Ok(conn),
            None => Err(Error::Connection("not connected".to_owned()))?,
        }
    }

    fn insert_record(&mut self, table: &str, key: &str, values: &Fields) -> Result<()> {
        if values.is_empty() {
            return Err(Error::Unsupported("record without fields".to_owned()))?;
        }
        let table = Table::resolve(table);
        let rkey = table.record(key);
        let conn = self.conn()?;
        conn.watch(&[rkey.as_str()])?;
        if conn.exists(&rkey)? {
            conn.unwatch()?;
            return Err(Error::Conflict(rkey))?;
        }
        let cmds = [
            Command::hset(&rkey, values),
            Command::ZAdd(table.index().to_owned(), rkey.clone()),
        ];
        match conn.exec(&cmds)? {
            Some(_) => Ok(()),
            None => Err(Error::Conflict(rkey))?,
        }
    }

    fn read_record(&mut self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields> {
        let rkey = Table::resolve(table).record(key);
        let conn = self.conn()?;
        let names = match selection(fields) {
            None => {
                let record = conn.hgetall(&rkey)?;
                if record.is_empty() {
                    return Err(Error::NotFound(rkey))?;
                }
                return Ok(record);
            }
            Some(fields) => fields.iter().map(String::as_str).collect::<Vec<_>>(),
        };
        let values = conn.hmget(&rkey, &names)?;
        let mut record = Fields::with_capacity(names.len());
        for (name, value) in names.into_iter().zip(values) {
            match value {
                Some(v) => {
                    record.insert(name.to_owned(), v);
                }
                None => return Err(Error::NotFound(format!("{} field {}", rkey, name)))?,
            }
        }
        Ok(record)
    }

    fn update_record(&mut self, table: &str, key: &str, values: &Fields) -> Result<()> {
        let rkey = Table::resolve(table).record(key);
        let conn = self.conn()?;
        conn.watch(&[rkey.as_str()])?;
        if !conn.exists(&rkey)? {
            conn.unwatch()?;
            return Err(Error::NotFound(rkey))?;
        }
        if values.is_empty() {
            return conn.unwatch();
        }
        match conn.exec(&[Command::hset(&rkey, values)])? {
            Some(_) => Ok(()),
            None => Err(Error::Conflict(format!("{} changed during update", rkey)))?,
        }
    }

    fn delete_record(&mut self, table: &str, key: &str) -> Result<()> {
        let table = Table::resolve(table);
        let rkey = table.record(key);
        let cmds = [
            Command::Del(vec![rkey.clone()]),
            Command::ZRem(table.index().to_owned(), rkey.clone()),
        ];
        match self.conn()?.exec(&cmds)? {
            Some(ref replies) if replies.first() == Some(&0) => Err(Error::NotFound(rkey))?,
            Some(_) => Ok(()),
            None => Err(Error::Conflict(rkey))?,
        }
    }

    fn truncate_table(&mut self, table: &str) -> Result<()> {
        let table = Table::resolve(table);
        let index = table.index();
        let conn = self.conn()?;
        // The index is watched so that records written meanwhile abort the
        // transaction instead of surviving it unindexed.
        for _ in 0..TRUNCATE_ATTEMPTS {
            conn.watch(&[index])?;
            let mut keys = conn.zrange_all(index)?;
            keys.push(index.to_owned());
            if conn.exec(&[Command::Del(keys)])?.is_some() {
                return Ok(());
            }
        }
        Err(Error::Conflict(format!(
            "table {} kept changing during truncate",
            table.name
        )))?
    }

    fn scan_records(
        &mut self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
    ) -> Result<Vec<Fields>> {
        let table = Table::resolve(table);
        let start = table.record(start_key);
        let names: Option<Vec<&str>> =
            selection(fields).map(|f| f.iter().map(String::as_str).collect());
        let conn = self.conn()?;
        let keys = conn.zrange_by_lex(table.index(), &start, count)?;
        let mut records = Vec::with_capacity(keys.len());
        for rkey in keys.iter() {
            // An empty result means the record vanished after the index was
            // read, unless only the projection came back empty.
            let record: Fields = match names {
                None => conn.hgetall(rkey)?,
                Some(ref names) => names
                    .iter()
                    .zip(conn.hmget(rkey, names)?)
                    .filter_map(|(name, value)| value.map(|v| ((*name).to_owned(), v)))
                    .collect(),
            };
            if !record.is_empty() || (names.is_some() && conn.exists(rkey)?) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl<C: KvBackend> Db for RedisDb<C> {
    fn insert(&mut self, table: &str, key: &str, values: &Fields) -> Status {
        let res = self.insert_record(table, key, values);
        status(&self.log, "insert", res)
    }

    fn read(
        &mut self,
        table: &str,
        key: &str,
        fields: Option<&FieldSet>,
        result: &mut Fields,
    ) -> Status {
        let res = self
            .read_record(table, key, fields)
            .map(|record| result.extend(record));
        status(&self.log, "read", res)
    }

    fn update(&mut self, table: &str, key: &str, values: &Fields) -> Status {
        let res = self.update_record(table, key, values);
        status(&self.log, "update", res)
    }

    fn delete(&mut self, table: &str, key: &str) -> Status {
        let res = self.delete_record(table, key);
        status(&self.log, "delete", res)
    }

    fn truncate(&mut self, table: &str) -> Status {
        let res = self.truncate_table(table);
        status(&self.log, "truncate", res)
    }

    fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<Fields>,
    ) -> Status {
        let res = self
            .scan_records(table, start_key, count, fields)
            .map(|records| result.extend(records));
        status(&self.log, "scan", res)
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => return Ok(()),
        };
        if let Err(e) = conn.quit() {
            error!(self.log, "failed to close connection: {}", e);
            return Err(e);
        }
        Ok(())
    }
}
