//! A blocking RESP client for Redis-compatible servers.

use slog::Logger;

use std::io::{prelude::*, BufReader};
use std::net::TcpStream;

use crate::protocol::Proto;
use crate::redis::{Command, KvBackend};
use crate::{get_logger, Error, Fields, Result};

/// One connection to a Redis-compatible server.
pub struct RespClient {
    rdr: BufReader<TcpStream>,
    log: Logger,
}

impl RespClient {
    /// Connect to `host:port`.
    pub fn connect<LOG>(host: &str, port: u16, log: LOG) -> Result<RespClient>
    where
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into());
        let stream = match TcpStream::connect((host, port)) {
            Ok(s) => s,
            Err(e) => {
                return Err(Error::Connection(format!(
                    "failed to connect to {}:{}: {}",
                    host, port, e
                )))?;
            }
        };
        stream.set_nodelay(true)?;
        let log = log.new(o!("server" => format!("{}:{}", host, port)));
        debug!(log, "connected");
        Ok(Self {
            rdr: BufReader::new(stream),
            log,
        })
    }

    /// Send one command and wait for its reply.
    /// An error reply becomes `Error::Protocol`.
    pub fn request<S: AsRef<str>>(&mut self, args: &[S]) -> Result<Proto> {
        let req = Proto::command(args);
        self.rdr.get_mut().write_all(&req.ser())?;
        match Proto::from_bufread(&mut self.rdr)? {
            Proto::Err(e) => Err(Error::Protocol(e))?,
            resp => Ok(resp),
        }
    }

    /// Authenticate.
    pub fn auth(&mut self, password: &str) -> Result<()> {
        let resp = self.request(&["AUTH", password])?;
        expect_ok(resp)
    }

    /// Switch to another database.
    pub fn select(&mut self, db: i64) -> Result<()> {
        let db = db.to_string();
        let resp = self.request(&["SELECT", db.as_str()])?;
        expect_ok(resp)
    }

    fn discard(&mut self) {
        if let Err(e) = self.request(&["DISCARD"]) {
            error!(self.log, "failed to discard transaction: {}", e);
        }
    }
}

impl KvBackend for RespClient {
    fn exists(&mut self, key: &str) -> Result<bool> {
        let n = int(self.request(&["EXISTS", key])?)?;
        Ok(n > 0)
    }

    fn hgetall(&mut self, key: &str) -> Result<Fields> {
        let items = strings(self.request(&["HGETALL", key])?)?;
        if items.len() % 2 != 0 {
            return Err(Error::Protocol(format!(
                "odd number of items in HGETALL reply: {}",
                items.len()
            )))?;
        }
        let mut fields = Fields::with_capacity(items.len() / 2);
        let mut items = items.into_iter();
        while let (Some(f), Some(v)) = (items.next(), items.next()) {
            fields.insert(f, v);
        }
        Ok(fields)
    }

    fn hmget(&mut self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        let mut args = Vec::with_capacity(fields.len() + 2);
        args.push("HMGET");
        args.push(key);
        args.extend_from_slice(fields);
        match self.request(&args)? {
            Proto::Seq(items) => items.into_iter().map(opt_string).collect(),
            item => Err(unexpected(item)),
        }
    }

    fn zrange_by_lex(&mut self, key: &str, start: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let min = format!("[{}", start);
        let count = count.to_string();
        strings(self.request(&[
            "ZRANGEBYLEX",
            key,
            min.as_str(),
            "+",
            "LIMIT",
            "0",
            count.as_str(),
        ])?)
    }

    fn zrange_all(&mut self, key: &str) -> Result<Vec<String>> {
        strings(self.request(&["ZRANGE", key, "0", "-1"])?)
    }

    fn watch(&mut self, keys: &[&str]) -> Result<()> {
        let mut args = vec!["WATCH"];
        args.extend_from_slice(keys);
        let resp = self.request(&args)?;
        expect_ok(resp)
    }

    fn unwatch(&mut self) -> Result<()> {
        let resp = self.request(&["UNWATCH"])?;
        expect_ok(resp)
    }

    fn exec(&mut self, cmds: &[Command]) -> Result<Option<Vec<i64>>> {
        expect_ok(self.request(&["MULTI"])?)?;
        for cmd in cmds {
            match self.request(&cmd.args()) {
                Ok(Proto::Str(ref s)) if s == "QUEUED" => {}
                Ok(item) => {
                    self.discard();
                    return Err(unexpected(item));
                }
                Err(e) => {
                    self.discard();
                    return Err(e);
                }
            }
        }
        match self.request(&["EXEC"])? {
            Proto::Null => Ok(None),
            Proto::Seq(items) => items
                .into_iter()
                .map(|item| -> Result<i64> {
                    match item {
                        Proto::Int(n) => Ok(n),
                        Proto::Err(e) => Err(Error::Protocol(e).into()),
                        item => Err(unexpected(item)),
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            item => Err(unexpected(item)),
        }
    }

    fn quit(&mut self) -> Result<()> {
        let resp = self.request(&["QUIT"])?;
        debug!(self.log, "disconnected");
        expect_ok(resp)
    }
}

fn unexpected(item: Proto) -> failure::Error {
    Error::Protocol(format!("unexpected reply: {:?}", item)).into()
}

fn expect_ok(resp: Proto) -> Result<()> {
    match resp {
        Proto::Str(_) => Ok(()),
        item => Err(unexpected(item)),
    }
}

fn int(resp: Proto) -> Result<i64> {
    match resp {
        Proto::Int(n) => Ok(n),
        item => Err(unexpected(item)),
    }
}

fn opt_string(item: Proto) -> Result<Option<String>> {
    match item {
        Proto::Bulk(v) => Ok(Some(String::from_utf8(v)?)),
        Proto::Null => Ok(None),
        item => Err(unexpected(item)),
    }
}

fn strings(resp: Proto) -> Result<Vec<String>> {
    match resp {
        Proto::Seq(items) => items
            .into_iter()
            .map(|item| -> Result<String> {
                match opt_string(item)? {
                    Some(s) => Ok(s),
                    None => Err(Error::Protocol("null item in array reply".to_owned()).into()),
                }
            })
            .collect(),
        item => Err(unexpected(item)),
    }
}
