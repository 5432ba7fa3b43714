//! RESP, the Redis serialization protocol.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io::{self, BufRead, Read};
use std::str;

use crate::Result;

/// Proto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proto {
    /// Array
    Seq(Vec<Proto>),
    /// Simple string
    Str(String),
    /// Error
    Err(String),
    /// Integer
    Int(i64),
    /// Binary
    Bulk(Vec<u8>),
    /// Null bulk string or null array
    Null,
}

const CRLF: &[u8; 2] = b"\r\n";
// Redis refuses bulk strings above 512 MB
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 4 * 1024 * 1024;
const MAX_DEPTH: usize = 32;
const PREALLOC: usize = 4096;

impl Proto {
    /// A request: an array of bulk strings.
    pub fn command<S: AsRef<str>>(args: &[S]) -> Proto {
        Proto::Seq(
            args.iter()
                .map(|a| Proto::Bulk(Vec::from(a.as_ref())))
                .collect(),
        )
    }

    /// Str and Err should not contain CR or LF.
    pub fn ser(&self) -> Vec<u8> {
        let mut res = Vec::new();
        self.ser_into(&mut res);
        res
    }

    fn ser_into(&self, res: &mut Vec<u8>) {
        match self {
            Proto::Str(s) => {
                res.push(b'+');
                res.extend_from_slice(s.as_bytes());
            }
            Proto::Err(e) => {
                res.push(b'-');
                res.extend_from_slice(e.as_bytes());
            }
            Proto::Int(n) => {
                res.push(b':');
                res.extend_from_slice(n.to_string().as_bytes());
            }
            Proto::Bulk(s) => {
                res.push(b'$');
                res.extend_from_slice(s.len().to_string().as_bytes());
                res.extend_from_slice(CRLF);
                res.extend_from_slice(s);
            }
            Proto::Null => {
                res.extend_from_slice(b"$-1");
            }
            Proto::Seq(v) => {
                res.push(b'*');
                res.extend_from_slice(v.len().to_string().as_bytes());
                res.extend_from_slice(CRLF);
                for item in v {
                    item.ser_into(res);
                }
                return;
            }
        }
        res.extend_from_slice(CRLF);
    }

    /// from BufRead
    pub fn from_bufread(rdr: &mut impl BufRead) -> Result<Proto> {
        read_item(rdr, 0)
    }
}

fn read_item<R: BufRead>(rdr: &mut R, depth: usize) -> Result<Proto> {
    let mut prefix = [0; 1];
    rdr.read_exact(&mut prefix)?;
    match prefix[0] {
        b'+' => Ok(Proto::Str(read_line(rdr)?)),
        b'-' => Ok(Proto::Err(read_line(rdr)?)),
        b':' => Ok(Proto::Int(parse_len(&read_line(rdr)?)?)),
        b'$' => {
            let n = parse_len(&read_line(rdr)?)?;
            if n <= -1 {
                return Ok(Proto::Null);
            }
            if n > MAX_BULK_LEN {
                Err(ProtoError::TooLong(n))?;
            }
            let n = n as usize;
            // grows as bytes arrive, the length is not trusted up front
            let mut buf = Vec::with_capacity(n.min(PREALLOC));
            (&mut *rdr).take(n as u64).read_to_end(&mut buf)?;
            if buf.len() != n {
                Err(io::Error::from(io::ErrorKind::UnexpectedEof))?;
            }
            let mut crlf = [0; 2];
            rdr.read_exact(&mut crlf)?;
            if &crlf != CRLF {
                Err(ProtoError::MissingCrlf)?;
            }
            Ok(Proto::Bulk(buf))
        }
        b'*' => {
            let n = parse_len(&read_line(rdr)?)?;
            if n <= -1 {
                return Ok(Proto::Null);
            }
            if n > MAX_ARRAY_LEN {
                Err(ProtoError::TooLong(n))?;
            }
            if depth >= MAX_DEPTH {
                Err(ProtoError::TooDeep)?;
            }
            let mut items = Vec::with_capacity((n as usize).min(PREALLOC));
            for _ in 0..n {
                items.push(read_item(rdr, depth + 1)?);
            }
            Ok(Proto::Seq(items))
        }
        x => Err(ProtoError::InvalidPrefix(x))?,
    }
}

fn read_line(rdr: &mut impl BufRead) -> Result<String> {
    let mut buf = Vec::new();
    rdr.read_until(b'\n', &mut buf)?;
    if !buf.ends_with(CRLF) {
        Err(ProtoError::MissingCrlf)?;
    }
    buf.truncate(buf.len() - 2);
    Ok(str::from_utf8(&buf)?.to_owned())
}

fn parse_len(s: &str) -> Result<i64> {
    match s.parse() {
        Ok(n) => Ok(n),
        Err(_) => Err(ProtoError::BadNumber(s.to_owned()))?,
    }
}

/// ProtoError
#[derive(Debug)]
pub enum ProtoError {
    /// Invalid prefix
    InvalidPrefix(u8),
    /// Length or integer that does not parse
    BadNumber(String),
    /// Item not terminated by CRLF
    MissingCrlf,
    /// Bulk string or array length above the accepted maximum
    TooLong(i64),
    /// Arrays nested too deep
    TooDeep,
}

impl Display for ProtoError {
    fn fmt(&self, f: &mut Formatter) -> std::result::Result<(), fmt::Error> {
        match self {
            ProtoError::InvalidPrefix(x) => write!(f, "invalid prefix: {:x?}", x),
            ProtoError::BadNumber(s) => write!(f, "bad number: {:?}", s),
            ProtoError::MissingCrlf => write!(f, "item not terminated by CRLF"),
            ProtoError::TooLong(n) => write!(f, "length too large: {}", n),
            ProtoError::TooDeep => write!(f, "arrays nested deeper than {}", MAX_DEPTH),
        }
    }
}

impl StdError for ProtoError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        None
    }
}
