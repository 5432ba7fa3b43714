use slog::{o, Logger};

use std::io::{BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use ycsb_bindings::protocol::Proto;
use ycsb_bindings::redis::RedisConfig;
use ycsb_bindings::{Db, FieldSet, Fields, RedisDb, ERROR, OK};

type Script = Vec<(Vec<&'static str>, &'static str)>;

fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

// Serve one connection: every request must match the script, in order.
fn serve(script: Script) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut rdr = BufReader::new(stream);
        for (request, reply) in script {
            let got = Proto::from_bufread(&mut rdr).unwrap();
            assert_eq!(got, Proto::command(&request[..]));
            rdr.get_mut().write_all(reply.as_bytes()).unwrap();
        }
    });
    (port, handle)
}

fn connect(port: u16, password: Option<&str>, db: i64) -> RedisDb {
    let config = RedisConfig {
        host: "127.0.0.1".to_owned(),
        port,
        password: password.map(str::to_owned),
        db,
        verbose: false,
    };
    RedisDb::connect(&config, discard()).unwrap()
}

fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_string()))
        .collect()
}

#[test]
fn handshake_and_insert() {
    let (port, server) = serve(vec![
        (vec!["AUTH", "secret"], "+OK\r\n"),
        (vec!["SELECT", "2"], "+OK\r\n"),
        (vec!["WATCH", "usertable:user1"], "+OK\r\n"),
        (vec!["EXISTS", "usertable:user1"], ":0\r\n"),
        (vec!["MULTI"], "+OK\r\n"),
        (
            vec!["HSET", "usertable:user1", "name", "alice"],
            "+QUEUED\r\n",
        ),
        (
            vec!["ZADD", "__index__:usertable", "0", "usertable:user1"],
            "+QUEUED\r\n",
        ),
        (vec!["EXEC"], "*2\r\n:1\r\n:1\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, Some("secret"), 2);
    assert_eq!(db.insert("usertable", "user1", &fields(&[("name", "alice")])), OK);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn insert_of_existing_record_unwatches() {
    let (port, server) = serve(vec![
        (vec!["WATCH", "t:k"], "+OK\r\n"),
        (vec!["EXISTS", "t:k"], ":1\r\n"),
        (vec!["UNWATCH"], "+OK\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    assert_eq!(db.insert("t", "k", &fields(&[("f", "v")])), ERROR);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn aborted_transaction_is_an_error() {
    let (port, server) = serve(vec![
        (vec!["WATCH", "t:k"], "+OK\r\n"),
        (vec!["EXISTS", "t:k"], ":1\r\n"),
        (vec!["MULTI"], "+OK\r\n"),
        (vec!["HSET", "t:k", "f", "v"], "+QUEUED\r\n"),
        (vec!["EXEC"], "*-1\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    assert_eq!(db.update("t", "k", &fields(&[("f", "v")])), ERROR);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn read_all_and_selected_fields() {
    let (port, server) = serve(vec![
        (
            vec!["HGETALL", "t:k"],
            "*4\r\n$4\r\nname\r\n$5\r\nalice\r\n$3\r\nage\r\n$2\r\n30\r\n",
        ),
        (vec!["HMGET", "t:k", "age"], "*1\r\n$2\r\n30\r\n"),
        (vec!["HMGET", "t:k", "zip"], "*1\r\n$-1\r\n"),
        (vec!["HGETALL", "t:nobody"], "*0\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);

    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", None, &mut out), OK);
    assert_eq!(out, fields(&[("name", "alice"), ("age", "30")]));

    let age: FieldSet = vec!["age".to_owned()].into_iter().collect();
    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", Some(&age), &mut out), OK);
    assert_eq!(out, fields(&[("age", "30")]));

    let zip: FieldSet = vec!["zip".to_owned()].into_iter().collect();
    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", Some(&zip), &mut out), ERROR);
    assert!(out.is_empty());
    assert_eq!(db.read("t", "nobody", None, &mut out), ERROR);

    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn scan_reads_index_then_records() {
    let (port, server) = serve(vec![
        (
            vec!["ZRANGEBYLEX", "__index__:t", "[t:b", "+", "LIMIT", "0", "2"],
            "*2\r\n$3\r\nt:b\r\n$3\r\nt:c\r\n",
        ),
        (vec!["HGETALL", "t:b"], "*2\r\n$1\r\nf\r\n$1\r\n2\r\n"),
        (vec!["HGETALL", "t:c"], "*0\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    let mut out = Vec::new();
    assert_eq!(db.scan("t", "b", 2, None, &mut out), OK);
    assert_eq!(out, vec![fields(&[("f", "2")])]);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn delete_of_missing_record() {
    let (port, server) = serve(vec![
        (vec!["MULTI"], "+OK\r\n"),
        (vec!["DEL", "t:k"], "+QUEUED\r\n"),
        (vec!["ZREM", "__index__:t", "t:k"], "+QUEUED\r\n"),
        (vec!["EXEC"], "*2\r\n:0\r\n:0\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    assert_eq!(db.delete("t", "k"), ERROR);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn error_reply_fails_the_operation() {
    let (port, server) = serve(vec![
        (
            vec!["HGETALL", "t:k"],
            "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n",
        ),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", None, &mut out), ERROR);
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn rejected_password_fails_to_connect() {
    let (port, server) = serve(vec![(
        vec!["AUTH", "wrong"],
        "-ERR invalid password\r\n",
    )]);
    let config = RedisConfig {
        host: "127.0.0.1".to_owned(),
        port,
        password: Some("wrong".to_owned()),
        ..RedisConfig::default()
    };
    assert!(RedisDb::connect(&config, discard()).is_err());
    server.join().unwrap();
}

#[test]
fn nothing_listening_fails_to_connect() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = RedisConfig {
        host: "127.0.0.1".to_owned(),
        port,
        ..RedisConfig::default()
    };
    assert!(RedisDb::connect(&config, discard()).is_err());
}

#[test]
fn failed_queued_command_discards_and_connection_stays_usable() {
    let (port, server) = serve(vec![
        (vec!["WATCH", "t:k"], "+OK\r\n"),
        (vec!["EXISTS", "t:k"], ":0\r\n"),
        (vec!["MULTI"], "+OK\r\n"),
        (
            vec!["HSET", "t:k", "f", "v"],
            "-ERR wrong number of arguments for 'hset' command\r\n",
        ),
        (vec!["DISCARD"], "+OK\r\n"),
        (vec!["WATCH", "t:j"], "+OK\r\n"),
        (vec!["EXISTS", "t:j"], ":1\r\n"),
        (vec!["MULTI"], "+OK\r\n"),
        (vec!["HSET", "t:j", "f", "v"], ":1\r\n"),
        (vec!["DISCARD"], "+OK\r\n"),
        (vec!["HGETALL", "t:j"], "*2\r\n$1\r\nf\r\n$1\r\nw\r\n"),
        (vec!["QUIT"], "+OK\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    assert_eq!(db.insert("t", "k", &fields(&[("f", "v")])), ERROR);
    assert_eq!(db.update("t", "j", &fields(&[("f", "v")])), ERROR);
    let mut out = Fields::new();
    assert_eq!(db.read("t", "j", None, &mut out), OK);
    assert_eq!(out, fields(&[("f", "w")]));
    db.cleanup().unwrap();
    server.join().unwrap();
}

#[test]
fn bulk_without_crlf_fails_the_operation() {
    let (port, server) = serve(vec![(vec!["HGETALL", "t:k"], "*2\r\n$1\r\nf\r\n$1\r\nvXY")]);
    let mut db = connect(port, None, 0);
    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", None, &mut out), ERROR);
    assert!(out.is_empty());
    drop(db);
    server.join().unwrap();
}

#[test]
fn oversized_reply_lengths_fail_the_operation() {
    let (port, server) = serve(vec![
        (vec!["HGETALL", "t:k"], "*9223372036854775000\r\n"),
    ]);
    let mut db = connect(port, None, 0);
    let mut out = Fields::new();
    assert_eq!(db.read("t", "k", None, &mut out), ERROR);
    drop(db);
    server.join().unwrap();

    let (port, server) = serve(vec![(
        vec!["ZRANGEBYLEX", "__index__:t", "[t:a", "+", "LIMIT", "0", "1"],
        "*1\r\n$9223372036854775000\r\n",
    )]);
    let mut db = connect(port, None, 0);
    let mut rows = Vec::new();
    assert_eq!(db.scan("t", "a", 1, None, &mut rows), ERROR);
    assert!(rows.is_empty());
    drop(db);
    server.join().unwrap();
}
