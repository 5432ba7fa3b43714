extern crate structopt;

use structopt::clap::{arg_enum, AppSettings};
use structopt::StructOpt;

use std::path::PathBuf;
use std::process;

use ycsb_bindings::{Db, FieldSet, Fields, JcrDb, Properties, RedisDb, Status, OK};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ycsb-bind",
    about = "Run single YCSB operations through a database binding.",
    setting = AppSettings::ColoredHelp,
    setting = AppSettings::VersionlessSubcommands,
    setting = AppSettings::DisableHelpSubcommand
)]
struct Opt {
    #[structopt(
        name = "BINDING",
        short = "b",
        long = "binding",
        help = "The database binding.",
        default_value = "redis",
        possible_values = &Binding::variants(),
        case_insensitive = true,
    )]
    binding: Binding,
    #[structopt(
        name = "FILE",
        short = "P",
        help = "Load properties from a file, may be repeated.",
        number_of_values = 1,
        parse(from_os_str),
    )]
    files: Vec<PathBuf>,
    #[structopt(
        name = "NAME=VALUE",
        short = "p",
        help = "Set a property, overrides the property files.",
        number_of_values = 1,
    )]
    props: Vec<String>,
    #[structopt(subcommand)]
    op: Operation,
}

arg_enum! {
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    #[allow(non_camel_case_types)]
    enum Binding {
        redis,
        jcr,
    }
}

#[derive(Debug, StructOpt)]
enum Operation {
    #[structopt(name = "insert", about = "Insert a new record")]
    Insert {
        #[structopt(name = "TABLE")]
        table: String,
        #[structopt(name = "KEY")]
        key: String,
        #[structopt(name = "FIELD=VALUE", parse(try_from_str = parse_field), required = true)]
        values: Vec<(String, String)>,
    },
    #[structopt(name = "read", about = "Read a record, or some of its fields")]
    Read {
        #[structopt(name = "TABLE")]
        table: String,
        #[structopt(name = "KEY")]
        key: String,
        #[structopt(name = "FIELD")]
        fields: Vec<String>,
    },
    #[structopt(name = "update", about = "Overwrite fields of a record")]
    Update {
        #[structopt(name = "TABLE")]
        table: String,
        #[structopt(name = "KEY")]
        key: String,
        #[structopt(name = "FIELD=VALUE", parse(try_from_str = parse_field))]
        values: Vec<(String, String)>,
    },
    #[structopt(name = "delete", about = "Remove a record")]
    Delete {
        #[structopt(name = "TABLE")]
        table: String,
        #[structopt(name = "KEY")]
        key: String,
    },
    #[structopt(name = "scan", about = "Read records in key order from a start key")]
    Scan {
        #[structopt(name = "TABLE")]
        table: String,
        #[structopt(name = "START")]
        start: String,
        #[structopt(name = "COUNT")]
        count: usize,
        #[structopt(name = "FIELD")]
        fields: Vec<String>,
    },
    #[structopt(name = "truncate", about = "Remove every record of a table")]
    Truncate {
        #[structopt(name = "TABLE")]
        table: String,
    },
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.find('=') {
        Some(at) if at > 0 => Ok((s[..at].to_owned(), s[at + 1..].to_owned())),
        _ => Err(format!("expected FIELD=VALUE, got {:?}", s)),
    }
}

fn properties(opt: &Opt) -> ycsb_bindings::Result<Properties> {
    let mut props = Properties::new();
    for file in &opt.files {
        props.load_file(file)?;
    }
    for pair in &opt.props {
        props.set_pair(pair)?;
    }
    Ok(props)
}

fn print_record(record: &Fields) {
    let mut fields: Vec<_> = record.iter().collect();
    fields.sort();
    for (f, v) in fields {
        println!("{}={}", f, v);
    }
}

fn execute(db: &mut dyn Db, op: Operation) -> Status {
    match op {
        Operation::Insert { table, key, values } => {
            db.insert(&table, &key, &values.into_iter().collect())
        }
        Operation::Read { table, key, fields } => {
            let fields: FieldSet = fields.into_iter().collect();
            let mut record = Fields::new();
            let status = db.read(&table, &key, Some(&fields), &mut record);
            if status == OK {
                print_record(&record);
            }
            status
        }
        Operation::Update { table, key, values } => {
            db.update(&table, &key, &values.into_iter().collect())
        }
        Operation::Delete { table, key } => db.delete(&table, &key),
        Operation::Scan {
            table,
            start,
            count,
            fields,
        } => {
            let fields: FieldSet = fields.into_iter().collect();
            let mut records = Vec::new();
            let status = db.scan(&table, &start, count, Some(&fields), &mut records);
            if status == OK {
                for (i, record) in records.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    print_record(record);
                }
            }
            status
        }
        Operation::Truncate { table } => db.truncate(&table),
    }
}

fn run(opt: Opt) -> Status {
    let props = match properties(&opt) {
        Ok(props) => props,
        Err(e) => {
            eprintln!("Error: bad properties: {}.", e);
            return 1;
        }
    };

    let connected = match opt.binding {
        Binding::redis => RedisDb::from_properties(&props, None)
            .map(|db| (Box::new(db) as Box<dyn Db>, None)),
        Binding::jcr => {
            JcrDb::open(&props, None).map(|(db, repo)| (Box::new(db) as Box<dyn Db>, Some(repo)))
        }
    };
    let (mut db, _repo) = match connected {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Error: cannot initialize {} binding: {}.", opt.binding, e);
            return 1;
        }
    };

    let status = execute(db.as_mut(), opt.op);
    if let Err(e) = db.cleanup() {
        eprintln!("Error: cleanup failed: {}.", e);
        return 1;
    }
    status
}

fn main() {
    let opt = Opt::from_args();
    // run drops the bindings and their loggers before exiting
    let status = run(opt);
    process::exit(status);
}
