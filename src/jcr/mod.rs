//! JCR binding.
//!
//! Records are nodes: `/<database>/<table>/<key>`, one property per field.
//! Content repositories have no ordered range primitive, so `scan` is
//! reported as unsupported.

mod path;
pub mod repository;

use serde_derive::Deserialize;
use slog::Logger;

use std::collections::HashMap;

pub use self::path::NodePath;
pub use self::repository::{SledRepository, SledSession};

use crate::db::{selection, status};
use crate::properties::flag;
use crate::{get_logger, Db, Error, FieldSet, Fields, Properties, Result, Status};

/// Properties with this prefix belong to the repository and are never
/// returned as fields.
pub const RESERVED_PREFIX: &str = "jcr:";
/// Node type property set on every node.
pub const PRIMARY_TYPE: &str = "jcr:primaryType";

/// User name and password for a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Credentials
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }
}

/// A content repository that sessions log into.
pub trait Repository {
    /// Session type.
    type Session: Session;

    /// Open a session on `workspace`.
    fn login(&self, credentials: &Credentials, workspace: &str) -> Result<Self::Session>;
}

/// The node tree of one workspace, as seen by one user.
///
/// Changes are transient until `save`.
pub trait Session {
    /// Whether a node exists at `path`.
    fn has_node(&self, path: &NodePath) -> Result<bool>;

    /// Add an empty node. The parent must exist, the node must not.
    fn add_node(&mut self, path: &NodePath) -> Result<()>;

    /// Every property of a node, `None` when there is no node.
    fn properties(&self, path: &NodePath) -> Result<Option<Fields>>;

    /// Set properties of an existing node.
    fn set_properties(&mut self, path: &NodePath, values: &Fields) -> Result<()>;

    /// Remove a node and everything below it.
    fn remove_node(&mut self, path: &NodePath) -> Result<()>;

    /// Persist the transient changes.
    fn save(&mut self) -> Result<()>;

    /// Whether there are changes `save` would persist.
    fn has_pending_changes(&self) -> bool;

    /// Mark the current state of the transient changes.
    fn savepoint(&self) -> usize;

    /// Undo the transient changes made since `savepoint`. Does nothing if
    /// they were saved in between.
    fn rollback(&mut self, savepoint: usize);

    /// Close the session, dropping unsaved changes.
    fn logout(&mut self) -> Result<()>;
}

/// Settings read from the `jcr.*` properties.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JcrConfig {
    /// `jcr.url`, where the repository lives.
    #[serde(default = "default_url")]
    pub url: String,
    /// `jcr.workspace`
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// `jcr.username`
    #[serde(default = "default_admin")]
    pub username: String,
    /// `jcr.password`
    #[serde(default = "default_admin")]
    pub password: String,
    /// `jcr.database`, name of the node holding the tables.
    #[serde(default = "default_database")]
    pub database: String,
    /// `jcr.writeCommit`, save after every write instead of at cleanup.
    #[serde(default = "default_write_commit", rename = "writeCommit", deserialize_with = "flag")]
    pub write_commit: bool,
    /// `jcr.properties`, echo the configuration at start-up.
    #[serde(default, rename = "properties", deserialize_with = "flag")]
    pub verbose: bool,
}

fn default_url() -> String {
    "file://ycsb-repository".to_owned()
}

fn default_workspace() -> String {
    repository::DEFAULT_WORKSPACE.to_owned()
}

fn default_admin() -> String {
    repository::DEFAULT_ADMIN.to_owned()
}

fn default_database() -> String {
    "ycsb".to_owned()
}

fn default_write_commit() -> bool {
    true
}

impl Default for JcrConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            workspace: default_workspace(),
            username: default_admin(),
            password: default_admin(),
            database: default_database(),
            write_commit: true,
            verbose: false,
        }
    }
}

impl JcrConfig {
    /// Read the `jcr.*` properties.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        props.deserialize("jcr.")
    }

    /// Print the configuration to stdout.
    pub fn print(&self) {
        println!();
        println!("JCR driver properties:");
        println!("  jcr.url:         {}", self.url);
        println!("  jcr.workspace:   {}", self.workspace);
        println!("  jcr.username:    {}", self.username);
        println!("  jcr.password:    {}", "*".repeat(self.password.len()));
        println!("  jcr.database:    {}", self.database);
        println!("  jcr.writeCommit: {}", self.write_commit);
    }
}

/// The JCR binding. Owns one session.
pub struct JcrDb<S: Session> {
    session: Option<S>,
    db_node: NodePath,
    tables: HashMap<String, NodePath>,
    write_commit: bool,
    log: Logger,
}

impl JcrDb<SledSession> {
    /// Read the configuration from `props`, open the repository at
    /// `jcr.url` and connect to it.
    ///
    /// The repository handle is returned too: adapters of other threads must
    /// share it rather than open the directory again.
    pub fn open<LOG>(props: &Properties, log: LOG) -> Result<(Self, SledRepository)>
    where
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into());
        let config = JcrConfig::from_properties(props)?;
        if config.verbose {
            config.print();
        }
        let repo = match SledRepository::open_url(&config.url, log.clone()) {
            Ok(repo) => repo,
            Err(e) => return Err(Error::Connection(e.to_string()))?,
        };
        let db = Self::connect(&repo, &config, log)?;
        Ok((db, repo))
    }
}

impl<S: Session> JcrDb<S> {
    /// Log into the configured workspace and find or create the database node.
    /// The session is logged out again if anything after the login fails.
    pub fn connect<R, LOG>(repository: &R, config: &JcrConfig, log: LOG) -> Result<Self>
    where
        R: Repository<Session = S>,
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into())
            .new(o!("binding" => "jcr", "workspace" => config.workspace.clone()));
        let credentials = Credentials::new(&config.username, &config.password);
        let mut session = match repository.login(&credentials, &config.workspace) {
            Ok(session) => session,
            Err(e) => return Err(Error::Connection(e.to_string()))?,
        };
        let db_node = match open_database(&mut session, &config.database) {
            Ok(node) => node,
            Err(e) => {
                if let Err(e1) = session.logout() {
                    warn!(log, "could not release session: {}", e1);
                }
                return Err(e);
            }
        };
        Ok(Self {
            session: Some(session),
            db_node,
            tables: HashMap::new(),
            write_commit: config.write_commit,
            log,
        })
    }

    /// Read the configuration from `props` and connect to `repository`.
    pub fn from_properties<R, LOG>(repository: &R, props: &Properties, log: LOG) -> Result<Self>
    where
        R: Repository<Session = S>,
        LOG: Into<Option<Logger>>,
    {
        let config = JcrConfig::from_properties(props)?;
        if config.verbose {
            config.print();
        }
        Self::connect(repository, &config, log)
    }

    fn session(&mut self) -> Result<&mut S> {
        match self.session {
            Some(ref mut session) => Ok(session),
            None => Err(Error::Connection("not connected".to_owned()))?,
        }
    }

    /// Find or create the node of a table.
    fn table(&mut self, name: &str) -> Result<NodePath> {
        if let Some(path) = self.tables.get(name) {
            return Ok(path.clone());
        }
        let path = self.db_node.child(name)?;
        let session = self.session()?;
        if !session.has_node(&path)? {
            session.add_node(&path)?;
            session.save()?;
        }
        self.tables.insert(name.to_owned(), path.clone());
        Ok(path)
    }

    fn record(&mut self, table: &str, key: &str) -> Result<NodePath> {
        self.table(table)?.child(key)
    }

    /// Run `change` against the session, then save if `save` is set.
    /// On failure the changes staged by `change` are undone, so a failed
    /// write never reaches a later save.
    fn apply<F>(&mut self, save: bool, change: F) -> Result<()>
    where
        F: FnOnce(&mut S) -> Result<()>,
    {
        let session = self.session()?;
        let savepoint = session.savepoint();
        let res = change(&mut *session).and_then(|()| if save { session.save() } else { Ok(()) });
        if res.is_err() {
            session.rollback(savepoint);
        }
        res
    }

    fn insert_record(&mut self, table: &str, key: &str, values: &Fields) -> Result<()> {
        check_names(values)?;
        let path = self.record(table, key)?;
        self.apply(self.write_commit, |session| {
            if session.has_node(&path)? {
                return Err(Error::Conflict(path.to_string()))?;
            }
            session.add_node(&path)?;
            session.set_properties(&path, values)
        })
    }

    fn read_record(&mut self, table: &str, key: &str, fields: Option<&FieldSet>) -> Result<Fields> {
        let path = self.record(table, key)?;
        let node = match self.session()?.properties(&path)? {
            Some(node) => node,
            None => return Err(Error::NotFound(path.to_string()))?,
        };
        match selection(fields) {
            None => Ok(node
                .into_iter()
                .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
                .collect()),
            Some(fields) => {
                let mut record = Fields::with_capacity(fields.len());
                for f in fields {
                    match node.get(f) {
                        Some(v) => {
                            record.insert(f.to_owned(), v.to_owned());
                        }
                        None => return Err(Error::NotFound(format!("{} property {}", path, f)))?,
                    }
                }
                Ok(record)
            }
        }
    }

    fn update_record(&mut self, table: &str, key: &str, values: &Fields) -> Result<()> {
        check_names(values)?;
        let path = self.record(table, key)?;
        self.apply(self.write_commit, |session| {
            if !session.has_node(&path)? {
                return Err(Error::NotFound(path.to_string()))?;
            }
            session.set_properties(&path, values)
        })
    }

    fn delete_record(&mut self, table: &str, key: &str) -> Result<()> {
        let path = self.record(table, key)?;
        self.apply(self.write_commit, |session| {
            if !session.has_node(&path)? {
                return Err(Error::NotFound(path.to_string()))?;
            }
            session.remove_node(&path)
        })
    }

    /// Saved at once whatever the write policy, like table creation.
    fn truncate_table(&mut self, table: &str) -> Result<()> {
        let path = self.db_node.child(table)?;
        self.tables.remove(table);
        self.apply(true, |session| {
            if session.has_node(&path)? {
                session.remove_node(&path)?;
            }
            Ok(())
        })
    }
}

impl<S: Session> Db for JcrDb<S> {
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
        _table: &str,
        _start_key: &str,
        _count: usize,
        _fields: Option<&FieldSet>,
        _result: &mut Vec<Fields>,
    ) -> Status {
        let res: Result<()> =
            Err(Error::Unsupported("JCR does not support scan semantics".to_owned()).into());
        status(&self.log, "scan", res)
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => return Ok(()),
        };
        self.tables.clear();
        let saved = if session.has_pending_changes() {
            session.save()
        } else {
            Ok(())
        };
        let res = saved.and(session.logout());
        if let Err(ref e) = res {
            error!(self.log, "cleanup failed: {}", e);
        }
        res
    }
}

fn check_names(values: &Fields) -> Result<()> {
    match values.keys().find(|k| k.starts_with(RESERVED_PREFIX)) {
        Some(name) => Err(Error::InvalidName(name.to_owned()))?,
        None => Ok(()),
    }
}

fn open_database<S: Session>(session: &mut S, name: &str) -> Result<NodePath> {
    let path = NodePath::root().child(name)?;
    if !session.has_node(&path)? {
        session.add_node(&path)?;
        session.save()?;
    }
    Ok(path)
}
