//! A content repository persisted in sled.
//!
//! Each workspace is a sled tree mapping node paths to their properties
//! (JSON encoded). Sessions collect changes in memory and write them in one
//! batch on `save`.

use slog::Logger;

use std::collections::BTreeMap;
use std::mem;
use std::path::Path;

use super::path::NodePath;
use super::{Credentials, Repository, Session, PRIMARY_TYPE, RESERVED_PREFIX};
use crate::{get_logger, Error, Fields, Result};

const USERS: &str = "users";
const WORKSPACES: &str = "workspaces";
const WORKSPACE_PREFIX: &str = "workspace:";
const NODE_TYPE: &str = "nt:unstructured";

/// Workspace every repository starts with.
pub const DEFAULT_WORKSPACE: &str = "default";
/// User every repository starts with, its password is the same.
pub const DEFAULT_ADMIN: &str = "admin";

/// Handle on an open repository, cheap to clone and share between threads.
/// A directory can only be opened once per process: open it once and clone
/// the handle.
#[derive(Clone)]
pub struct SledRepository {
    db: sled::Db,
    users: sled::Tree,
    workspaces: sled::Tree,
    log: Logger,
}

impl SledRepository {
    /// Open (or create) the repository in `dir`.
    pub fn open<LOG>(dir: impl AsRef<Path>, log: LOG) -> Result<Self>
    where
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into());
        info!(log, "opening repository"; "dir" => dir.as_ref().display().to_string());
        let db = sled::open(dir.as_ref())?;
        Self::init(db, log)
    }

    /// Open the repository named by a `file://<dir>` URL or a plain directory.
    pub fn open_url<LOG>(url: &str, log: LOG) -> Result<Self>
    where
        LOG: Into<Option<Logger>>,
    {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(Error::Connection(format!("unsupported repository url: {}", url)))?;
        }
        Self::open(url.trim_start_matches("file://"), log)
    }

    /// A repository that is deleted when the last handle is dropped.
    pub fn temporary<LOG>(log: LOG) -> Result<Self>
    where
        LOG: Into<Option<Logger>>,
    {
        let log = get_logger(&mut log.into());
        let db = sled::Config::new().temporary(true).open()?;
        Self::init(db, log)
    }

    fn init(db: sled::Db, log: Logger) -> Result<Self> {
        let users = db.open_tree(USERS)?;
        let workspaces = db.open_tree(WORKSPACES)?;
        let repo = Self {
            db,
            users,
            workspaces,
            log,
        };
        if repo.users.is_empty() {
            warn!(repo.log, "initializing a new repository");
            repo.add_user(DEFAULT_ADMIN, DEFAULT_ADMIN)?;
            repo.create_workspace(DEFAULT_WORKSPACE)?;
        }
        Ok(repo)
    }

    /// Add a user, or change its password.
    pub fn add_user(&self, username: &str, password: &str) -> Result<()> {
        self.users.insert(username, password)?;
        self.users.flush()?;
        Ok(())
    }

    /// Create a workspace if it does not exist yet.
    pub fn create_workspace(&self, name: &str) -> Result<()> {
        self.workspaces.insert(name, Vec::<u8>::new())?;
        self.workspaces.flush()?;
        Ok(())
    }

    fn workspace(&self, name: &str) -> Result<Option<sled::Tree>> {
        if !self.workspaces.contains_key(name)? {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(format!("{}{}", WORKSPACE_PREFIX, name))?))
    }
}

impl Repository for SledRepository {
    type Session = SledSession;

    fn login(&self, credentials: &Credentials, workspace: &str) -> Result<SledSession> {
        match self.users.get(&credentials.username)? {
            Some(ref password) if &password[..] == credentials.password.as_bytes() => {}
            _ => {
                return Err(Error::Connection(format!(
                    "authentication failed for user {}",
                    credentials.username
                )))?;
            }
        }
        let tree = match self.workspace(workspace)? {
            Some(tree) => tree,
            None => return Err(Error::Connection(format!("no such workspace: {}", workspace)))?,
        };
        let log = self.log.new(o!("user" => credentials.username.clone()));
        debug!(log, "logged in");
        Ok(SledSession {
            tree,
            pending: BTreeMap::new(),
            journal: Vec::new(),
            live: true,
            log,
        })
    }
}

/// A session on one workspace of a [`SledRepository`].
///
/// Changes stay private to the session until `save`. Concurrent sessions
/// saving the same node overwrite each other.
pub struct SledSession {
    tree: sled::Tree,
    // path -> new properties, or None when removed
    pending: BTreeMap<String, Option<Fields>>,
    // what each staged change replaced in `pending`, newest last
    journal: Vec<(String, Option<Option<Fields>>)>,
    live: bool,
    log: Logger,
}

impl SledSession {
    fn check_live(&self) -> Result<()> {
        if self.live {
            Ok(())
        } else {
            Err(Error::Connection("session is logged out".to_owned()))?
        }
    }

    fn stage(&mut self, path: String, change: Option<Fields>) {
        let replaced = self.pending.insert(path.clone(), change);
        self.journal.push((path, replaced));
    }

    fn lookup(&self, path: &NodePath) -> Result<Option<Fields>> {
        self.check_live()?;
        if path.is_root() {
            return Ok(Some(Fields::new()));
        }
        if let Some(change) = self.pending.get(path.as_str()) {
            return Ok(change.clone());
        }
        match self.tree.get(path.as_str())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl Session for SledSession {
    fn has_node(&self, path: &NodePath) -> Result<bool> {
        Ok(self.lookup(path)?.is_some())
    }

    fn add_node(&mut self, path: &NodePath) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) => parent,
            None => return Err(Error::Conflict(path.to_string()))?,
        };
        if self.lookup(&parent)?.is_none() {
            return Err(Error::NotFound(parent.to_string()))?;
        }
        if self.lookup(path)?.is_some() {
            return Err(Error::Conflict(path.to_string()))?;
        }
        let mut node = Fields::new();
        node.insert(PRIMARY_TYPE.to_owned(), NODE_TYPE.to_owned());
        self.stage(path.as_str().to_owned(), Some(node));
        Ok(())
    }

    fn properties(&self, path: &NodePath) -> Result<Option<Fields>> {
        self.lookup(path)
    }

    fn set_properties(&mut self, path: &NodePath, values: &Fields) -> Result<()> {
        if let Some(name) = values.keys().find(|k| k.starts_with(RESERVED_PREFIX)) {
            return Err(Error::InvalidName(name.to_owned()))?;
        }
        let mut node = match self.lookup(path)? {
            Some(node) if !path.is_root() => node,
            Some(_) => return Err(Error::Unsupported("properties on the root node".to_owned()))?,
            None => return Err(Error::NotFound(path.to_string()))?,
        };
        node.extend(values.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        self.stage(path.as_str().to_owned(), Some(node));
        Ok(())
    }

    fn remove_node(&mut self, path: &NodePath) -> Result<()> {
        if path.is_root() {
            return Err(Error::Unsupported("removing the root node".to_owned()))?;
        }
        if self.lookup(path)?.is_none() {
            return Err(Error::NotFound(path.to_string()))?;
        }
        let prefix = path.descendant_prefix();
        let mut removed = vec![path.as_str().to_owned()];
        for key in self.tree.scan_prefix(&prefix).keys() {
            removed.push(String::from_utf8(key?.to_vec())?);
        }
        removed.extend(
            self.pending
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k.clone()),
        );
        for key in removed {
            self.stage(key, None);
        }
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.check_live()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for (path, change) in self.pending.iter() {
            match change {
                Some(node) => batch.insert(path.as_bytes(), serde_json::to_vec(node)?),
                None => batch.remove(path.as_bytes()),
            }
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        debug!(self.log, "saved {} changes", self.pending.len());
        self.pending.clear();
        self.journal.clear();
        Ok(())
    }

    fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn savepoint(&self) -> usize {
        self.journal.len()
    }

    fn rollback(&mut self, savepoint: usize) {
        while self.journal.len() > savepoint {
            let (path, replaced) = match self.journal.pop() {
                Some(entry) => entry,
                None => break,
            };
            match replaced {
                Some(change) => self.pending.insert(path, change),
                None => self.pending.remove(&path),
            };
        }
    }

    fn logout(&mut self) -> Result<()> {
        self.check_live()?;
        self.journal.clear();
        let dropped = mem::replace(&mut self.pending, BTreeMap::new());
        if !dropped.is_empty() {
            warn!(self.log, "logout drops {} unsaved changes", dropped.len());
        }
        self.live = false;
        debug!(self.log, "logged out");
        Ok(())
    }
}
