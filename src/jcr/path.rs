use std::fmt::{self, Display, Formatter};

use crate::{Error, Result};

const ILLEGAL: &[char] = &['/', '[', ']', '|', '*'];

/// Absolute path of a node in a workspace: `/` or `/a/b`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(String);

impl NodePath {
    /// The root node.
    pub fn root() -> NodePath {
        NodePath("/".to_owned())
    }

    /// Whether this is the root node.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path of the child called `name`.
    pub fn child(&self, name: &str) -> Result<NodePath> {
        if name.is_empty() || name == "." || name == ".." || name.contains(ILLEGAL) {
            return Err(Error::InvalidName(name.to_owned()))?;
        }
        if self.is_root() {
            Ok(NodePath(format!("/{}", name)))
        } else {
            Ok(NodePath(format!("{}/{}", self.0, name)))
        }
    }

    /// The parent path, `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(NodePath::root()),
            Some(at) => Some(NodePath(self.0[..at].to_owned())),
            None => None,
        }
    }

    /// The last segment, empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(at) => &self.0[at + 1..],
            None => &self.0,
        }
    }

    /// Every path below this node starts with this prefix.
    pub fn descendant_prefix(&self) -> String {
        if self.is_root() {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }

    /// The path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
