//! The virtual path tree behind `mem://` URLs.
//!
//! Roots are keyed by (scheme, location); below a root, interior nodes map
//! names to children and leaves hold file content.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use bytes::Bytes;
use urlfs_core::Error;

/// A node in the tree: a file (leaf) or a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(Bytes),
    Dir(BTreeMap<String, Node>),
}

impl Node {
    pub fn empty_file() -> Self {
        Node::Leaf(Bytes::new())
    }

    pub fn empty_dir() -> Self {
        Node::Dir(BTreeMap::new())
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    /// Leaf length, or the total length of all leaves below a directory.
    pub fn size(&self) -> u64 {
        match self {
            Node::Leaf(data) => data.len() as u64,
            Node::Dir(children) => children.values().map(Node::size).sum(),
        }
    }

    /// Every leaf below this node as (`/`-separated relative path, content).
    pub fn leaves(&self) -> Vec<(String, Bytes)> {
        let mut out = Vec::new();
        collect_leaves(self, "", &mut out);
        out
    }

    /// Every directory below this node, parents first.
    pub fn dirs(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_dirs(self, "", &mut out);
        out
    }
}

fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn collect_leaves(node: &Node, prefix: &str, out: &mut Vec<(String, Bytes)>) {
    if let Node::Dir(children) = node {
        for (name, child) in children {
            let path = child_path(prefix, name);
            match child {
                Node::Leaf(data) => out.push((path, data.clone())),
                Node::Dir(_) => collect_leaves(child, &path, out),
            }
        }
    }
}

fn collect_dirs(node: &Node, prefix: &str, out: &mut Vec<String>) {
    if let Node::Dir(children) = node {
        for (name, child) in children {
            if child.is_dir() {
                let path = child_path(prefix, name);
                out.push(path.clone());
                collect_dirs(child, &path, out);
            }
        }
    }
}

/// What [`PathTree::resolve`] should do at the addressed path.
#[derive(Debug, Default, Clone)]
pub struct Resolve {
    /// Materialize missing interior nodes and the final node.
    pub create: bool,
    /// Replace the final node with this value.
    pub set_value: Option<Node>,
    /// Remove the final node.
    pub delete: bool,
}

impl Resolve {
    pub fn find() -> Self {
        Self::default()
    }

    /// Create the path if missing; the final node becomes an empty file.
    pub fn create() -> Self {
        Self {
            create: true,
            ..Self::default()
        }
    }

    /// Replace an existing final node; see [`creating`](Resolve::creating).
    pub fn set(value: Node) -> Self {
        Self {
            set_value: Some(value),
            ..Self::default()
        }
    }

    pub fn delete() -> Self {
        Self {
            delete: true,
            ..Self::default()
        }
    }

    pub fn creating(mut self) -> Self {
        self.create = true;
        self
    }
}

/// All `mem` roots, keyed by scheme then location.
#[derive(Debug, Default)]
pub struct PathTree {
    roots: BTreeMap<String, BTreeMap<String, Node>>,
}

impl PathTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the empty root for (scheme, location) if it does not exist.
    pub fn ensure_location(&mut self, scheme: &str, location: &str) -> &mut Node {
        self.roots
            .entry(scheme.to_string())
            .or_default()
            .entry(location.to_string())
            .or_insert_with(Node::empty_dir)
    }

    pub fn has_location(&self, scheme: &str, location: &str) -> bool {
        self.root(scheme, location).is_some()
    }

    fn root(&self, scheme: &str, location: &str) -> Option<&Node> {
        self.roots.get(scheme).and_then(|locs| locs.get(location))
    }

    /// Borrow the node at `path`, or `None` if any segment is missing.
    pub fn get(&self, scheme: &str, location: &str, path: &str) -> Result<Option<&Node>, Error> {
        let Some(root) = self.root(scheme, location) else {
            return Ok(None);
        };
        let segments = segments(path);
        let mut cursor = root;
        for (i, segment) in segments.iter().enumerate() {
            let Node::Dir(children) = cursor else {
                return Err(through_leaf(location, path, &segments[..i]));
            };
            match children.get(*segment) {
                Some(child) => cursor = child,
                None => return Ok(None),
            }
        }
        Ok(Some(cursor))
    }

    /// Walk `path` from the (scheme, location) root and apply `op`.
    ///
    /// Returns the node now at the path: the found or created node, the value
    /// set, or the node removed by a delete. `None` means the path (or the
    /// root) is missing and `op.create` was not set.
    pub fn resolve(
        &mut self,
        scheme: &str,
        location: &str,
        path: &str,
        op: Resolve,
    ) -> Result<Option<Node>, Error> {
        let root = if op.create {
            self.ensure_location(scheme, location)
        } else {
            match self.roots.get_mut(scheme).and_then(|locs| locs.get_mut(location)) {
                Some(root) => root,
                None => return Ok(None),
            }
        };

        let segments = segments(path);
        let Some((last, parents)) = segments.split_last() else {
            if op.set_value.is_some() || op.delete {
                return Err(Error::InvalidPathShape {
                    location: location.to_string(),
                    path: path.to_string(),
                    message: "the location root cannot be replaced or deleted".to_string(),
                });
            }
            return Ok(Some(root.clone()));
        };

        let mut cursor = root;
        for (i, segment) in parents.iter().enumerate() {
            let Node::Dir(children) = cursor else {
                return Err(through_leaf(location, path, &segments[..i]));
            };
            cursor = match children.entry(segment.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    if !op.create {
                        return Ok(None);
                    }
                    entry.insert(Node::empty_dir())
                }
            };
        }
        let Node::Dir(children) = cursor else {
            return Err(through_leaf(location, path, parents));
        };

        if op.delete {
            return Ok(children.remove(*last));
        }
        match children.entry(last.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(value) = op.set_value {
                    entry.insert(value);
                }
                Ok(Some(entry.get().clone()))
            }
            Entry::Vacant(entry) => {
                if !op.create {
                    return Ok(None);
                }
                let value = op.set_value.unwrap_or_else(Node::empty_file);
                Ok(Some(entry.insert(value).clone()))
            }
        }
    }

    /// Set the node at `path`, creating missing parents.
    pub fn set(&mut self, scheme: &str, location: &str, path: &str, value: Node) -> Result<(), Error> {
        self.resolve(scheme, location, path, Resolve::set(value).creating())?;
        Ok(())
    }

    /// Remove the node at `path`, returning it if it existed.
    pub fn delete(&mut self, scheme: &str, location: &str, path: &str) -> Result<Option<Node>, Error> {
        self.resolve(scheme, location, path, Resolve::delete())
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn through_leaf(location: &str, path: &str, leaf: &[&str]) -> Error {
    Error::InvalidPathShape {
        location: location.to_string(),
        path: path.to_string(),
        message: format!("/{} is a file", leaf.join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: &str = "mem";
    const L: &str = "loc";

    fn leaf(data: &'static [u8]) -> Node {
        Node::Leaf(Bytes::from_static(data))
    }

    #[test]
    fn missing_location_is_none() {
        let mut tree = PathTree::new();
        assert_eq!(tree.get(S, L, "/a").unwrap(), None);
        assert_eq!(tree.resolve(S, L, "/a", Resolve::find()).unwrap(), None);
        assert!(!tree.has_location(S, L));
    }

    #[test]
    fn create_materializes_chain() {
        let mut tree = PathTree::new();
        let node = tree.resolve(S, L, "/a/b/c", Resolve::create()).unwrap();
        assert_eq!(node, Some(Node::empty_file()));

        assert!(tree.get(S, L, "/a").unwrap().unwrap().is_dir());
        assert!(tree.get(S, L, "/a/b/").unwrap().unwrap().is_dir());
        assert_eq!(tree.get(S, L, "a/b/c").unwrap(), Some(&Node::empty_file()));
    }

    #[test]
    fn create_keeps_existing_node() {
        let mut tree = PathTree::new();
        tree.set(S, L, "/f", leaf(b"data")).unwrap();
        let node = tree.resolve(S, L, "/f", Resolve::create()).unwrap();
        assert_eq!(node, Some(leaf(b"data")));
    }

    #[test]
    fn find_does_not_create() {
        let mut tree = PathTree::new();
        tree.ensure_location(S, L);
        assert_eq!(tree.resolve(S, L, "/a/b", Resolve::find()).unwrap(), None);
        assert_eq!(tree.get(S, L, "/a").unwrap(), None);
    }

    #[test]
    fn traversal_through_leaf_fails() {
        let mut tree = PathTree::new();
        tree.set(S, L, "/root/file1", leaf(b"x")).unwrap();

        let err = tree
            .resolve(S, L, "/root/file1/child", Resolve::create())
            .unwrap_err();
        match err {
            Error::InvalidPathShape { message, .. } => assert_eq!(message, "/root/file1 is a file"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(tree.get(S, L, "/root/file1/child").is_err());
        assert!(tree.get(S, L, "/root/file1/child/deeper").is_err());
    }

    #[test]
    fn set_without_create_needs_existing_node() {
        let mut tree = PathTree::new();
        tree.ensure_location(S, L);
        assert_eq!(tree.resolve(S, L, "/a", Resolve::set(leaf(b"x"))).unwrap(), None);
        assert_eq!(tree.get(S, L, "/a").unwrap(), None);

        tree.resolve(S, L, "/a", Resolve::create()).unwrap();
        let node = tree.resolve(S, L, "/a", Resolve::set(leaf(b"x"))).unwrap();
        assert_eq!(node, Some(leaf(b"x")));
    }

    #[test]
    fn delete_returns_removed_node() {
        let mut tree = PathTree::new();
        tree.set(S, L, "/d/f", leaf(b"abc")).unwrap();
        assert_eq!(tree.delete(S, L, "/d/f").unwrap(), Some(leaf(b"abc")));
        assert_eq!(tree.delete(S, L, "/d/f").unwrap(), None);
        assert!(tree.get(S, L, "/d").unwrap().unwrap().is_dir());
    }

    #[test]
    fn root_cannot_be_replaced() {
        let mut tree = PathTree::new();
        tree.ensure_location(S, L);
        assert!(matches!(
            tree.delete(S, L, "/"),
            Err(Error::InvalidPathShape { .. })
        ));
        assert!(tree.set(S, L, "", leaf(b"x")).is_err());
        assert!(tree.get(S, L, "/").unwrap().unwrap().is_dir());
    }

    #[test]
    fn locations_are_isolated() {
        let mut tree = PathTree::new();
        tree.set(S, "one", "/f", leaf(b"1")).unwrap();
        tree.set("other", "one", "/f", leaf(b"2")).unwrap();
        assert_eq!(tree.get(S, "two", "/f").unwrap(), None);
        assert_eq!(tree.get("other", "one", "/f").unwrap(), Some(&leaf(b"2")));
    }

    #[test]
    fn sizes_leaves_and_dirs() {
        let mut tree = PathTree::new();
        tree.set(S, L, "/d/a", leaf(b"12345")).unwrap();
        tree.set(S, L, "/d/sub/b", leaf(b"123")).unwrap();
        tree.set(S, L, "/d/sub/empty", Node::empty_dir()).unwrap();

        let dir = tree.get(S, L, "/d").unwrap().unwrap();
        assert_eq!(dir.size(), 8);

        let leaves: Vec<_> = dir.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(leaves, vec!["a", "sub/b"]);
        assert_eq!(dir.dirs(), vec!["sub", "sub/empty"]);
    }
}
