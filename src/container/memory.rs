//! In-memory container tree.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::{msgpack, ContainerAccess, ContainerError, GroupId, Scalar};
use crate::gzip;
use crate::types::dataset::NumericArray;

/// A node of the container tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(BTreeMap<String, Node>),
    Scalar(Scalar),
    Array(NumericArray),
    Record(Vec<u8>),
}

impl Node {
    pub fn group() -> Self {
        Node::Group(BTreeMap::new())
    }

    fn type_name(&self) -> &'static str {
        match self {
            Node::Group(_) => "group",
            Node::Scalar(_) => "scalar",
            Node::Array(_) => "array",
            Node::Record(_) => "record",
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match self {
            Node::Group(children) => children.get(name),
            _ => None,
        }
    }

    /// Resolve a `/`-separated path relative to this node.
    pub fn get_path(&self, path: &str) -> Option<&Node> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, name| node.child(name))
    }

    /// Insert `node` at `path`, creating intermediate groups. Fails if a
    /// non-group node sits on the way.
    pub fn insert_path(&mut self, path: &str, node: Node) -> Result<(), ContainerError> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = parts.split_last() else {
            *self = node;
            return Ok(());
        };

        let mut current = self;
        for part in parents {
            current = match current {
                Node::Group(children) => {
                    children.entry(part.to_string()).or_insert_with(Node::group)
                }
                other => {
                    return Err(ContainerError::WrongType {
                        path: path.to_string(),
                        expected: "group",
                        found: other.type_name(),
                    })
                }
            };
        }

        match current {
            Node::Group(children) => {
                children.insert(last.to_string(), node);
                Ok(())
            }
            other => Err(ContainerError::WrongType {
                path: path.to_string(),
                expected: "group",
                found: other.type_name(),
            }),
        }
    }
}

/// A container held entirely in memory, with open-handle bookkeeping.
#[derive(Debug)]
pub struct MemContainer {
    root: Node,
    open: RefCell<HashMap<GroupId, String>>,
    next_id: Cell<GroupId>,
}

impl MemContainer {
    pub fn new(root: Node) -> Self {
        MemContainer {
            root,
            open: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Load a MessagePack container file (optionally gzip-compressed).
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let bytes = std::fs::read(path)?;
        Self::from_msgpack(&bytes)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, ContainerError> {
        let root = if gzip::is_gzip(bytes) {
            msgpack::decode(&gzip::inflate(bytes)?)?
        } else {
            msgpack::decode(bytes)?
        };
        Ok(Self::new(root))
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, ContainerError> {
        msgpack::encode(&self.root)
    }

    pub fn save(&self, path: &Path) -> Result<(), ContainerError> {
        std::fs::write(path, self.to_msgpack()?)?;
        Ok(())
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Number of group handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open.borrow().len()
    }

    fn group_path(&self, id: GroupId) -> Result<String, ContainerError> {
        self.open
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(ContainerError::InvalidHandle(id))
    }

    fn member(&self, group: GroupId, name: &str) -> Result<(&Node, String), ContainerError> {
        let path = super::join_path(&self.group_path(group)?, name);
        let node = self
            .root
            .get_path(&path)
            .ok_or_else(|| ContainerError::NotFound(path.clone()))?;
        Ok((node, path))
    }
}

impl ContainerAccess for MemContainer {
    fn open_group(&self, path: &str) -> Result<GroupId, ContainerError> {
        match self.root.get_path(path) {
            Some(Node::Group(_)) => {
                let id = self.next_id.get();
                self.next_id.set(id + 1);
                self.open.borrow_mut().insert(id, path.to_string());
                Ok(id)
            }
            Some(other) => Err(ContainerError::WrongType {
                path: path.to_string(),
                expected: "group",
                found: other.type_name(),
            }),
            None => Err(ContainerError::NotFound(path.to_string())),
        }
    }

    fn close_group(&self, id: GroupId) {
        if self.open.borrow_mut().remove(&id).is_none() {
            log::warn!("closing unknown group handle {id}");
        }
    }

    fn list_children(&self, group: GroupId) -> Result<Vec<String>, ContainerError> {
        let path = self.group_path(group)?;
        match self.root.get_path(&path) {
            Some(Node::Group(children)) => Ok(children.keys().cloned().collect()),
            _ => Err(ContainerError::NotFound(path)),
        }
    }

    fn contains(&self, group: GroupId, name: &str) -> bool {
        self.member(group, name).is_ok()
    }

    fn read_scalar(&self, group: GroupId, name: &str) -> Result<Scalar, ContainerError> {
        match self.member(group, name)? {
            (Node::Scalar(s), _) => Ok(s.clone()),
            (other, path) => Err(ContainerError::WrongType {
                path,
                expected: "scalar",
                found: other.type_name(),
            }),
        }
    }

    fn read_array(&self, group: GroupId, name: &str) -> Result<NumericArray, ContainerError> {
        match self.member(group, name)? {
            (Node::Array(a), _) => Ok(a.clone()),
            (other, path) => Err(ContainerError::WrongType {
                path,
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    fn read_record(&self, group: GroupId, name: &str) -> Result<Vec<u8>, ContainerError> {
        match self.member(group, name)? {
            (Node::Record(bytes), _) => Ok(bytes.clone()),
            (other, path) => Err(ContainerError::WrongType {
                path,
                expected: "record",
                found: other.type_name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::GroupGuard;

    fn sample() -> MemContainer {
        let mut root = Node::group();
        root.insert_path("/1/Header/XSTEP", Node::Scalar(Scalar::Float(0.5)))
            .unwrap();
        root.insert_path(
            "/1/Data/CI",
            Node::Array(NumericArray::Float(vec![0.1, 0.2])),
        )
        .unwrap();
        root.insert_path("/1/Header/Phases/1/HKLFamilies/0", Node::Record(vec![0u8; 24]))
            .unwrap();
        MemContainer::new(root)
    }

    #[test]
    fn test_open_and_read() {
        let c = sample();
        let header = GroupGuard::open(&c, "/1/Header").unwrap();
        assert_eq!(header.scalar("XSTEP").unwrap(), Scalar::Float(0.5));
        assert!(header.contains("Phases"));
        assert!(!header.contains("YSTEP"));

        let data = GroupGuard::open(&c, "/1/Data").unwrap();
        assert_eq!(data.array("CI").unwrap().len(), 2);
        assert_eq!(c.open_handles(), 2);
    }

    #[test]
    fn test_guards_release_handles() {
        let c = sample();
        {
            let g = GroupGuard::open(&c, "/1").unwrap();
            let _h = g.open_child("Header").unwrap();
            assert_eq!(c.open_handles(), 2);
        }
        assert_eq!(c.open_handles(), 0);
    }

    #[test]
    fn test_wrong_types() {
        let c = sample();
        assert!(matches!(
            c.open_group("/1/Header/XSTEP"),
            Err(ContainerError::WrongType { .. })
        ));
        assert!(matches!(c.open_group("/2"), Err(ContainerError::NotFound(_))));

        let g = GroupGuard::open(&c, "/1/Header").unwrap();
        assert!(matches!(
            g.array("XSTEP"),
            Err(ContainerError::WrongType { .. })
        ));
        assert!(matches!(g.record("Nope"), Err(ContainerError::NotFound(_))));
    }

    #[test]
    fn test_insert_through_leaf_fails() {
        let mut root = Node::group();
        root.insert_path("/a", Node::Scalar(Scalar::Int(1))).unwrap();
        assert!(root
            .insert_path("/a/b", Node::Scalar(Scalar::Int(2)))
            .is_err());
    }

    #[test]
    fn test_invalid_handle() {
        let c = sample();
        assert!(matches!(
            c.list_children(99),
            Err(ContainerError::InvalidHandle(99))
        ));
    }
}
