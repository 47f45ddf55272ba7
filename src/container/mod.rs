//! Path-addressed access to hierarchical scan containers.
//!
//! A container is a tree of named groups whose leaves are scalars, numeric
//! arrays, or fixed-layout binary records. Readers only see it through
//! [`ContainerAccess`]; [`MemContainer`] is the in-memory implementation,
//! loaded from MessagePack files by [`msgpack`].
//!
//! Handles returned by `open_group` must be closed. [`GroupGuard`] closes
//! its handle on drop, so every exit path of a reader releases what it opened.

pub mod export;
pub mod memory;
pub mod msgpack;

use crate::types::dataset::NumericArray;

pub use export::{dataset_to_container, dataset_to_node};
pub use memory::{MemContainer, Node};

/// Group and dataset names of the scan container layout.
pub mod layout {
    pub const FILE_VERSION: &str = "FileVersion";
    /// Newest layout version this crate reads.
    pub const MAX_FILE_VERSION: i64 = 5;

    pub const HEADER: &str = "Header";
    pub const ORIGINAL_FILE: &str = "OriginalFile";
    pub const PHASES: &str = "Phases";
    pub const DATA: &str = "Data";

    pub const PHASE: &str = "Phase";
    pub const MATERIAL_NAME: &str = "MaterialName";
    pub const FORMULA: &str = "Formula";
    pub const INFO: &str = "Info";
    pub const SYMMETRY: &str = "Symmetry";
    pub const LATTICE_CONSTANTS: &str = "LatticeConstants";
    pub const NUMBER_HKL_FAMILIES: &str = "NumberHKLFamilies";
    pub const CATEGORIES: &str = "Categories";
    pub const HKL_FAMILIES: &str = "HKLFamilies";
}

/// Handle to an open group.
pub type GroupId = usize;

/// A scalar dataset value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Errors raised by a container accessor.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("no such path: {0}")]
    NotFound(String),

    #[error("'{path}' is a {found}, expected a {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid group handle {0}")]
    InvalidHandle(GroupId),

    #[error("invalid container format: {0}")]
    InvalidFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read-only, path-addressed access to a container.
///
/// Implementations are not reentrant across traversals: one reader drives
/// one accessor at a time.
pub trait ContainerAccess {
    /// Open the group at an absolute path such as `/1/Header`.
    fn open_group(&self, path: &str) -> Result<GroupId, ContainerError>;
    fn close_group(&self, id: GroupId);
    /// Child names of a group in storage order (not guaranteed sorted).
    fn list_children(&self, group: GroupId) -> Result<Vec<String>, ContainerError>;
    fn contains(&self, group: GroupId, name: &str) -> bool;
    fn read_scalar(&self, group: GroupId, name: &str) -> Result<Scalar, ContainerError>;
    fn read_array(&self, group: GroupId, name: &str) -> Result<NumericArray, ContainerError>;
    /// Raw bytes of a fixed-layout compound record.
    fn read_record(&self, group: GroupId, name: &str) -> Result<Vec<u8>, ContainerError>;
}

impl<T: ContainerAccess + ?Sized> ContainerAccess for &T {
    fn open_group(&self, path: &str) -> Result<GroupId, ContainerError> {
        (**self).open_group(path)
    }
    fn close_group(&self, id: GroupId) {
        (**self).close_group(id)
    }
    fn list_children(&self, group: GroupId) -> Result<Vec<String>, ContainerError> {
        (**self).list_children(group)
    }
    fn contains(&self, group: GroupId, name: &str) -> bool {
        (**self).contains(group, name)
    }
    fn read_scalar(&self, group: GroupId, name: &str) -> Result<Scalar, ContainerError> {
        (**self).read_scalar(group, name)
    }
    fn read_array(&self, group: GroupId, name: &str) -> Result<NumericArray, ContainerError> {
        (**self).read_array(group, name)
    }
    fn read_record(&self, group: GroupId, name: &str) -> Result<Vec<u8>, ContainerError> {
        (**self).read_record(group, name)
    }
}

/// An open group that is closed when dropped.
pub struct GroupGuard<'a, C: ContainerAccess + ?Sized> {
    access: &'a C,
    id: GroupId,
    path: String,
}

impl<'a, C: ContainerAccess + ?Sized> GroupGuard<'a, C> {
    pub fn open(access: &'a C, path: &str) -> Result<Self, ContainerError> {
        let id = access.open_group(path)?;
        Ok(GroupGuard {
            access,
            id,
            path: path.to_string(),
        })
    }

    /// Open a child group of this one.
    pub fn open_child(&self, name: &str) -> Result<GroupGuard<'a, C>, ContainerError> {
        GroupGuard::open(self.access, &join_path(&self.path, name))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn children(&self) -> Result<Vec<String>, ContainerError> {
        self.access.list_children(self.id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.access.contains(self.id, name)
    }

    pub fn scalar(&self, name: &str) -> Result<Scalar, ContainerError> {
        self.access.read_scalar(self.id, name)
    }

    pub fn array(&self, name: &str) -> Result<NumericArray, ContainerError> {
        self.access.read_array(self.id, name)
    }

    pub fn record(&self, name: &str) -> Result<Vec<u8>, ContainerError> {
        self.access.read_record(self.id, name)
    }
}

impl<C: ContainerAccess + ?Sized> Drop for GroupGuard<'_, C> {
    fn drop(&mut self) {
        self.access.close_group(self.id);
    }
}

/// Join a group path and a child name with a single `/`.
pub fn join_path(parent: &str, child: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), child.trim_start_matches('/'))
}

/// Child names that parse as integers, sorted numerically. Listing order is
/// not meaningful, so numbered children are always ordered by value.
pub fn numeric_children(names: &[String]) -> Vec<(i64, String)> {
    let mut numbered: Vec<(i64, String)> = names
        .iter()
        .filter_map(|n| match n.parse::<i64>() {
            Ok(v) => Some((v, n.clone())),
            Err(_) => {
                log::warn!("skipping non-numeric child '{n}'");
                None
            }
        })
        .collect();
    numbered.sort_by_key(|(v, _)| *v);
    numbered
}
