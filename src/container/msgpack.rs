//! MessagePack encoding of container trees.
//!
//! Mapping:
//! - map with string keys -> group
//! - bin -> fixed-layout record
//! - array of numbers -> numeric array (all integers -> `Int`, otherwise `Float`)
//! - int / float / str -> scalar
//!
//! An empty array carries no element type, so an empty `Int` array is written
//! as a zero-length ext value of type [`EMPTY_INT_ARRAY_EXT`]. A plain empty
//! msgpack array decodes as an empty `Float` array.

use std::collections::BTreeMap;

use rmp::Marker;

use super::memory::Node;
use super::{ContainerError, Scalar};
use crate::types::dataset::NumericArray;

/// Ext type tag marking an empty integer array.
pub const EMPTY_INT_ARRAY_EXT: i8 = 1;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a MessagePack document into a container tree. The top-level value
/// must be a map.
///
/// Declared lengths are checked against the bytes left in the input before
/// anything is allocated.
pub fn decode(data: &[u8]) -> Result<Node, ContainerError> {
    let mut rd = data;
    let root = read_node(&mut rd)?;
    if !rd.is_empty() {
        log::warn!("{} trailing bytes after msgpack document", rd.len());
    }
    match root {
        Node::Group(_) => Ok(root),
        _ => Err(ContainerError::InvalidFormat(
            "top-level msgpack value must be a map".into(),
        )),
    }
}

/// A decoded value before it is placed in the tree. Array elements must be
/// numbers; everything else becomes a node directly.
enum Value {
    Int(i64),
    Float(f64),
    Node(Node),
}

fn invalid(msg: String) -> ContainerError {
    ContainerError::InvalidFormat(msg)
}

/// Split `n` bytes off the front of the input.
fn take<'a>(rd: &mut &'a [u8], n: usize) -> Result<&'a [u8], ContainerError> {
    if n > rd.len() {
        return Err(invalid(format!(
            "msgpack value needs {n} bytes, {} left",
            rd.len()
        )));
    }
    let input: &'a [u8] = *rd;
    let (head, tail) = input.split_at(n);
    *rd = tail;
    Ok(head)
}

fn take_array<const N: usize>(rd: &mut &[u8]) -> Result<[u8; N], ContainerError> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(take(rd, N)?);
    Ok(buf)
}

/// Read a big-endian length prefix of `width` bytes.
fn read_len(rd: &mut &[u8], width: usize) -> Result<usize, ContainerError> {
    let len = match width {
        1 => take_array::<1>(rd)?[0] as usize,
        2 => u16::from_be_bytes(take_array(rd)?) as usize,
        _ => u32::from_be_bytes(take_array(rd)?) as usize,
    };
    Ok(len)
}

/// Reject a container length that cannot fit in the remaining input, given
/// the smallest encoded size of one element.
fn check_count(rd: &[u8], count: usize, min_element: usize, what: &str) -> Result<(), ContainerError> {
    if count.saturating_mul(min_element) > rd.len() {
        return Err(invalid(format!(
            "msgpack {what} declares {count} entries, only {} bytes left",
            rd.len()
        )));
    }
    Ok(())
}

fn read_node(rd: &mut &[u8]) -> Result<Node, ContainerError> {
    Ok(match read_value(rd)? {
        Value::Int(v) => Node::Scalar(Scalar::Int(v)),
        Value::Float(v) => Node::Scalar(Scalar::Float(v)),
        Value::Node(n) => n,
    })
}

fn read_value(rd: &mut &[u8]) -> Result<Value, ContainerError> {
    let marker = rmp::decode::read_marker(rd)
        .map_err(|e| invalid(format!("msgpack marker: {:?}", e)))?;

    let value = match marker {
        Marker::FixPos(v) => Value::Int(v as i64),
        Marker::FixNeg(v) => Value::Int(v as i64),
        Marker::U8 => Value::Int(take_array::<1>(rd)?[0] as i64),
        Marker::U16 => Value::Int(u16::from_be_bytes(take_array(rd)?) as i64),
        Marker::U32 => Value::Int(u32::from_be_bytes(take_array(rd)?) as i64),
        Marker::U64 => {
            let v = u64::from_be_bytes(take_array(rd)?);
            Value::Int(i64::try_from(v).map_err(|_| invalid(format!("integer {v} out of range")))?)
        }
        Marker::I8 => Value::Int(take_array::<1>(rd)?[0] as i8 as i64),
        Marker::I16 => Value::Int(i16::from_be_bytes(take_array(rd)?) as i64),
        Marker::I32 => Value::Int(i32::from_be_bytes(take_array(rd)?) as i64),
        Marker::I64 => Value::Int(i64::from_be_bytes(take_array(rd)?)),
        Marker::F32 => Value::Float(f32::from_be_bytes(take_array(rd)?) as f64),
        Marker::F64 => Value::Float(f64::from_be_bytes(take_array(rd)?)),

        Marker::FixStr(len) => read_str(rd, len as usize)?,
        Marker::Str8 => read_str_prefixed(rd, 1)?,
        Marker::Str16 => read_str_prefixed(rd, 2)?,
        Marker::Str32 => read_str_prefixed(rd, 4)?,

        Marker::Bin8 => read_bin(rd, 1)?,
        Marker::Bin16 => read_bin(rd, 2)?,
        Marker::Bin32 => read_bin(rd, 4)?,

        Marker::FixArray(len) => read_array(rd, len as usize)?,
        Marker::Array16 => {
            let len = read_len(rd, 2)?;
            read_array(rd, len)?
        }
        Marker::Array32 => {
            let len = read_len(rd, 4)?;
            read_array(rd, len)?
        }

        Marker::FixMap(len) => read_map(rd, len as usize)?,
        Marker::Map16 => {
            let len = read_len(rd, 2)?;
            read_map(rd, len)?
        }
        Marker::Map32 => {
            let len = read_len(rd, 4)?;
            read_map(rd, len)?
        }

        Marker::Ext8 => {
            let len = read_len(rd, 1)?;
            let ty = take_array::<1>(rd)?[0] as i8;
            if len != 0 || ty != EMPTY_INT_ARRAY_EXT {
                return Err(invalid(format!(
                    "unsupported msgpack ext type {ty} ({len} bytes)"
                )));
            }
            Value::Node(Node::Array(NumericArray::Int(Vec::new())))
        }

        other => return Err(invalid(format!("unsupported msgpack marker: {:?}", other))),
    };
    Ok(value)
}

fn read_bin(rd: &mut &[u8], width: usize) -> Result<Value, ContainerError> {
    let len = read_len(rd, width)?;
    Ok(Value::Node(Node::Record(take(rd, len)?.to_vec())))
}

fn read_str_prefixed(rd: &mut &[u8], width: usize) -> Result<Value, ContainerError> {
    let len = read_len(rd, width)?;
    read_str(rd, len)
}

fn read_str(rd: &mut &[u8], len: usize) -> Result<Value, ContainerError> {
    let s = std::str::from_utf8(take(rd, len)?)
        .map_err(|e| invalid(format!("msgpack string utf8: {}", e)))?;
    Ok(Value::Node(Node::Scalar(Scalar::Str(s.to_string()))))
}

fn read_array(rd: &mut &[u8], len: usize) -> Result<Value, ContainerError> {
    check_count(*rd, len, 1, "array")?;
    let mut ints: Vec<i64> = Vec::with_capacity(len);
    let mut floats: Option<Vec<f32>> = None;

    for i in 0..len {
        match read_value(rd)? {
            Value::Int(v) => match floats.as_mut() {
                Some(f) => f.push(v as f32),
                None => ints.push(v),
            },
            Value::Float(v) => floats
                .get_or_insert_with(|| ints.iter().map(|&x| x as f32).collect())
                .push(v as f32),
            Value::Node(_) => return Err(invalid(format!("array element {i} is not a number"))),
        }
    }

    let array = match floats {
        Some(f) => NumericArray::Float(f),
        None if ints.is_empty() => NumericArray::Float(Vec::new()),
        None => NumericArray::Int(
            ints.into_iter()
                .map(|v| i32::try_from(v).map_err(|_| invalid(format!("array value {v} exceeds i32"))))
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(Value::Node(Node::Array(array)))
}

fn read_map(rd: &mut &[u8], len: usize) -> Result<Value, ContainerError> {
    check_count(*rd, len, 2, "map")?;
    let mut children = BTreeMap::new();
    for _ in 0..len {
        let key = match read_node(rd)? {
            Node::Scalar(Scalar::Str(s)) => s,
            Node::Scalar(Scalar::Int(v)) => v.to_string(),
            _ => return Err(invalid("map keys must be strings".into())),
        };
        let value = read_node(rd)?;
        children.insert(key, value);
    }
    Ok(Value::Node(Node::Group(children)))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a container tree as MessagePack.
pub fn encode(root: &Node) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::new();
    write_node(&mut out, root)?;
    Ok(out)
}

fn write_err<E: std::fmt::Debug>(e: E) -> ContainerError {
    ContainerError::InvalidFormat(format!("msgpack write: {:?}", e))
}

fn write_node(out: &mut Vec<u8>, node: &Node) -> Result<(), ContainerError> {
    match node {
        Node::Group(children) => {
            rmp::encode::write_map_len(out, children.len() as u32).map_err(write_err)?;
            for (name, child) in children {
                rmp::encode::write_str(out, name).map_err(write_err)?;
                write_node(out, child)?;
            }
        }
        Node::Scalar(Scalar::Int(v)) => {
            rmp::encode::write_sint(out, *v).map_err(write_err)?;
        }
        Node::Scalar(Scalar::Float(v)) => {
            rmp::encode::write_f64(out, *v).map_err(write_err)?;
        }
        Node::Scalar(Scalar::Str(s)) => {
            rmp::encode::write_str(out, s).map_err(write_err)?;
        }
        Node::Array(NumericArray::Int(values)) if values.is_empty() => {
            rmp::encode::write_ext_meta(out, 0, EMPTY_INT_ARRAY_EXT).map_err(write_err)?;
        }
        Node::Array(NumericArray::Int(values)) => {
            rmp::encode::write_array_len(out, values.len() as u32).map_err(write_err)?;
            for v in values {
                rmp::encode::write_sint(out, *v as i64).map_err(write_err)?;
            }
        }
        Node::Array(NumericArray::Float(values)) => {
            rmp::encode::write_array_len(out, values.len() as u32).map_err(write_err)?;
            for v in values {
                rmp::encode::write_f32(out, *v).map_err(write_err)?;
            }
        }
        Node::Record(bytes) => {
            rmp::encode::write_bin(out, bytes).map_err(write_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Node {
        let mut root = Node::group();
        root.insert_path("/FileVersion", Node::Scalar(Scalar::Int(5)))
            .unwrap();
        root.insert_path("/1/Header/XSTEP", Node::Scalar(Scalar::Float(0.25)))
            .unwrap();
        root.insert_path("/1/Header/GRID", Node::Scalar(Scalar::Str("HexGrid".into())))
            .unwrap();
        root.insert_path(
            "/1/Data/PhaseData",
            Node::Array(NumericArray::Int(vec![1, 2, -1, 300_000])),
        )
        .unwrap();
        root.insert_path(
            "/1/Data/CI",
            Node::Array(NumericArray::Float(vec![0.5, 0.25, 1.0, 0.0])),
        )
        .unwrap();
        root.insert_path("/1/Header/Phases/1/HKLFamilies/0", Node::Record(vec![7u8; 24]))
            .unwrap();
        root
    }

    #[test]
    fn encode_decode_tree() {
        let root = tree();
        let bytes = encode(&root).unwrap();
        assert_eq!(decode(&bytes).unwrap(), root);
    }

    #[test]
    fn mixed_array_becomes_float() {
        let mut bytes = Vec::new();
        rmp::encode::write_map_len(&mut bytes, 1).unwrap();
        rmp::encode::write_str(&mut bytes, "a").unwrap();
        rmp::encode::write_array_len(&mut bytes, 2).unwrap();
        rmp::encode::write_sint(&mut bytes, 1).unwrap();
        rmp::encode::write_f64(&mut bytes, 2.5).unwrap();

        let root = decode(&bytes).unwrap();
        assert_eq!(
            root.child("a"),
            Some(&Node::Array(NumericArray::Float(vec![1.0, 2.5])))
        );
    }

    #[test]
    fn non_map_root_is_rejected() {
        let mut bytes = Vec::new();
        rmp::encode::write_sint(&mut bytes, 1).unwrap();
        assert!(matches!(decode(&bytes), Err(ContainerError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let bytes = encode(&tree()).unwrap();
        assert!(decode(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn oversized_lengths_fail_without_allocating() {
        // {"a": array32 of 2^32 - 1 elements} with no elements present
        let array = [0x81, 0xa1, b'a', 0xdd, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&array), Err(ContainerError::InvalidFormat(_))));

        let map = [0xdf, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&map), Err(ContainerError::InvalidFormat(_))));

        let bin = [0x81, 0xa1, b'a', 0xc6, 0xff, 0xff, 0xff, 0xff, 0x00];
        assert!(matches!(decode(&bin), Err(ContainerError::InvalidFormat(_))));

        let string = [0x81, 0xa1, b'a', 0xdb, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(decode(&string), Err(ContainerError::InvalidFormat(_))));
    }

    #[test]
    fn empty_arrays_keep_their_type() {
        let mut root = Node::group();
        root.insert_path("/Categories", Node::Array(NumericArray::Int(Vec::new())))
            .unwrap();
        root.insert_path("/CI", Node::Array(NumericArray::Float(Vec::new())))
            .unwrap();
        let bytes = encode(&root).unwrap();
        assert_eq!(decode(&bytes).unwrap(), root);

        // a plain empty array has no element type
        let mut bytes = Vec::new();
        rmp::encode::write_map_len(&mut bytes, 1).unwrap();
        rmp::encode::write_str(&mut bytes, "a").unwrap();
        rmp::encode::write_array_len(&mut bytes, 0).unwrap();
        assert_eq!(
            decode(&bytes).unwrap().child("a"),
            Some(&Node::Array(NumericArray::Float(Vec::new())))
        );
    }

    #[test]
    fn unknown_ext_is_rejected() {
        let mut bytes = Vec::new();
        rmp::encode::write_map_len(&mut bytes, 1).unwrap();
        rmp::encode::write_str(&mut bytes, "a").unwrap();
        rmp::encode::write_ext_meta(&mut bytes, 0, 7).unwrap();
        assert!(matches!(decode(&bytes), Err(ContainerError::InvalidFormat(_))));
    }
}
