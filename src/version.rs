//! Structural version strings and hashes.
//!
//! A type's version string lists its origin name followed by `+field:shape` for
//! every field in name order. Nested composites are expanded in braces, enums list
//! their members, and a type already expanded earlier in the same walk is written
//! as `{Type+...}`, which keeps cyclic graphs finite. The MD5 digest of
//! `prefix + versionString` is read as two big-endian `i64`; the first one is the
//! `packetHash` written in front of every serialized packet.

use crate::ast::origin_name;
use crate::error::SchemaError;
use crate::resolve::{FieldKind, ResolvedSchema, TypeId};
use byteorder::{BigEndian, ByteOrder};
use md5::{Digest, Md5};
use std::collections::HashSet;
use std::fmt;

/// Composite nesting allowed while building one version string.
pub const MAX_HASH_DEPTH: usize = 256;

/// 128-bit structural digest, split in two signed halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SchemaVersion {
    pub packet_hash: i64,
    pub second_half: i64,
}

impl SchemaVersion {
    pub fn from_digest(digest: &[u8; 16]) -> Self {
        SchemaVersion {
            packet_hash: BigEndian::read_i64(&digest[..8]),
            second_half: BigEndian::read_i64(&digest[8..]),
        }
    }

    /// Hash `prefix + text` with MD5.
    pub fn of(prefix: &str, text: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(prefix.as_bytes());
        hasher.update(text.as_bytes());
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&hasher.finalize());
        SchemaVersion::from_digest(&digest)
    }

    /// Uppercase, unpadded hex of `packet_hash` read as unsigned; the suffix of deprecated names.
    pub fn hex(&self) -> String {
        format!("{:X}", self.packet_hash as u64)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}{:016X}", self.packet_hash as u64, self.second_half as u64)
    }
}

/// Canonical structural string of a packet type.
pub fn version_string(schema: &ResolvedSchema, id: TypeId) -> Result<String, SchemaError> {
    let mut out = String::new();
    let mut seen = HashSet::new();
    walk(schema, id, &mut seen, 0, &mut out)?;
    Ok(out)
}

/// `MD5(prefix + version_string)`.
pub fn version_hash(schema: &ResolvedSchema, id: TypeId, prefix: &str) -> Result<SchemaVersion, SchemaError> {
    Ok(SchemaVersion::of(prefix, &version_string(schema, id)?))
}

/// Version of an enum shape, used to name deprecated enum forks. Members are
/// walked like untyped fields, `Origin+m1:+m2:...` in name order.
pub fn enum_version(origin: &str, members: &[String]) -> SchemaVersion {
    SchemaVersion::of("", &enum_version_string(origin, members))
}

pub fn enum_version_string(origin: &str, members: &[String]) -> String {
    let mut sorted: Vec<&str> = members.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut text = origin.to_string();
    for m in sorted {
        text.push('+');
        text.push_str(m);
        text.push(':');
    }
    text
}

/// XOR-fold of packet hashes; order independent.
pub fn fold_api_version<I: IntoIterator<Item = i64>>(hashes: I) -> i64 {
    hashes.into_iter().fold(0, |acc, h| acc ^ h)
}

fn walk(
    schema: &ResolvedSchema,
    id: TypeId,
    seen: &mut HashSet<String>,
    depth: usize,
    out: &mut String,
) -> Result<(), SchemaError> {
    let packet = schema
        .packet(id)
        .ok_or_else(|| SchemaError::new("Version of a non-packet type").with_what(schema.name_of(id)))?;
    if depth > MAX_HASH_DEPTH {
        return Err(SchemaError::new("Type graph too deep to hash")
            .with_what(packet.name.clone())
            .at(&packet.location));
    }
    out.push_str(&packet.origin_name);
    seen.insert(packet.name.clone());

    for field in packet.sorted_fields() {
        out.push('+');
        out.push_str(origin_name(&field.name));
        out.push(':');
        let list = if field.is_list { "[]" } else { "" };
        if seen.contains(&field.type_name) {
            out.push_str(&format!("{{{}{}+...}}", list, field.type_name));
            continue;
        }
        match field.kind {
            FieldKind::Primitive(p) => {
                out.push_str(list);
                out.push_str(p.name());
            }
            FieldKind::Enum(e) => {
                out.push_str(list);
                out.push('{');
                out.push_str(&field.type_name);
                if let Some(en) = schema.enum_type(e) {
                    for m in &en.members {
                        out.push('+');
                        out.push_str(m);
                    }
                }
                out.push('}');
            }
            FieldKind::Composite(c) | FieldKind::Abstract(c) => {
                out.push('{');
                out.push_str(list);
                walk(schema, c, seen, depth + 1, out)?;
                out.push('}');
            }
        }
    }
    Ok(())
}
