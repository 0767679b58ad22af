//! Type resolution and validation.
//!
//! Turns a parsed [`Schema`] into a [`ResolvedSchema`]: every type (top-level or
//! nested) gets a [`TypeId`] in one arena, every field gets a [`FieldKind`], and
//! every concrete packet gets its [`SchemaVersion`]. All checks are fatal.

use crate::ast::*;
use crate::error::SchemaError;
use crate::version::{self, SchemaVersion};
use log::debug;
use std::collections::HashMap;

/// Index of a type in [`ResolvedSchema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

/// What a field's type resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Built-in type, `packet` included.
    Primitive(Primitive),
    Enum(TypeId),
    /// Concrete packet type, nested or top-level; encoded without a header.
    Composite(TypeId),
    /// Abstract tag; holds any packet declaring it, encoded with a header.
    Abstract(TypeId),
}

impl FieldKind {
    /// Encoded with an 8-byte header, like the generic `packet` primitive.
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, FieldKind::Primitive(Primitive::Packet) | FieldKind::Abstract(_))
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: String,
    pub type_name: String,
    pub kind: FieldKind,
    pub is_list: bool,
    pub docstring: Vec<String>,
    pub location: Location,
}

impl ResolvedField {
    /// Scalar booleans are bit-packed ahead of every other field.
    pub fn is_packed_bool(&self) -> bool {
        !self.is_list && self.kind == FieldKind::Primitive(Primitive::Bool)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConversion {
    pub from: TypeId,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PacketType {
    pub name: String,
    pub origin_name: String,
    pub docstring: Vec<String>,
    pub tags: Vec<String>,
    pub is_abstract: bool,
    /// Declaration order.
    pub fields: Vec<ResolvedField>,
    /// Indices into `fields`, by field name.
    sorted: Vec<usize>,
    /// Top-level type owning a nested one.
    pub owner: Option<TypeId>,
    pub inner: Vec<TypeId>,
    pub enums: Vec<TypeId>,
    pub conversions: Vec<ResolvedConversion>,
    /// `None` for abstract types.
    pub version: Option<SchemaVersion>,
    pub location: Location,
}

impl PacketType {
    pub fn sorted_fields(&self) -> impl Iterator<Item = &ResolvedField> + '_ {
        self.sorted.iter().map(move |&i| &self.fields[i])
    }

    /// Fields by name, with their declaration index.
    pub fn sorted_indexed(&self) -> impl Iterator<Item = (usize, &ResolvedField)> + '_ {
        self.sorted.iter().map(move |&i| (i, &self.fields[i]))
    }

    /// Encode order: scalar booleans, then every other field, each group by name.
    pub fn wire_fields(&self) -> impl Iterator<Item = (usize, &ResolvedField)> + '_ {
        let bools = self.sorted.iter().filter(move |&&i| self.fields[i].is_packed_bool());
        let rest = self.sorted.iter().filter(move |&&i| !self.fields[i].is_packed_bool());
        bools.chain(rest).map(move |&i| (i, &self.fields[i]))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn packet_hash(&self) -> i64 {
        self.version.map_or(0, |v| v.packet_hash)
    }

    pub fn is_deprecated(&self) -> bool {
        self.name != self.origin_name
    }
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub origin_name: String,
    pub members: Vec<String>,
    pub docstring: Vec<String>,
    pub owner: Option<TypeId>,
    pub location: Location,
}

impl EnumType {
    /// 1 byte up to 256 members, 2 bytes for a large enum.
    pub fn wire_width(&self) -> usize {
        if self.members.len() <= 256 {
            1
        } else {
            2
        }
    }

    pub fn ordinal(&self, member: &str) -> Option<u16> {
        self.members
            .iter()
            .position(|m| m == member)
            .and_then(|i| u16::try_from(i).ok())
    }

    pub fn member(&self, ordinal: u16) -> Option<&str> {
        self.members.get(ordinal as usize).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub enum TypeEntry {
    Packet(PacketType),
    Enum(EnumType),
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        match self {
            TypeEntry::Packet(p) => &p.name,
            TypeEntry::Enum(e) => &e.name,
        }
    }
}

/// Fully validated type set of one compile.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    types: Vec<TypeEntry>,
    top_level: Vec<TypeId>,
    by_name: HashMap<String, TypeId>,
    by_hash: HashMap<i64, TypeId>,
    api_version: i64,
    annotations: HashMap<String, String>,
}

/// Raw field and conversion lines waiting for every type id to exist.
struct Pending {
    id: TypeId,
    top: TypeId,
    fields: Vec<FieldDefinition>,
    conversions: Vec<Conversion>,
}

impl ResolvedSchema {
    pub fn resolve(schema: Schema) -> Result<Self, SchemaError> {
        let mut resolved = ResolvedSchema {
            types: Vec::new(),
            top_level: Vec::new(),
            by_name: HashMap::new(),
            by_hash: HashMap::new(),
            api_version: 0,
            annotations: schema.annotations,
        };
        let mut pending = Vec::new();
        for definition in schema.definitions {
            resolved.allocate(definition, &mut pending)?;
        }
        for p in pending.iter() {
            resolved.resolve_fields(p)?;
        }
        resolved.compute_versions()?;
        resolved.check_deprecated_names()?;
        resolved.check_propagation()?;
        for p in pending.iter() {
            resolved.resolve_conversions(p)?;
        }
        resolved.api_version = version::fold_api_version(
            resolved
                .top_level
                .iter()
                .filter_map(|&id| resolved.packet(id))
                .filter(|p| !p.is_deprecated())
                .map(PacketType::packet_hash),
        );
        debug!(
            "resolved {} types, apiVersion {}",
            resolved.types.len(),
            resolved.api_version
        );
        Ok(resolved)
    }

    fn push(&mut self, entry: TypeEntry) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(entry);
        id
    }

    fn allocate(&mut self, definition: Definition, pending: &mut Vec<Pending>) -> Result<(), SchemaError> {
        let id = match definition {
            Definition::Enum(e) => self.push(TypeEntry::Enum(enum_type(e, None))),
            Definition::Packet(p) => self.allocate_packet(p, None, pending),
        };
        let name = self.name_of(id).to_string();
        if self.by_name.insert(name.clone(), id).is_some() {
            return Err(SchemaError::new("Duplicate Packet name").with_what(name));
        }
        self.top_level.push(id);
        Ok(())
    }

    fn allocate_packet(&mut self, p: PacketDefinition, owner: Option<TypeId>, pending: &mut Vec<Pending>) -> TypeId {
        let id = self.push(TypeEntry::Packet(PacketType {
            name: p.name,
            origin_name: p.origin_name,
            docstring: p.docstring,
            tags: p.tags,
            is_abstract: p.is_abstract,
            fields: Vec::new(),
            sorted: Vec::new(),
            owner,
            inner: Vec::new(),
            enums: Vec::new(),
            conversions: Vec::new(),
            version: None,
            location: p.location,
        }));
        let top = owner.unwrap_or(id);
        pending.push(Pending {
            id,
            top,
            fields: p.fields,
            conversions: p.conversions,
        });
        let enums: Vec<TypeId> = p
            .enums
            .into_iter()
            .map(|e| self.push(TypeEntry::Enum(enum_type(e, Some(id)))))
            .collect();
        let inner: Vec<TypeId> = p
            .inner
            .into_iter()
            .map(|i| self.allocate_packet(i, Some(id), pending))
            .collect();
        if let Some(TypeEntry::Packet(packet)) = self.types.get_mut(id.0) {
            packet.enums = enums;
            packet.inner = inner;
        }
        id
    }

    /// Primitive, then the owner's nested enums and types, then top-level names.
    fn lookup(&self, type_name: &str, top: TypeId) -> Option<FieldKind> {
        if let Some(p) = Primitive::from_name(type_name) {
            return Some(FieldKind::Primitive(p));
        }
        if let Some(owner) = self.packet(top) {
            if let Some(&e) = owner.enums.iter().find(|&&e| self.name_of(e) == type_name) {
                return Some(FieldKind::Enum(e));
            }
            if let Some(&i) = owner.inner.iter().find(|&&i| self.name_of(i) == type_name) {
                return Some(FieldKind::Composite(i));
            }
        }
        let id = *self.by_name.get(type_name)?;
        Some(match &self.types[id.0] {
            TypeEntry::Enum(_) => FieldKind::Enum(id),
            TypeEntry::Packet(p) if p.is_abstract => FieldKind::Abstract(id),
            TypeEntry::Packet(_) => FieldKind::Composite(id),
        })
    }

    fn resolve_fields(&mut self, pending: &Pending) -> Result<(), SchemaError> {
        let mut fields = Vec::with_capacity(pending.fields.len());
        for f in &pending.fields {
            let kind = self.lookup(&f.type_name, pending.top).ok_or_else(|| {
                SchemaError::new("Packet field has unknown type")
                    .with_what(format!("{} {}", f.name, f.type_name))
                    .at(&f.location)
            })?;
            fields.push(ResolvedField {
                name: f.name.clone(),
                type_name: f.type_name.clone(),
                kind,
                is_list: f.is_list,
                docstring: f.docstring.clone(),
                location: f.location.clone(),
            });
        }
        let mut sorted: Vec<usize> = (0..fields.len()).collect();
        sorted.sort_by(|&a, &b| fields[a].name.cmp(&fields[b].name));
        if let Some(TypeEntry::Packet(packet)) = self.types.get_mut(pending.id.0) {
            packet.fields = fields;
            packet.sorted = sorted;
        }
        Ok(())
    }

    fn compute_versions(&mut self) -> Result<(), SchemaError> {
        for index in 0..self.types.len() {
            let id = TypeId(index);
            let concrete = matches!(&self.types[index], TypeEntry::Packet(p) if !p.is_abstract);
            if !concrete {
                continue;
            }
            let v = version::version_hash(self, id, "")?;
            if let Some(TypeEntry::Packet(p)) = self.types.get_mut(index) {
                p.version = Some(v);
                if p.owner.is_none() {
                    self.by_hash.insert(v.packet_hash, id);
                }
            }
        }
        Ok(())
    }

    /// Deprecated forks must be named `Origin__<HEX>` after their own hash.
    fn check_deprecated_names(&self) -> Result<(), SchemaError> {
        for &id in &self.top_level {
            let (name, origin, version, location) = match &self.types[id.0] {
                TypeEntry::Packet(p) => (&p.name, &p.origin_name, p.version, &p.location),
                TypeEntry::Enum(e) => (
                    &e.name,
                    &e.origin_name,
                    Some(version::enum_version(&e.origin_name, &e.members)),
                    &e.location,
                ),
            };
            if name == origin {
                continue;
            }
            let expected = format!(
                "{}{}{}",
                origin,
                DEPRECATION_MARKER,
                version.map(|v| v.hex()).unwrap_or_default()
            );
            if *name != expected {
                return Err(SchemaError::new("Deprecated packet named with wrong hex version")
                    .with_what(format!("{} should be {}", name, expected))
                    .at(location));
            }
        }
        Ok(())
    }

    /// A type referencing an origin that has deprecated forks needs a fork of its own.
    fn check_propagation(&self) -> Result<(), SchemaError> {
        let forked: Vec<&str> = self
            .top_level
            .iter()
            .map(|&id| &self.types[id.0])
            .filter_map(|t| match t {
                TypeEntry::Packet(p) if p.is_deprecated() => Some(p.origin_name.as_str()),
                TypeEntry::Enum(e) if e.name != e.origin_name => Some(e.origin_name.as_str()),
                _ => None,
            })
            .collect();
        if forked.is_empty() {
            return Ok(());
        }
        for &top in &self.top_level {
            let Some(packet) = self.packet(top) else { continue };
            if forked.contains(&packet.origin_name.as_str()) {
                continue;
            }
            let owned = std::iter::once(packet).chain(packet.inner.iter().filter_map(|&i| self.packet(i)));
            for p in owned {
                if let Some(f) = p.fields.iter().find(|f| forked.contains(&f.type_name.as_str())) {
                    return Err(SchemaError::new(
                        "Packet has field potentially deprecated but does not have its own deprecated version",
                    )
                    .with_what(format!("{} {}", f.name, f.type_name))
                    .at(&f.location));
                }
            }
        }
        Ok(())
    }

    fn resolve_conversions(&mut self, pending: &Pending) -> Result<(), SchemaError> {
        let mut conversions = Vec::new();
        for c in &pending.conversions {
            let from = match self.by_name.get(&c.type_name) {
                Some(&id) if self.packet(id).map_or(false, |p| !p.is_abstract) => id,
                _ => {
                    return Err(SchemaError::new("Converter from unknown type")
                        .with_what(c.type_name.clone())
                        .at(&c.location))
                }
            };
            let (Some(target), Some(source)) = (self.packet(pending.id), self.packet(from)) else {
                continue;
            };
            for sf in &source.fields {
                let matching = target
                    .fields
                    .iter()
                    .find(|tf| tf.name == sf.name && tf.is_list == sf.is_list && tf.type_name == sf.type_name);
                if matching.is_none() {
                    return Err(SchemaError::new("Converter field not found in target")
                        .with_what(format!("{}.{}", target.name, sf.name))
                        .at(&c.location));
                }
            }
            conversions.push(ResolvedConversion {
                from,
                options: c.options.clone(),
            });
        }
        if let Some(TypeEntry::Packet(p)) = self.types.get_mut(pending.id.0) {
            p.conversions = conversions;
        }
        Ok(())
    }

    pub fn api_version(&self) -> i64 {
        self.api_version
    }

    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    /// Top-level types in declaration order.
    pub fn top_level(&self) -> &[TypeId] {
        &self.top_level
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn entry(&self, id: TypeId) -> Option<&TypeEntry> {
        self.types.get(id.0)
    }

    /// Every type, nested ones included, in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    pub fn name_of(&self, id: TypeId) -> &str {
        self.types.get(id.0).map_or("", TypeEntry::name)
    }

    pub fn packet(&self, id: TypeId) -> Option<&PacketType> {
        match self.types.get(id.0) {
            Some(TypeEntry::Packet(p)) => Some(p),
            _ => None,
        }
    }

    pub fn enum_type(&self, id: TypeId) -> Option<&EnumType> {
        match self.types.get(id.0) {
            Some(TypeEntry::Enum(e)) => Some(e),
            _ => None,
        }
    }

    /// Top-level name, or `Owner.Nested` for a nested type or enum.
    pub fn find(&self, path: &str) -> Option<TypeId> {
        match path.split_once('.') {
            None => self.by_name.get(path).copied(),
            Some((owner, nested)) => {
                let owner = self.packet(*self.by_name.get(owner)?)?;
                owner
                    .inner
                    .iter()
                    .chain(owner.enums.iter())
                    .copied()
                    .find(|&id| self.name_of(id) == nested)
            }
        }
    }

    /// Top-level concrete packet with this hash.
    pub fn find_by_hash(&self, packet_hash: i64) -> Option<TypeId> {
        self.by_hash.get(&packet_hash).copied()
    }

    pub fn version_string(&self, id: TypeId) -> Result<String, SchemaError> {
        version::version_string(self, id)
    }

    /// Every top-level concrete packet (deprecated forks included).
    pub fn concrete_packets(&self) -> impl Iterator<Item = (TypeId, &PacketType)> + '_ {
        self.top_level
            .iter()
            .filter_map(move |&id| self.packet(id).map(|p| (id, p)))
            .filter(|(_, p)| !p.is_abstract)
    }
}

fn enum_type(e: EnumDefinition, owner: Option<TypeId>) -> EnumType {
    EnumType {
        name: e.name,
        origin_name: e.origin_name,
        members: e.members.into_iter().map(|m| m.name).collect(),
        docstring: e.docstring,
        owner,
        location: e.location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn resolve(src: &str) -> Result<ResolvedSchema, SchemaError> {
        ResolvedSchema::resolve(parse(src)?)
    }

    #[test]
    fn nested_names_shadow_top_level() {
        let r = resolve("Item:\n  a int\n\nBox:\n  item Item\n  Item:\n    b long\n").expect("resolve");
        let boxed = r.packet(r.find("Box").expect("Box")).expect("packet");
        match boxed.fields[0].kind {
            FieldKind::Composite(id) => assert_eq!(Some(id), r.find("Box.Item")),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn wire_fields_put_scalar_bools_first() {
        let r = resolve("P:\n  z bool\n  a int\n  b bool\n  c bool list\n").expect("resolve");
        let p = r.packet(r.find("P").expect("P")).expect("packet");
        let order: Vec<&str> = p.wire_fields().map(|(_, f)| f.name.as_str()).collect();
        assert_eq!(order, ["b", "z", "a", "c"]);
    }

    #[test]
    fn unknown_type_is_fatal() {
        let err = resolve("P:\n  a Missing\n").unwrap_err();
        assert_eq!(err.message, "Packet field has unknown type");
        assert_eq!(err.what.as_deref(), Some("a Missing"));
        assert_eq!(err.location.map(|l| l.line), Some(2));
    }

    #[test]
    fn lookups_outside_the_arena_are_empty() {
        let r = resolve("P:\n  a int\n\n  I:\n    b int\n").expect("resolve");
        assert_eq!(r.ids().count(), r.len());
        let stray = TypeId(r.len());
        assert!(r.entry(stray).is_none());
        assert!(r.packet(stray).is_none());
        assert_eq!(r.name_of(stray), "");
    }

    #[test]
    fn large_enum_width() {
        let members: Vec<String> = (0..257).map(|i| format!("M{}", i)).collect();
        let src = format!("Big: enum\n  {}\n", members.join(", "));
        let r = resolve(&src).expect("resolve");
        let e = r.enum_type(r.find("Big").expect("Big")).expect("enum");
        assert_eq!(e.wire_width(), 2);
        assert_eq!(e.ordinal("M256"), Some(256));
    }
}
