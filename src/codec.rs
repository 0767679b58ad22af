//! Schema-driven encode/decode.
//!
//! [`Codec`] wraps a [`ResolvedSchema`] and hands out [`DynamicPacket`]s: packet
//! instances whose field layout comes from the schema at runtime. Setters check
//! every value against the declared field type before storing it, so a packet
//! can only ever hold values its wire rules can encode.
//!
//! Body layout, in field-name order: scalar booleans packed 8 per byte first,
//! then every other field. Optional composites carry a presence byte, composite
//! list elements carry nothing, and `packet`/abstract fields carry an 8-byte
//! header (0 when empty).

use crate::ast::Primitive;
use crate::packet::{packet_eq, write_packet, BluePacket, FieldTypeError};
use crate::registry::{Registry, RegistryError};
use crate::render::{self, Shape};
use crate::resolve::{FieldKind, PacketType, ResolvedField, ResolvedSchema, TypeId};
use crate::value::Value;
use crate::wire::{PacketReader, PacketWriter, MAX_EMPTY_ELEMENTS};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Truncated buffer at offset {0}")]
    Truncated(usize),
    #[error("Malformed length: {0}")]
    MalformedLength(i32),
    #[error("Length too large to encode: {0}")]
    LengthOverflow(usize),
    #[error("Enum ordinal {0} does not fit one byte")]
    OrdinalTooWide(u16),
    #[error("Unknown packet hash 0x{0:016X}")]
    UnknownPacket(i64),
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("Unknown field: {0}")]
    UnknownField(String),
    #[error(transparent)]
    FieldType(#[from] FieldTypeError),
    #[error("Invalid ordinal {ordinal} for enum {name}")]
    InvalidEnumOrdinal { name: String, ordinal: u16 },
    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("Packets nested deeper than {0}")]
    TooDeep(usize),
    #[error("No conversion from {from} to {to}")]
    NoConversion { from: String, to: String },
}

/// Entry point for schema-driven packets.
#[derive(Debug, Clone)]
pub struct Codec {
    schema: Arc<ResolvedSchema>,
}

impl Codec {
    pub fn new(schema: ResolvedSchema) -> Self {
        Codec {
            schema: Arc::new(schema),
        }
    }

    pub fn schema(&self) -> &ResolvedSchema {
        &self.schema
    }

    /// Default instance of a concrete type, by name or `Owner.Nested`.
    pub fn new_packet(&self, name: &str) -> Result<DynamicPacket, CodecError> {
        let id = self
            .schema
            .find(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_string()))?;
        DynamicPacket::new(Arc::clone(&self.schema), id)
    }

    /// Registry of every top-level concrete packet of the schema.
    pub fn registry(&self) -> Result<Registry, RegistryError> {
        let mut registry = Registry::new();
        self.register_into(&mut registry)?;
        Ok(registry)
    }

    pub fn register_into(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        for (id, _) in self.schema.concrete_packets() {
            let schema = Arc::clone(&self.schema);
            registry.register_with(move || {
                Box::new(DynamicPacket::with_defaults(Arc::clone(&schema), id)) as Box<dyn BluePacket>
            })?;
        }
        Ok(())
    }

    /// New `target` instance filled from the same-named fields of `source`.
    /// `target` must declare `convert <source type>`.
    pub fn convert(&self, target: &str, source: &DynamicPacket) -> Result<DynamicPacket, CodecError> {
        let mut out = self.new_packet(target)?;
        let declared = out
            .packet_type()
            .map_or(false, |p| p.conversions.iter().any(|c| c.from == source.type_id));
        if !declared {
            return Err(CodecError::NoConversion {
                from: source.type_name().to_string(),
                to: target.to_string(),
            });
        }
        if let Some(src) = source.packet_type() {
            for (field, value) in src.fields.iter().zip(&source.values) {
                out.set(&field.name, value.clone())?;
            }
        }
        Ok(out)
    }
}

/// A packet instance laid out by a resolved schema type.
#[derive(Clone)]
pub struct DynamicPacket {
    schema: Arc<ResolvedSchema>,
    type_id: TypeId,
    /// Parallel to the type's declared fields.
    values: Vec<Value>,
}

fn default_value(field: &ResolvedField) -> Value {
    if field.is_list {
        return Value::List(Vec::new());
    }
    match field.kind {
        FieldKind::Primitive(p) => match p {
            Primitive::Bool => Value::Bool(false),
            Primitive::Byte => Value::Byte(0),
            Primitive::UByte => Value::UByte(0),
            Primitive::Short => Value::Short(0),
            Primitive::UShort => Value::UShort(0),
            Primitive::Int => Value::Int(0),
            Primitive::Long => Value::Long(0),
            Primitive::Float => Value::Float(0.0),
            Primitive::Double => Value::Double(0.0),
            Primitive::String => Value::String(String::new()),
            Primitive::Packet => Value::Packet(None),
        },
        FieldKind::Enum(_) => Value::Enum(0),
        FieldKind::Composite(_) | FieldKind::Abstract(_) => Value::Packet(None),
    }
}

impl DynamicPacket {
    pub fn new(schema: Arc<ResolvedSchema>, type_id: TypeId) -> Result<Self, CodecError> {
        let concrete = schema.packet(type_id).map_or(false, |p| !p.is_abstract);
        if !concrete {
            return Err(CodecError::UnknownType(schema.name_of(type_id).to_string()));
        }
        Ok(Self::with_defaults(schema, type_id))
    }

    fn with_defaults(schema: Arc<ResolvedSchema>, type_id: TypeId) -> Self {
        let values = schema
            .packet(type_id)
            .map(|p| p.fields.iter().map(default_value).collect())
            .unwrap_or_default();
        DynamicPacket {
            schema,
            type_id,
            values,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn packet_type(&self) -> Option<&PacketType> {
        self.schema.packet(self.type_id)
    }

    fn field(&self, name: &str) -> Result<(usize, &ResolvedField), CodecError> {
        self.packet_type()
            .and_then(|p| p.field_index(name).map(|i| (i, &p.fields[i])))
            .ok_or_else(|| CodecError::UnknownField(format!("{}.{}", self.type_name(), name)))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let index = self.packet_type()?.field_index(name)?;
        self.values.get(index)
    }

    /// Nested schema-driven packet held by a composite or `packet` field.
    pub fn get_packet(&self, name: &str) -> Option<&DynamicPacket> {
        self.get(name)?.as_dynamic()
    }

    /// Member name of an enum field.
    pub fn enum_name(&self, name: &str) -> Option<&str> {
        let (index, field) = self.field(name).ok()?;
        let FieldKind::Enum(e) = field.kind else { return None };
        let ordinal = self.values.get(index)?.as_ordinal()?;
        self.schema.enum_type(e)?.member(ordinal)
    }

    /// Store a value after checking it against the declared field type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CodecError> {
        let (index, field) = self.field(name)?;
        let checked = coerce_field(&self.schema, field, value.into())?;
        self.values[index] = checked;
        Ok(())
    }

    /// Set an enum field by member name.
    pub fn set_enum(&mut self, name: &str, member: &str) -> Result<(), CodecError> {
        self.set(name, Value::String(member.to_string()))
    }

    /// Append one element to a list field.
    pub fn push(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CodecError> {
        let (index, field) = self.field(name)?;
        let value = value.into();
        if !field.is_list {
            return Err(FieldTypeError::new(field.type_name.clone(), value).into());
        }
        let checked = coerce_element(&self.schema, field, value)
            .map_err(|v| FieldTypeError::new(format!("{} in list", field.type_name), v))?;
        if let Some(Value::List(items)) = self.values.get_mut(index) {
            items.push(checked);
        }
        Ok(())
    }

    /// Default instance of the composite type of a field, ready to be set into it.
    pub fn new_composite(&self, name: &str) -> Result<DynamicPacket, CodecError> {
        let (_, field) = self.field(name)?;
        match field.kind {
            FieldKind::Composite(id) => DynamicPacket::new(Arc::clone(&self.schema), id),
            _ => Err(CodecError::UnknownType(field.type_name.clone())),
        }
    }

    fn write_field(&self, w: &mut PacketWriter, field: &ResolvedField, value: &Value) -> Result<(), CodecError> {
        if field.is_list {
            let items = value.as_list().unwrap_or(&[]);
            if field.kind == FieldKind::Primitive(Primitive::Bool) {
                let bits: Vec<bool> = items.iter().map(|v| v.as_bool().unwrap_or(false)).collect();
                return w.write_bool_list(&bits);
            }
            if is_zero_width(&self.schema, field) && items.len() > MAX_EMPTY_ELEMENTS {
                return Err(CodecError::LengthOverflow(items.len()));
            }
            w.write_len(items.len())?;
            for item in items {
                self.write_element(w, field, item)?;
            }
            return Ok(());
        }
        if let FieldKind::Composite(_) = field.kind {
            return match value.as_packet() {
                None => w.write_u8(0),
                Some(p) => {
                    w.write_u8(1)?;
                    p.serialize_data(w)
                }
            };
        }
        self.write_element(w, field, value)
    }

    fn write_element(&self, w: &mut PacketWriter, field: &ResolvedField, value: &Value) -> Result<(), CodecError> {
        match (field.kind, value) {
            (FieldKind::Primitive(Primitive::Bool), Value::Bool(b)) => w.write_u8(*b as u8),
            (FieldKind::Primitive(Primitive::Byte), Value::Byte(x)) => w.write_i8(*x),
            (FieldKind::Primitive(Primitive::UByte), Value::UByte(x)) => w.write_u8(*x),
            (FieldKind::Primitive(Primitive::Short), Value::Short(x)) => w.write_i16(*x),
            (FieldKind::Primitive(Primitive::UShort), Value::UShort(x)) => w.write_u16(*x),
            (FieldKind::Primitive(Primitive::Int), Value::Int(x)) => w.write_i32(*x),
            (FieldKind::Primitive(Primitive::Long), Value::Long(x)) => w.write_i64(*x),
            (FieldKind::Primitive(Primitive::Float), Value::Float(x)) => w.write_f32(*x),
            (FieldKind::Primitive(Primitive::Double), Value::Double(x)) => w.write_f64(*x),
            (FieldKind::Primitive(Primitive::String), Value::String(s)) => w.write_str(s),
            (FieldKind::Primitive(Primitive::Packet), Value::Packet(p)) | (FieldKind::Abstract(_), Value::Packet(p)) => {
                write_packet(w, p.as_deref())
            }
            (FieldKind::Enum(e), Value::Enum(o)) => {
                let width = self.schema.enum_type(e).map_or(1, |en| en.wire_width());
                w.write_enum(*o, width)
            }
            (FieldKind::Composite(_), Value::Packet(Some(p))) => p.serialize_data(w),
            _ => Err(FieldTypeError::new(field.type_name.clone(), value.clone()).into()),
        }
    }
}

fn read_field(
    schema: &Arc<ResolvedSchema>,
    registry: &Registry,
    r: &mut PacketReader<'_>,
    field: &ResolvedField,
) -> Result<Value, CodecError> {
    if field.is_list {
        if field.kind == FieldKind::Primitive(Primitive::Bool) {
            return Ok(Value::List(r.read_bool_list()?.into_iter().map(Value::Bool).collect()));
        }
        let len = r.read_len()?;
        if is_zero_width(schema, field) {
            if len > MAX_EMPTY_ELEMENTS {
                return Err(CodecError::MalformedLength(i32::try_from(len).unwrap_or(i32::MAX)));
            }
        } else if len > r.remaining() {
            return Err(CodecError::Truncated(r.position()));
        }
        let mut items = Vec::with_capacity(len.min(r.remaining()));
        for _ in 0..len {
            items.push(read_element(schema, registry, r, field)?);
        }
        return Ok(Value::List(items));
    }
    if let FieldKind::Composite(_) = field.kind {
        if r.read_u8()? == 0 {
            return Ok(Value::Packet(None));
        }
    }
    read_element(schema, registry, r, field)
}

/// Elements of a field-less composite occupy no bytes; every other element takes at least one.
fn is_zero_width(schema: &ResolvedSchema, field: &ResolvedField) -> bool {
    match field.kind {
        FieldKind::Composite(id) => schema.packet(id).map_or(false, |p| p.fields.is_empty()),
        _ => false,
    }
}

fn read_element(
    schema: &Arc<ResolvedSchema>,
    registry: &Registry,
    r: &mut PacketReader<'_>,
    field: &ResolvedField,
) -> Result<Value, CodecError> {
    Ok(match field.kind {
        FieldKind::Primitive(p) => match p {
            Primitive::Bool => Value::Bool(r.read_u8()? != 0),
            Primitive::Byte => Value::Byte(r.read_i8()?),
            Primitive::UByte => Value::UByte(r.read_u8()?),
            Primitive::Short => Value::Short(r.read_i16()?),
            Primitive::UShort => Value::UShort(r.read_u16()?),
            Primitive::Int => Value::Int(r.read_i32()?),
            Primitive::Long => Value::Long(r.read_i64()?),
            Primitive::Float => Value::Float(r.read_f32()?),
            Primitive::Double => Value::Double(r.read_f64()?),
            Primitive::String => Value::String(r.read_string()?),
            Primitive::Packet => Value::Packet(registry.read_packet(r)?),
        },
        FieldKind::Abstract(_) => Value::Packet(registry.read_packet(r)?),
        FieldKind::Enum(e) => {
            let en = schema
                .enum_type(e)
                .ok_or_else(|| CodecError::UnknownType(field.type_name.clone()))?;
            let ordinal = r.read_enum(en.wire_width())?;
            if en.member(ordinal).is_none() {
                return Err(CodecError::InvalidEnumOrdinal {
                    name: en.name.clone(),
                    ordinal,
                });
            }
            Value::Enum(ordinal)
        }
        FieldKind::Composite(id) => {
            let mut nested = DynamicPacket::with_defaults(Arc::clone(schema), id);
            r.enter()?;
            nested.populate_data(registry, r)?;
            r.leave();
            Value::Packet(Some(Box::new(nested)))
        }
    })
}

/// Check a whole field value; lists are checked element by element.
fn coerce_field(schema: &ResolvedSchema, field: &ResolvedField, value: Value) -> Result<Value, FieldTypeError> {
    if !field.is_list {
        return coerce_element(schema, field, value).map_err(|v| FieldTypeError::new(field.type_name.clone(), v));
    }
    let items = match value {
        Value::List(items) => items,
        other => return Err(FieldTypeError::new(format!("list {}", field.type_name), other)),
    };
    items
        .into_iter()
        .map(|item| {
            coerce_element(schema, field, item)
                .map_err(|v| FieldTypeError::new(format!("{} in list", field.type_name), v))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

/// Check one scalar or list element; hands the value back unchanged on mismatch.
fn coerce_element(schema: &ResolvedSchema, field: &ResolvedField, value: Value) -> Result<Value, Value> {
    match field.kind {
        FieldKind::Primitive(p) if p.is_integer() => {
            let (min, max) = p.integer_range().ok_or_else(|| value.clone())?;
            let n = match value.as_i64() {
                Some(n) if n >= min && n <= max => n,
                _ => return Err(value),
            };
            Ok(match p {
                Primitive::Byte => Value::Byte(n as i8),
                Primitive::UByte => Value::UByte(n as u8),
                Primitive::Short => Value::Short(n as i16),
                Primitive::UShort => Value::UShort(n as u16),
                Primitive::Int => Value::Int(n as i32),
                _ => Value::Long(n),
            })
        }
        FieldKind::Primitive(Primitive::Bool) => match value {
            Value::Bool(_) => Ok(value),
            other => Err(other),
        },
        FieldKind::Primitive(Primitive::Float) => match value {
            Value::Float(_) => Ok(value),
            other => Err(other),
        },
        FieldKind::Primitive(Primitive::Double) => match value {
            Value::Double(_) => Ok(value),
            Value::Float(x) => Ok(Value::Double(x as f64)),
            other => Err(other),
        },
        FieldKind::Primitive(Primitive::String) => match value {
            Value::String(_) => Ok(value),
            other => Err(other),
        },
        FieldKind::Primitive(_) => match value {
            Value::Packet(_) => Ok(value),
            other => Err(other),
        },
        FieldKind::Enum(e) => {
            let Some(en) = schema.enum_type(e) else { return Err(value) };
            let ordinal = match &value {
                Value::Enum(o) if en.member(*o).is_some() => Some(*o),
                Value::String(member) => en.ordinal(member),
                _ => None,
            };
            ordinal.map(Value::Enum).ok_or(value)
        }
        FieldKind::Composite(id) => {
            let fits = match &value {
                // List elements are always present on the wire.
                Value::Packet(None) => !field.is_list,
                Value::Packet(Some(p)) => schema
                    .packet(id)
                    .map_or(false, |t| t.packet_hash() == p.packet_hash() && t.name == p.type_name()),
                _ => false,
            };
            if fits {
                Ok(value)
            } else {
                Err(value)
            }
        }
        FieldKind::Abstract(_) => {
            let fits = match &value {
                Value::Packet(None) => true,
                Value::Packet(Some(p)) => match p.as_any().downcast_ref::<DynamicPacket>() {
                    Some(d) => d.packet_type().map_or(false, |t| t.tags.contains(&field.type_name)),
                    None => true,
                },
                _ => false,
            };
            if fits {
                Ok(value)
            } else {
                Err(value)
            }
        }
    }
}

impl BluePacket for DynamicPacket {
    fn packet_hash(&self) -> i64 {
        self.packet_type().map_or(0, PacketType::packet_hash)
    }

    fn type_name(&self) -> &str {
        self.schema.name_of(self.type_id)
    }

    fn serialize_data(&self, w: &mut PacketWriter) -> Result<(), CodecError> {
        let packet = self
            .packet_type()
            .ok_or_else(|| CodecError::UnknownType(self.type_name().to_string()))?;
        w.write_bits(
            packet
                .wire_fields()
                .filter(|(_, f)| f.is_packed_bool())
                .map(|(i, _)| self.values[i].as_bool().unwrap_or(false)),
        )?;
        for (i, field) in packet.wire_fields().filter(|(_, f)| !f.is_packed_bool()) {
            self.write_field(w, field, &self.values[i])?;
        }
        Ok(())
    }

    fn populate_data(&mut self, registry: &Registry, r: &mut PacketReader<'_>) -> Result<(), CodecError> {
        let schema = Arc::clone(&self.schema);
        let packet = schema
            .packet(self.type_id)
            .ok_or_else(|| CodecError::UnknownType(self.type_name().to_string()))?;
        let packed: Vec<usize> = packet
            .wire_fields()
            .filter(|(_, f)| f.is_packed_bool())
            .map(|(i, _)| i)
            .collect();
        let bits = r.read_bits(packed.len())?;
        for (i, bit) in packed.into_iter().zip(bits) {
            self.values[i] = Value::Bool(bit);
        }
        for (i, field) in packet.wire_fields().filter(|(_, f)| !f.is_packed_bool()) {
            self.values[i] = read_field(&schema, registry, r, field)?;
        }
        Ok(())
    }

    fn fields_to_string(&self, out: &mut String) {
        let Some(packet) = self.packet_type() else { return };
        for (i, field) in packet.sorted_indexed() {
            let Some(value) = self.values.get(i) else { continue };
            let shape = match field.kind {
                FieldKind::Enum(e) => match self.schema.enum_type(e) {
                    Some(en) => Shape::Enum(&en.members),
                    None => Shape::Plain,
                },
                FieldKind::Composite(_) => Shape::Composite,
                FieldKind::Abstract(_) | FieldKind::Primitive(Primitive::Packet) => Shape::Polymorphic,
                FieldKind::Primitive(_) => Shape::Plain,
            };
            render::append_field(out, &field.name, &field.type_name, shape, value);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_packet(&self) -> Box<dyn BluePacket> {
        Box::new(self.clone())
    }

    fn eq_packet(&self, other: &dyn BluePacket) -> bool {
        packet_eq(self, other)
    }
}

impl PartialEq for DynamicPacket {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name()
            && self.packet_hash() == other.packet_hash()
            && self.values == other.values
    }
}

impl fmt::Debug for DynamicPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct(self.type_name());
        if let Some(packet) = self.packet_type() {
            for (field, value) in packet.fields.iter().zip(&self.values) {
                d.field(&field.name, value);
            }
        }
        d.finish()
    }
}
