//! The contract every packet binding implements.
//!
//! A binding (hand written, generated, or the schema-driven
//! [`crate::codec::DynamicPacket`]) provides its `packetHash`, a body serializer, a
//! body populator and a field renderer. Framing with the 8-byte header and the
//! `{TypeName ...}` debug form are shared here.

use crate::codec::CodecError;
use crate::registry::Registry;
use crate::value::Value;
use crate::wire::{PacketReader, PacketWriter};
use std::any::Any;
use std::fmt;

pub trait BluePacket: fmt::Debug + Send + Sync {
    /// Structural hash identifying this type on the wire.
    fn packet_hash(&self) -> i64;

    fn type_name(&self) -> &str;

    /// Write the body, without header.
    fn serialize_data(&self, w: &mut PacketWriter) -> Result<(), CodecError>;

    /// Read the body in the same order `serialize_data` writes it. The registry
    /// decodes nested polymorphic packets.
    fn populate_data(&mut self, registry: &Registry, r: &mut PacketReader<'_>) -> Result<(), CodecError>;

    /// Append ` name=value` for every field not at its default, in field-name order.
    fn fields_to_string(&self, out: &mut String);

    fn as_any(&self) -> &dyn Any;

    fn clone_packet(&self) -> Box<dyn BluePacket>;

    fn eq_packet(&self, other: &dyn BluePacket) -> bool;

    /// Header followed by body.
    fn serialize(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = PacketWriter::new();
        w.write_header(self.packet_hash())?;
        self.serialize_data(&mut w)?;
        Ok(w.into_inner())
    }

    /// `{TypeName name=value ...}`
    fn to_debug_string(&self) -> String {
        let mut out = String::from("{");
        out.push_str(self.type_name());
        self.fields_to_string(&mut out);
        out.push('}');
        out
    }
}

impl Clone for Box<dyn BluePacket> {
    fn clone(&self) -> Self {
        self.clone_packet()
    }
}

impl PartialEq for dyn BluePacket {
    fn eq(&self, other: &Self) -> bool {
        self.eq_packet(other)
    }
}

/// `eq_packet` for bindings that implement `PartialEq`.
pub fn packet_eq<P: BluePacket + PartialEq + 'static>(this: &P, other: &dyn BluePacket) -> bool {
    other.as_any().downcast_ref::<P>().map_or(false, |o| this == o)
}

/// Writes a polymorphic packet field: header 0 for none, else header and body.
pub fn write_packet(w: &mut PacketWriter, packet: Option<&dyn BluePacket>) -> Result<(), CodecError> {
    match packet {
        None => w.write_header(0),
        Some(p) => {
            w.write_header(p.packet_hash())?;
            p.serialize_data(w)
        }
    }
}

/// Raised at assignment when a value does not fit the declared field type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Not a {ftype}: {value}")]
pub struct FieldTypeError {
    /// Declared type, e.g. `ubyte`, `MyEnum`, `list MyInner`, `MyInner in list`.
    pub ftype: String,
    /// The rejected value, unchanged.
    pub value: Value,
}

impl FieldTypeError {
    pub fn new(ftype: impl Into<String>, value: Value) -> Self {
        FieldTypeError {
            ftype: ftype.into(),
            value,
        }
    }
}

pub fn unsigned_byte(v: i8) -> u8 {
    v as u8
}

pub fn signed_byte(v: u8) -> i8 {
    v as i8
}

pub fn unsigned_short(v: i16) -> u16 {
    v as u16
}

pub fn signed_short(v: u16) -> i16 {
    v as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_reinterpretation() {
        assert_eq!(unsigned_byte(-56), 200);
        assert_eq!(signed_byte(200), -56);
        assert_eq!(unsigned_short(-19858), 45678);
        assert_eq!(signed_short(45678), -19858);
    }

    #[test]
    fn field_type_error_message() {
        let e = FieldTypeError::new("byte", Value::Long(300));
        assert_eq!(e.to_string(), "Not a byte: 300");
    }
}
