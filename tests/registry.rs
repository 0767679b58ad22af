//! Hash-keyed registry with hand-written bindings next to schema-driven packets.

use bluepacket::packet::packet_eq;
use bluepacket::render::{append_field, Shape};
use bluepacket::wire::{PacketReader, PacketWriter};
use bluepacket::{parse, BluePacket, Codec, CodecError, Registry, RegistryError, ResolvedSchema, Value};
use std::any::Any;

/// `Ping: seq int, note string`, written by hand the way a generator would.
#[derive(Debug, Clone, Default, PartialEq)]
struct Ping {
    note: String,
    seq: i32,
}

const PING_HASH: i64 = 8342363217842022759;

impl BluePacket for Ping {
    fn packet_hash(&self) -> i64 {
        PING_HASH
    }

    fn type_name(&self) -> &str {
        "Ping"
    }

    fn serialize_data(&self, w: &mut PacketWriter) -> Result<(), CodecError> {
        w.write_str(&self.note)?;
        w.write_i32(self.seq)
    }

    fn populate_data(&mut self, _registry: &Registry, r: &mut PacketReader<'_>) -> Result<(), CodecError> {
        self.note = r.read_string()?;
        self.seq = r.read_i32()?;
        Ok(())
    }

    fn fields_to_string(&self, out: &mut String) {
        append_field(out, "note", "string", Shape::Plain, &Value::from(self.note.as_str()));
        append_field(out, "seq", "int", Shape::Plain, &Value::Int(self.seq));
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

/// A binding that forgot its hash.
#[derive(Debug, Clone, Default, PartialEq)]
struct Unhashed;

impl BluePacket for Unhashed {
    fn packet_hash(&self) -> i64 {
        0
    }

    fn type_name(&self) -> &str {
        "Unhashed"
    }

    fn serialize_data(&self, _w: &mut PacketWriter) -> Result<(), CodecError> {
        Ok(())
    }

    fn populate_data(&mut self, _registry: &Registry, _r: &mut PacketReader<'_>) -> Result<(), CodecError> {
        Ok(())
    }

    fn fields_to_string(&self, _out: &mut String) {}

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

fn ping_codec() -> Codec {
    Codec::new(ResolvedSchema::resolve(parse("Ping:\n  seq int\n  note string\n").unwrap()).unwrap())
}

#[test]
fn hand_written_binding_round_trips() {
    let mut registry = Registry::new();
    registry.register::<Ping>().unwrap();
    let ping = Ping {
        note: "hi".into(),
        seq: 7,
    };
    let bytes = ping.serialize().unwrap();
    let back = registry.deserialize(&bytes).unwrap().expect("packet");
    assert_eq!(back.as_any().downcast_ref::<Ping>(), Some(&ping));
    assert_eq!(back.to_debug_string(), "{Ping note=\"hi\" seq=7}");
}

#[test]
fn binding_matches_schema_driven_encoding() {
    let codec = ping_codec();
    let mut dynamic = codec.new_packet("Ping").unwrap();
    dynamic.set("seq", 7).unwrap();
    dynamic.set("note", "hi").unwrap();
    assert_eq!(dynamic.packet_hash(), PING_HASH);

    let ping = Ping {
        note: "hi".into(),
        seq: 7,
    };
    assert_eq!(dynamic.serialize().unwrap(), ping.serialize().unwrap());

    let mut registry = Registry::new();
    registry.register::<Ping>().unwrap();
    let back = registry.deserialize(&dynamic.serialize().unwrap()).unwrap().expect("packet");
    assert_eq!(back.as_any().downcast_ref::<Ping>(), Some(&ping));
}

#[test]
fn duplicate_hash_is_rejected() {
    let mut registry = Registry::new();
    registry.register::<Ping>().unwrap();
    match ping_codec().register_into(&mut registry) {
        Err(RegistryError::DuplicateHash { hash, existing, name }) => {
            assert_eq!(hash, PING_HASH);
            assert_eq!(existing, "Ping");
            assert_eq!(name, "Ping");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn zero_hash_is_rejected() {
    let mut registry = Registry::new();
    assert!(matches!(
        registry.register::<Unhashed>(),
        Err(RegistryError::ZeroHash { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn lookups() {
    let mut registry = Registry::new();
    registry.register::<Ping>().unwrap();
    assert!(registry.contains(PING_HASH));
    assert_eq!(registry.name_of(PING_HASH), Some("Ping"));
    assert_eq!(registry.len(), 1);
    assert!(matches!(registry.new_instance(1), Err(CodecError::UnknownPacket(1))));
    let fresh = registry.new_instance(PING_HASH).unwrap();
    assert_eq!(fresh.as_any().downcast_ref::<Ping>(), Some(&Ping::default()));
}

#[test]
fn null_packet_decodes_to_none() {
    let mut registry = Registry::new();
    registry.register::<Ping>().unwrap();
    assert!(registry.deserialize(&[0u8; 8]).unwrap().is_none());
    assert!(matches!(registry.deserialize(&[0u8; 4]), Err(CodecError::Truncated(_))));
}

#[test]
fn boxed_packets_compare_and_clone() {
    let a: Box<dyn BluePacket> = Box::new(Ping {
        note: "x".into(),
        seq: 1,
    });
    let b = a.clone();
    assert!(*a == *b);
    let c: Box<dyn BluePacket> = Box::new(Ping::default());
    assert!(*a != *c);
    assert_eq!(Value::from(a), Value::from(b));
}
