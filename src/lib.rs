//! # BluePacket — schema compiler and binary wire codec
//!
//! A `.bp` schema declares packet types. This crate parses schemas, resolves and
//! validates every type reference, computes each type's structural version hash
//! (`packetHash`) and the schema-wide `apiVersion`, and encodes/decodes packets in
//! the fixed big-endian wire format, using a hash-keyed [`Registry`] to decode
//! self-describing streams.
//!
//! ## Schema structure
//!
//! - **Packets**: `Name:` or `Name: TagA TagB` followed by indented fields
//! - **Enums**: `Name: enum` followed by comma-separated members
//! - **Abstract tags**: `Name: abstract`, a field type accepting any tagged packet
//! - **Nested types**: indented definitions inside a packet, in its own namespace
//! - **Deprecated forks**: `Name__<HEX>` freezes an older shape of `Name`
//!
//! ## Field types
//!
//! - `bool`, `byte`, `ubyte`, `short`, `ushort`, `int`, `long`, `float`, `double`, `string`
//! - `packet` (any packet, sent with its own header)
//! - any enum or packet type; a trailing `list` makes a sequence
//!
//! ## Example schema
//!
//! ```text
//! # Greeting sent by a client.
//! Hello:
//!   name string
//!   mood Mood
//!   tags string list
//!
//!   Mood: enum
//!     HAPPY, GRUMPY
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use bluepacket::{parse, Codec, ResolvedSchema};
//! use bluepacket::packet::BluePacket;
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = ResolvedSchema::resolve(parse("Hello:\n  name string\n")?)?;
//! let codec = Codec::new(schema);
//! let mut hello = codec.new_packet("Hello")?;
//! hello.set("name", "world")?;
//! let bytes = hello.serialize()?;
//! let decoded = codec.registry()?.deserialize(&bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod codec;
pub mod emit;
pub mod error;
pub mod packet;
pub mod parser;
pub mod registry;
pub mod render;
pub mod resolve;
pub mod rpc;
pub mod value;
pub mod version;
pub mod wire;

pub use ast::{Primitive, Schema};
pub use codec::{Codec, CodecError, DynamicPacket};
pub use error::SchemaError;
pub use packet::{BluePacket, FieldTypeError};
pub use parser::{parse, parse_files, SchemaParser};
pub use registry::{Registry, RegistryError};
pub use resolve::{FieldKind, ResolvedSchema, TypeId};
pub use value::Value;
pub use version::SchemaVersion;
