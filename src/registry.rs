//! Hash-keyed packet registry for decoding self-describing streams.

use crate::codec::CodecError;
use crate::packet::BluePacket;
use crate::wire::PacketReader;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Constructor = Arc<dyn Fn() -> Box<dyn BluePacket> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Packet {name} has no hash")]
    ZeroHash { name: String },
    #[error("Duplicate packet hash 0x{hash:016X}: {existing} and {name}")]
    DuplicateHash {
        hash: i64,
        existing: String,
        name: String,
    },
}

/// `packetHash -> constructor`. Built once, then shared read-only by decoders.
#[derive(Clone, Default)]
pub struct Registry {
    constructors: HashMap<i64, (String, Constructor)>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.constructors.values().map(|(n, _)| n.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("packets", &names).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding type by its default instance's hash.
    pub fn register<P: BluePacket + Default + 'static>(&mut self) -> Result<&mut Self, RegistryError> {
        self.register_with(|| Box::new(P::default()) as Box<dyn BluePacket>)
    }

    /// Register a constructor; its first product supplies the hash and name.
    pub fn register_with<F>(&mut self, constructor: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn() -> Box<dyn BluePacket> + Send + Sync + 'static,
    {
        let sample = constructor();
        let hash = sample.packet_hash();
        let name = sample.type_name().to_string();
        if hash == 0 {
            return Err(RegistryError::ZeroHash { name });
        }
        if let Some((existing, _)) = self.constructors.get(&hash) {
            return Err(RegistryError::DuplicateHash {
                hash,
                existing: existing.clone(),
                name,
            });
        }
        debug!("register {} as 0x{:016X}", name, hash);
        self.constructors.insert(hash, (name, Arc::new(constructor)));
        Ok(self)
    }

    pub fn contains(&self, packet_hash: i64) -> bool {
        self.constructors.contains_key(&packet_hash)
    }

    pub fn name_of(&self, packet_hash: i64) -> Option<&str> {
        self.constructors.get(&packet_hash).map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Fresh default instance for a hash.
    pub fn new_instance(&self, packet_hash: i64) -> Result<Box<dyn BluePacket>, CodecError> {
        self.constructors
            .get(&packet_hash)
            .map(|(_, c)| c())
            .ok_or(CodecError::UnknownPacket(packet_hash))
    }

    /// Decode one packet (header and body). Header 0 is a null packet.
    /// Bytes after the packet are ignored.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<Option<Box<dyn BluePacket>>, CodecError> {
        let mut r = PacketReader::new(bytes);
        let packet = self.read_packet(&mut r)?;
        if r.remaining() > 0 {
            debug!("ignoring {} trailing bytes", r.remaining());
        }
        Ok(packet)
    }

    /// Read a header and, unless it is 0, the body of the registered type.
    pub fn read_packet(&self, r: &mut PacketReader<'_>) -> Result<Option<Box<dyn BluePacket>>, CodecError> {
        let hash = r.read_header()?;
        if hash == 0 {
            return Ok(None);
        }
        let mut packet = self.new_instance(hash)?;
        r.enter()?;
        packet.populate_data(self, r)?;
        r.leave();
        Ok(Some(packet))
    }
}
