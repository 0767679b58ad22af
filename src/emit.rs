//! Code-generation consumer contract.
//!
//! A backend implements [`Emitter`] and is driven over the resolved type graph by
//! [`emit`]: one call per top-level definition in declaration order, then
//! `finish` with the schema-wide `apiVersion`. [`ManifestEmitter`] is the built-in
//! backend; it records the API version and every packet hash as text.

use crate::resolve::{EnumType, PacketType, ResolvedSchema, TypeEntry, TypeId};
use std::path::{Path, PathBuf};

pub trait Emitter {
    fn packet(&mut self, schema: &ResolvedSchema, id: TypeId, packet: &PacketType) -> anyhow::Result<()>;

    fn enumeration(&mut self, schema: &ResolvedSchema, id: TypeId, en: &EnumType) -> anyhow::Result<()>;

    fn abstract_type(&mut self, _schema: &ResolvedSchema, _id: TypeId, _packet: &PacketType) -> anyhow::Result<()> {
        Ok(())
    }

    fn finish(&mut self, _schema: &ResolvedSchema) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Drive `emitter` over every top-level definition.
pub fn emit<E: Emitter + ?Sized>(schema: &ResolvedSchema, emitter: &mut E) -> anyhow::Result<()> {
    for &id in schema.top_level() {
        match schema.entry(id) {
            Some(TypeEntry::Enum(en)) => emitter.enumeration(schema, id, en)?,
            Some(TypeEntry::Packet(p)) if p.is_abstract => emitter.abstract_type(schema, id, p)?,
            Some(TypeEntry::Packet(p)) => emitter.packet(schema, id, p)?,
            None => {}
        }
    }
    emitter.finish(schema)
}

/// `0x` + uppercase unsigned hex, as printed in manifests.
pub fn hex64(v: i64) -> String {
    format!("0x{:X}", v as u64)
}

/// Text summary of a compiled schema, one definition per line.
#[derive(Debug, Default)]
pub struct ManifestEmitter {
    namespace: Option<String>,
    lines: Vec<String>,
    text: String,
}

impl ManifestEmitter {
    pub const FILE_NAME: &'static str = "BluePacketAPI.txt";

    pub fn new(namespace: Option<&str>) -> Self {
        ManifestEmitter {
            namespace: namespace.map(str::to_string),
            ..Self::default()
        }
    }

    /// Rendered manifest; empty until `finish` ran.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn write_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::FILE_NAME);
        std::fs::write(&path, &self.text)?;
        Ok(path)
    }
}

impl Emitter for ManifestEmitter {
    fn packet(&mut self, _schema: &ResolvedSchema, _id: TypeId, packet: &PacketType) -> anyhow::Result<()> {
        let hash = packet.packet_hash();
        let kind = if packet.is_deprecated() { "deprecated" } else { "packet" };
        self.lines
            .push(format!("{} {} {} {}", kind, packet.name, hash, hex64(hash)));
        Ok(())
    }

    fn enumeration(&mut self, _schema: &ResolvedSchema, _id: TypeId, en: &EnumType) -> anyhow::Result<()> {
        self.lines.push(format!(
            "enum {} {} width={}",
            en.name,
            en.members.len(),
            en.wire_width()
        ));
        Ok(())
    }

    fn abstract_type(&mut self, _schema: &ResolvedSchema, _id: TypeId, packet: &PacketType) -> anyhow::Result<()> {
        self.lines.push(format!("abstract {}", packet.name));
        Ok(())
    }

    fn finish(&mut self, schema: &ResolvedSchema) -> anyhow::Result<()> {
        let mut text = String::from("# Auto-generated - do not edit\n");
        if let Some(ns) = &self.namespace {
            text.push_str(&format!("namespace {}\n", ns));
        }
        let api = schema.api_version();
        text.push_str(&format!("apiVersion {} {}\n", api, hex64(api)));
        for line in self.lines.drain(..) {
            text.push_str(&line);
            text.push('\n');
        }
        self.text = text;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn manifest_lists_every_definition() {
        let schema =
            ResolvedSchema::resolve(parse("Kind: enum\n  A, B\n\nTag: abstract\n\nDemoOuter:\n  oInt int\n  oString string\n").unwrap())
                .unwrap();
        let mut m = ManifestEmitter::new(Some("demo"));
        emit(&schema, &mut m).unwrap();
        let expected = "# Auto-generated - do not edit\n\
                        namespace demo\n\
                        apiVersion -5737330595390180863 0xB060E8389EC9B201\n\
                        enum Kind 2 width=1\n\
                        abstract Tag\n\
                        packet DemoOuter -5737330595390180863 0xB060E8389EC9B201\n";
        assert_eq!(m.text(), expected);
    }
}
