//! Parse BluePacket schema source into AST using PEST.
//!
//! The format is line oriented and indentation delimited, so the grammar only
//! recognises single lines (`header`, `members`, `field`, `convert`). This module
//! drives a small state machine over the lines of each file: a line at column 0,
//! or any line with a `:` before its comment, opens a definition; other lines are
//! fields, enum members or ignored, depending on the kind of the open definition.

use crate::ast::*;
use crate::error::SchemaError;
use log::{debug, info};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::collections::HashMap;
use std::path::Path;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct LineParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum State {
    #[default]
    Header,
    Fields,
    Members,
    Abstract,
}

/// Definition receiving the following body lines.
#[derive(Debug, Clone, Copy, Default)]
enum Cursor {
    #[default]
    None,
    Top(usize),
    Inner(usize, usize),
    InnerEnum(usize, usize),
}

enum HeaderKind {
    Enum,
    Abstract,
    Packet(Vec<String>),
}

/// Accumulates definitions from one or more schema files into a single [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaParser {
    definitions: Vec<Definition>,
    by_name: HashMap<String, usize>,
    annotations: HashMap<String, String>,
    state: State,
    cursor: Cursor,
    /// Top-level packet owning nested definitions.
    top: Option<usize>,
}

/// Parse a single schema source.
pub fn parse(source: &str) -> Result<Schema, SchemaError> {
    let mut parser = SchemaParser::new();
    parser.parse_str("<input>", source)?;
    Ok(parser.finish())
}

/// Parse several schema files into one cross-referenced set.
pub fn parse_files<P: AsRef<Path>>(paths: &[P]) -> Result<Schema, SchemaError> {
    let mut parser = SchemaParser::new();
    for path in paths {
        parser.parse_file(path)?;
    }
    Ok(parser.finish())
}

fn parse_line(rule: Rule, line: &str) -> Option<Pair<'_>> {
    LineParser::parse(rule, line).ok()?.next()
}

fn malformed(message: &str, line: &str) -> SchemaError {
    SchemaError::new(message).with_what(line)
}

/// A `:` outside the comment part marks a definition header.
fn is_header_line(line: &str) -> bool {
    line.split('#').next().unwrap_or("").contains(':')
}

fn starts_lowercase(s: &str) -> bool {
    s.chars().next().map_or(false, |c| c.is_lowercase())
}

impl SchemaParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_file(&mut self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        info!("Reading {}", display);
        let source = std::fs::read_to_string(path).map_err(|e| {
            SchemaError::new(format!("Cannot read schema file ({})", e)).with_what(display.clone())
        })?;
        self.parse_str(&display, &source)
    }

    /// Parse one file's content; `file` is only used for error locations.
    pub fn parse_str(&mut self, file: &str, source: &str) -> Result<(), SchemaError> {
        self.state = State::Header;
        self.cursor = Cursor::None;
        self.top = None;
        let mut docstring: Vec<String> = Vec::new();

        for (idx, raw) in source.lines().enumerate() {
            let location = Location {
                file: file.to_string(),
                line: idx + 1,
            };
            if let Some(rest) = raw.strip_prefix("# @") {
                let mut parts = rest.splitn(2, char::is_whitespace);
                if let Some(key) = parts.next().filter(|k| !k.is_empty()) {
                    let value = parts.next().unwrap_or("").trim();
                    self.annotations.insert(key.to_string(), value.to_string());
                    continue;
                }
            }
            let line = raw.trim();
            if line.is_empty() {
                if !docstring.is_empty() {
                    self.close_doc_block(std::mem::take(&mut docstring));
                }
                continue;
            }
            if let Some(text) = line.strip_prefix('#') {
                docstring.push(text.trim().to_string());
                continue;
            }
            let indent = raw.len() - raw.trim_start().len();
            let doc = std::mem::take(&mut docstring);
            self.read_line(line, indent, doc, &location)
                .map_err(|e| e.at(&location))?;
        }
        Ok(())
    }

    /// `# @key value` lines seen so far.
    pub fn annotations(&self) -> &HashMap<String, String> {
        &self.annotations
    }

    pub fn finish(self) -> Schema {
        Schema {
            definitions: self.definitions,
            annotations: self.annotations,
        }
    }

    fn read_line(
        &mut self,
        line: &str,
        indent: usize,
        doc: Vec<String>,
        location: &Location,
    ) -> Result<(), SchemaError> {
        if indent == 0 || is_header_line(line) {
            return self.read_header(line, indent, doc, location);
        }
        match self.state {
            State::Header => Err(malformed("Malformed definition header", line)),
            State::Fields => self.read_field(line, doc, location),
            State::Members => self.read_members(line, doc),
            State::Abstract => Ok(()),
        }
    }

    fn read_header(
        &mut self,
        line: &str,
        indent: usize,
        doc: Vec<String>,
        location: &Location,
    ) -> Result<(), SchemaError> {
        let pair = parse_line(Rule::header, line)
            .ok_or_else(|| malformed("Malformed definition header", line))?;
        let mut name = None;
        let mut options = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::ident => name = Some(p.as_str().to_string()),
                Rule::option => options.push(p.as_str().to_string()),
                _ => {}
            }
        }
        let name = name.ok_or_else(|| malformed("Malformed definition header", line))?;
        let kind = match options.as_slice() {
            [o] if o == "enum" => HeaderKind::Enum,
            [o] if o == "abstract" => HeaderKind::Abstract,
            _ => HeaderKind::Packet(options),
        };

        if indent == 0 {
            self.open_top_level(name, kind, doc, location)
        } else {
            self.open_nested(name, kind, doc, location, line)
        }
    }

    fn open_top_level(
        &mut self,
        name: String,
        kind: HeaderKind,
        doc: Vec<String>,
        location: &Location,
    ) -> Result<(), SchemaError> {
        if self.by_name.contains_key(&name) {
            return Err(SchemaError::new("Duplicate Packet name").with_what(name));
        }
        let index = self.definitions.len();
        let definition = match kind {
            HeaderKind::Enum => {
                self.state = State::Members;
                self.top = None;
                Definition::Enum(EnumDefinition {
                    origin_name: origin_name(&name).to_string(),
                    name: name.clone(),
                    members: Vec::new(),
                    docstring: doc,
                    location: location.clone(),
                })
            }
            HeaderKind::Abstract => {
                self.state = State::Abstract;
                self.top = None;
                let mut p = PacketDefinition::new(&name, location.clone());
                p.is_abstract = true;
                p.docstring = doc;
                Definition::Packet(p)
            }
            HeaderKind::Packet(tags) => {
                self.state = State::Fields;
                self.top = Some(index);
                let mut p = PacketDefinition::new(&name, location.clone());
                p.tags = tags;
                p.docstring = doc;
                Definition::Packet(p)
            }
        };
        debug!("definition {} at {}", name, location);
        self.by_name.insert(name, index);
        self.definitions.push(definition);
        self.cursor = Cursor::Top(index);
        Ok(())
    }

    fn open_nested(
        &mut self,
        name: String,
        kind: HeaderKind,
        doc: Vec<String>,
        location: &Location,
        line: &str,
    ) -> Result<(), SchemaError> {
        let top = self
            .top
            .ok_or_else(|| malformed("Nested definition outside of a packet", line))?;
        let owner = match self.definitions.get_mut(top) {
            Some(Definition::Packet(p)) => p,
            _ => return Err(malformed("Nested definition outside of a packet", line)),
        };
        let qualified = format!("{}.{}", owner.name, name);
        if owner.inner.iter().any(|p| p.name == name) || owner.enums.iter().any(|e| e.name == name) {
            return Err(SchemaError::new("Duplicate nested type name").with_what(qualified));
        }
        match kind {
            HeaderKind::Abstract => {
                return Err(SchemaError::new("Nested definition can't be abstract").with_what(qualified));
            }
            HeaderKind::Enum => {
                owner.enums.push(EnumDefinition {
                    origin_name: origin_name(&name).to_string(),
                    name,
                    members: Vec::new(),
                    docstring: doc,
                    location: location.clone(),
                });
                self.cursor = Cursor::InnerEnum(top, owner.enums.len() - 1);
                self.state = State::Members;
            }
            HeaderKind::Packet(tags) => {
                let mut p = PacketDefinition::new(&name, location.clone());
                p.tags = tags;
                p.docstring = doc;
                owner.inner.push(p);
                self.cursor = Cursor::Inner(top, owner.inner.len() - 1);
                self.state = State::Fields;
            }
        }
        Ok(())
    }

    fn read_members(&mut self, line: &str, doc: Vec<String>) -> Result<(), SchemaError> {
        let pair = parse_line(Rule::members, line)
            .ok_or_else(|| malformed("Malformed enum values", line))?;
        let en = self.current_enum_mut()?;
        let mut doc = Some(doc);
        for p in pair.into_inner().filter(|p| p.as_rule() == Rule::ident) {
            let member = p.as_str();
            if en.member_index(member).is_some() {
                return Err(SchemaError::new("Duplicate enum value")
                    .with_what(format!("{}.{}", en.name, member)));
            }
            en.members.push(EnumMember {
                name: member.to_string(),
                docstring: doc.take().unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn read_field(&mut self, line: &str, doc: Vec<String>, location: &Location) -> Result<(), SchemaError> {
        if line.split_whitespace().next() == Some(CONVERT_LABEL) {
            return self.read_convert(line, location);
        }
        let pair = parse_line(Rule::field, line).ok_or_else(|| malformed("Malformed field", line))?;
        let mut idents = Vec::with_capacity(2);
        let mut is_list = false;
        let mut comment = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::ident => idents.push(p.as_str()),
                Rule::list_flag => is_list = true,
                Rule::inline_comment => comment = Some(p.as_str().trim_start_matches('#').trim()),
                _ => {}
            }
        }
        let (name, type_name) = match idents.as_slice() {
            [n, t] => (*n, *t),
            _ => return Err(malformed("Malformed field", line)),
        };
        let what = format!("{} {}", name, type_name);

        if type_name == "String" {
            return Err(SchemaError::new("Forbidden field type 'String': should be 'string' (lowercase)")
                .with_what(what));
        }
        if let Some(comment) = comment {
            return Err(SchemaError::new("Forbidden field inline comment").with_what(comment));
        }
        if starts_lowercase(type_name) && Primitive::from_name(type_name).is_none() {
            return Err(SchemaError::new("Unknown primitive field type").with_what(what));
        }
        let packet = self.current_packet_mut()?;
        if packet.field(name).is_some() {
            return Err(SchemaError::new("Duplicate field name")
                .with_what(format!("{}.{}", packet.name, name)));
        }
        if is_reserved_name(name) {
            return Err(SchemaError::new("Field name can't be reserved keyword").with_what(what));
        }
        packet.fields.push(FieldDefinition {
            name: name.to_string(),
            type_name: type_name.to_string(),
            is_list,
            docstring: doc,
            location: location.clone(),
        });
        Ok(())
    }

    fn read_convert(&mut self, line: &str, location: &Location) -> Result<(), SchemaError> {
        let pair = parse_line(Rule::convert, line).ok_or_else(|| malformed("Malformed convert", line))?;
        let mut words = pair
            .into_inner()
            .filter(|p| matches!(p.as_rule(), Rule::ident | Rule::option_word))
            .map(|p| p.as_str().to_string());
        let type_name = words.next().ok_or_else(|| malformed("Malformed convert", line))?;
        let options: Vec<String> = words.collect();
        let packet = self.current_packet_mut()?;
        if packet.conversions.iter().any(|c| c.type_name == type_name) {
            return Err(SchemaError::new("Duplicate convert type").with_what(type_name));
        }
        packet.conversions.push(Conversion {
            type_name,
            options,
            location: location.clone(),
        });
        Ok(())
    }

    fn close_doc_block(&mut self, lines: Vec<String>) {
        if let Ok(packet) = self.current_packet_mut() {
            let before_field = packet.fields.len();
            packet.doc_blocks.push(DocBlock { before_field, lines });
        }
    }

    fn current_packet_mut(&mut self) -> Result<&mut PacketDefinition, SchemaError> {
        let packet = match self.cursor {
            Cursor::Top(i) => match self.definitions.get_mut(i) {
                Some(Definition::Packet(p)) => Some(p),
                _ => None,
            },
            Cursor::Inner(t, i) => match self.definitions.get_mut(t) {
                Some(Definition::Packet(p)) => p.inner.get_mut(i),
                _ => None,
            },
            _ => None,
        };
        packet.ok_or_else(|| SchemaError::new("Field outside of a packet definition"))
    }

    fn current_enum_mut(&mut self) -> Result<&mut EnumDefinition, SchemaError> {
        let en = match self.cursor {
            Cursor::Top(i) => match self.definitions.get_mut(i) {
                Some(Definition::Enum(e)) => Some(e),
                _ => None,
            },
            Cursor::InnerEnum(t, i) => match self.definitions.get_mut(t) {
                Some(Definition::Packet(p)) => p.enums.get_mut(i),
                _ => None,
            },
            _ => None,
        };
        en.ok_or_else(|| SchemaError::new("Enum values outside of an enum definition"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_line_detection() {
        assert!(is_header_line("Inner: enum"));
        assert!(!is_header_line("x int"));
        assert!(!is_header_line("x int # a: b"));
    }

    #[test]
    fn field_grammar() {
        assert!(parse_line(Rule::field, "aInner MyInner list").is_some());
        assert!(parse_line(Rule::field, "x int lists").is_none());
        assert!(parse_line(Rule::field, "x int # note").is_some());
        assert!(parse_line(Rule::field, "x").is_none());
    }

    #[test]
    fn members_and_docs() {
        let schema = parse("# Colors.\nColor: enum\n  RED, GREEN,\n  # Last one.\n  BLUE\n").expect("parse");
        match &schema.definitions[0] {
            Definition::Enum(e) => {
                assert_eq!(e.docstring, vec!["Colors.".to_string()]);
                let names: Vec<_> = e.members.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, ["RED", "GREEN", "BLUE"]);
                assert_eq!(e.members[2].docstring, vec!["Last one.".to_string()]);
            }
            other => panic!("expected enum, got {:?}", other),
        }
    }

    #[test]
    fn nested_definitions_attach_to_top_level() {
        let src = "Outer:\n  a Inner\n  b Kind\n  Inner:\n    v int\n  Kind: enum\n    A, B\n";
        let schema = parse(src).expect("parse");
        let outer = schema.packets().next().expect("outer");
        assert_eq!(outer.fields.len(), 2);
        assert_eq!(outer.inner.len(), 1);
        assert_eq!(outer.inner[0].fields.len(), 1);
        assert_eq!(outer.enums[0].members.len(), 2);
    }

    #[test]
    fn body_lines_after_nested_enum_are_members() {
        let err = parse("Outer:\n  Kind: enum\n    A, B\n  b Kind\n").unwrap_err();
        assert_eq!(err.message, "Malformed enum values");
        assert_eq!(err.location.map(|l| l.line), Some(4));
    }

    #[test]
    fn annotations_are_collected() {
        let schema = parse("# @what Foo.x\nFoo:\n  x int\n").expect("parse");
        assert_eq!(schema.annotations.get("what").map(String::as_str), Some("Foo.x"));
        assert!(schema.packets().next().map_or(false, |p| p.docstring.is_empty()));
    }
}
