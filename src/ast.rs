//! Abstract Syntax Tree for BluePacket schema files (`.bp`).
//!
//! The parser produces one [`Schema`] per compile: top-level definitions in
//! declaration order, each packet owning its nested types and nested enums.
//! Nothing here is resolved yet; type names are plain strings until
//! [`crate::resolve::ResolvedSchema::resolve`] runs.

use std::collections::HashMap;
use std::fmt;

/// Separates a type's origin name from its frozen version suffix (`Account__C10ED7C9`).
pub const DEPRECATION_MARKER: &str = "__";

/// Field-line keyword registering a conversion adapter.
pub const CONVERT_LABEL: &str = "convert";

/// Trailing field-line keyword marking a list field.
pub const LIST_LABEL: &str = "list";

/// Names no field may take: keywords and primitive names of the target languages.
pub const RESERVED_NAMES: &[&str] = &[
    LIST_LABEL, CONVERT_LABEL,
    "bool", "boolean", "byte", "char", "class", "decimal", "double", "dynamic", "float",
    "import", "int", "long", "nint", "nuint", "object", "package", "sbyte", "short",
    "static", "string", "uint", "ulong", "ushort",
    "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64", "uintptr",
    "rune", "float32", "float64", "complex64", "complex128",
    // Rust
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "self", "struct", "super", "trait", "true",
    "type", "unsafe", "use", "where", "while",
];

/// Built-in field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Any packet, written with its own 8-byte header.
    Packet,
}

impl Primitive {
    pub const ALL: [Primitive; 11] = [
        Primitive::Bool,
        Primitive::Byte,
        Primitive::UByte,
        Primitive::Short,
        Primitive::UShort,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
        Primitive::String,
        Primitive::Packet,
    ];

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Schema spelling, also used verbatim in version strings.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Byte => "byte",
            Primitive::UByte => "ubyte",
            Primitive::Short => "short",
            Primitive::UShort => "ushort",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::String => "string",
            Primitive::Packet => "packet",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Byte
                | Primitive::UByte
                | Primitive::Short
                | Primitive::UShort
                | Primitive::Int
                | Primitive::Long
        )
    }

    /// Inclusive accepted range for integer kinds.
    pub fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            Primitive::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            Primitive::UByte => Some((0, u8::MAX as i64)),
            Primitive::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            Primitive::UShort => Some((0, u16::MAX as i64)),
            Primitive::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            Primitive::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name with any deprecation suffix removed.
pub fn origin_name(name: &str) -> &str {
    name.split(DEPRECATION_MARKER).next().unwrap_or(name)
}

pub fn is_deprecated_name(name: &str) -> bool {
    name.contains(DEPRECATION_MARKER)
}

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Source position of a definition or field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub type_name: String,
    pub is_list: bool,
    pub docstring: Vec<String>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: String,
    pub docstring: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnumDefinition {
    pub name: String,
    pub origin_name: String,
    /// Declaration order; ordinal = index.
    pub members: Vec<EnumMember>,
    pub docstring: Vec<String>,
    pub location: Location,
}

impl EnumDefinition {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// `convert Other [opts...]` line inside a packet body.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub type_name: String,
    pub options: Vec<String>,
    pub location: Location,
}

/// A documentation paragraph closed by a blank line inside a packet body.
/// `before_field` is the index of the field that follows it.
#[derive(Debug, Clone)]
pub struct DocBlock {
    pub before_field: usize,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PacketDefinition {
    pub name: String,
    pub origin_name: String,
    pub docstring: Vec<String>,
    /// Abstract capability tags declared after the colon.
    pub tags: Vec<String>,
    pub is_abstract: bool,
    pub fields: Vec<FieldDefinition>,
    pub doc_blocks: Vec<DocBlock>,
    /// Nested composite types, own namespace.
    pub inner: Vec<PacketDefinition>,
    pub enums: Vec<EnumDefinition>,
    pub conversions: Vec<Conversion>,
    pub location: Location,
}

impl PacketDefinition {
    pub fn new(name: &str, location: Location) -> Self {
        PacketDefinition {
            name: name.to_string(),
            origin_name: origin_name(name).to_string(),
            docstring: Vec::new(),
            tags: Vec::new(),
            is_abstract: false,
            fields: Vec::new(),
            doc_blocks: Vec::new(),
            inner: Vec::new(),
            enums: Vec::new(),
            conversions: Vec::new(),
            location,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_deprecated(&self) -> bool {
        self.name != self.origin_name
    }
}

#[derive(Debug, Clone)]
pub enum Definition {
    Packet(PacketDefinition),
    Enum(EnumDefinition),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Packet(p) => &p.name,
            Definition::Enum(e) => &e.name,
        }
    }

    pub fn origin_name(&self) -> &str {
        match self {
            Definition::Packet(p) => &p.origin_name,
            Definition::Enum(e) => &e.origin_name,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Definition::Packet(p) => &p.location,
            Definition::Enum(e) => &e.location,
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Definition::Enum(_))
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Definition::Packet(p) if p.is_abstract)
    }
}

/// All top-level definitions of one compile, across every input file.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub definitions: Vec<Definition>,
    /// `# @key value` lines found at column 0.
    pub annotations: HashMap<String, String>,
}

impl Schema {
    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    pub fn packets(&self) -> impl Iterator<Item = &PacketDefinition> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Packet(p) => Some(p),
            Definition::Enum(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_suffix() {
        assert_eq!(origin_name("Account__FB7FEE0A9171C44"), "Account");
        assert_eq!(origin_name("Account"), "Account");
        assert!(is_deprecated_name("Ledger__13557B01F74AE549"));
    }

    #[test]
    fn primitive_names() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("String"), None);
        assert_eq!(Primitive::UByte.integer_range(), Some((0, 255)));
        assert!(is_reserved_name("class"));
        assert!(is_reserved_name("fn"));
        assert!(!is_reserved_name("fByte"));
    }
}
