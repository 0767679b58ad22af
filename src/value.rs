//! Runtime field values for schema-driven packets.

use crate::codec::DynamicPacket;
use crate::packet::BluePacket;
use std::fmt;

/// One field value. Composite and polymorphic fields both hold a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    UByte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Enum ordinal.
    Enum(u16),
    Packet(Option<Box<dyn BluePacket>>),
    List(Vec<Value>),
}

impl Value {
    /// Any integer variant, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(x) => Some(*x as i64),
            Value::UByte(x) => Some(*x as i64),
            Value::Short(x) => Some(*x as i64),
            Value::UShort(x) => Some(*x as i64),
            Value::Int(x) => Some(*x as i64),
            Value::Long(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ordinal(&self) -> Option<u16> {
        match self {
            Value::Enum(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_packet(&self) -> Option<&dyn BluePacket> {
        match self {
            Value::Packet(Some(p)) => Some(p.as_ref()),
            _ => None,
        }
    }

    pub fn as_dynamic(&self) -> Option<&DynamicPacket> {
        self.as_packet()?.as_any().downcast_ref::<DynamicPacket>()
    }

    /// Default of the kind: false, 0, empty, no packet.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Bool(b) => !*b,
            Value::Float(x) => *x == 0.0,
            Value::Double(x) => *x == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Enum(o) => *o == 0,
            Value::Packet(p) => p.is_none(),
            Value::List(v) => v.is_empty(),
            other => other.as_i64() == Some(0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Enum(o) => write!(f, "#{}", o),
            Value::Packet(None) => f.write_str("null"),
            Value::Packet(Some(p)) => f.write_str(&p.to_debug_string()),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            other => match other.as_i64() {
                Some(n) => write!(f, "{}", n),
                None => Ok(()),
            },
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from!(
    bool => Bool,
    i8 => Byte,
    u8 => UByte,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<Value> => List,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DynamicPacket> for Value {
    fn from(p: DynamicPacket) -> Self {
        Value::Packet(Some(Box::new(p)))
    }
}

impl From<Box<dyn BluePacket>> for Value {
    fn from(p: Box<dyn BluePacket>) -> Self {
        Value::Packet(Some(p))
    }
}
