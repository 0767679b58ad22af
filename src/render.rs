//! Debug rendering of packet fields: `{TypeName name=value ...}`.
//!
//! Fields at their default (false, 0, empty, no packet, first enum member) are
//! omitted. Booleans print as `1`, strings are quoted, enums print their member
//! name and lists print as `{ElementType *N|e1|e2}`; a composite element prints
//! only its fields, so `{MyInner *2| iInteger=777| iInteger=6666}`.

use crate::value::Value;

/// How a field's values print.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Plain,
    Enum(&'a [String]),
    /// Statically typed nested packet; list elements print fields only.
    Composite,
    /// `packet` or abstract field; elements print in full.
    Polymorphic,
}

/// Append ` name=value` unless `value` is at its default.
pub fn append_field(out: &mut String, name: &str, type_name: &str, shape: Shape<'_>, value: &Value) {
    if value.is_default() {
        return;
    }
    out.push(' ');
    out.push_str(name);
    out.push('=');
    match value {
        Value::List(items) => {
            out.push('{');
            out.push_str(type_name);
            out.push_str(" *");
            out.push_str(&items.len().to_string());
            for item in items {
                out.push('|');
                append_element(out, shape, item);
            }
            out.push('}');
        }
        other => append_scalar(out, shape, other),
    }
}

fn append_element(out: &mut String, shape: Shape<'_>, value: &Value) {
    match (shape, value) {
        (Shape::Composite, Value::Packet(Some(p))) => p.fields_to_string(out),
        (_, Value::Bool(b)) => out.push(if *b { '1' } else { '0' }),
        (_, Value::Packet(None)) => out.push_str("null"),
        _ => append_scalar(out, shape, value),
    }
}

fn append_scalar(out: &mut String, shape: Shape<'_>, value: &Value) {
    match (shape, value) {
        (_, Value::Bool(b)) => out.push(if *b { '1' } else { '0' }),
        (Shape::Enum(members), Value::Enum(o)) => match members.get(*o as usize) {
            Some(m) => out.push_str(m),
            None => out.push_str(&o.to_string()),
        },
        (_, Value::Packet(Some(p))) => out.push_str(&p.to_debug_string()),
        _ => out.push_str(&value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_skipped() {
        let mut out = String::new();
        append_field(&mut out, "a", "int", Shape::Plain, &Value::Int(0));
        append_field(&mut out, "b", "bool", Shape::Plain, &Value::Bool(false));
        append_field(&mut out, "c", "string", Shape::Plain, &Value::from(""));
        assert!(out.is_empty());
    }

    #[test]
    fn scalars_and_lists() {
        let members = vec!["NO".to_string(), "MAYBE".to_string()];
        let mut out = String::new();
        append_field(&mut out, "f", "bool", Shape::Plain, &Value::Bool(true));
        append_field(&mut out, "s", "string", Shape::Plain, &Value::from("x y"));
        append_field(&mut out, "e", "MyEnum", Shape::Enum(&members), &Value::Enum(1));
        append_field(
            &mut out,
            "l",
            "bool",
            Shape::Plain,
            &Value::List(vec![Value::Bool(true), Value::Bool(false)]),
        );
        append_field(&mut out, "u", "ubyte", Shape::Plain, &Value::UByte(200));
        assert_eq!(out, " f=1 s=\"x y\" e=MAYBE l={bool *2|1|0} u=200");
    }
}
