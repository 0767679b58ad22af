//! Compile-time schema errors.

use crate::ast::Location;
use std::fmt;

/// Fatal parse or validation failure. Carries the position and the offending token
/// (`what`) so a caller can print `file:line: message: what`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub message: String,
    pub what: Option<String>,
    pub location: Option<Location>,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        SchemaError {
            message: message.into(),
            what: None,
            location: None,
        }
    }

    pub fn with_what(mut self, what: impl Into<String>) -> Self {
        self.what = Some(what.into());
        self
    }

    /// Sets the location unless one is already recorded.
    pub fn at(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}: ", loc)?;
        }
        f.write_str(&self.message)?;
        if let Some(what) = &self.what {
            write!(f, ": {}", what)?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_location() {
        let loc = Location { file: "a.bp".into(), line: 7 };
        let e = SchemaError::new("Duplicate field name").with_what("Foo.bar").at(&loc);
        assert_eq!(e.to_string(), "a.bp:7: Duplicate field name: Foo.bar");
        let e = e.at(&Location { file: "b.bp".into(), line: 1 });
        assert_eq!(e.location.as_ref().map(|l| l.line), Some(7));
    }
}
