//! Built-in JRDB file layouts
//!
//! JRDB distributes one fixed-width file per data set and day, named after
//! the data set (`SED080126.txt`, `KYI080126.txt`, ...). The alphabetic
//! prefix of the file name selects the layout.

mod bac;
mod kyi;
mod oz;
mod sed;
mod ukc;

pub use oz::{ODDS_SLOTS, ODDS_WIDTH};

use std::collections::BTreeMap;
use std::path::Path;

use crate::entity::EntityKind;
use crate::error::{IngestError, SchemaError};
use crate::schema::{FieldKind, FieldSchema, SchemaSet};

/// Reference table the venue code of every race key resolves against
pub const VENUE: FieldKind = FieldKind::ForeignKey {
    table: "venues",
    natural_key: "code",
};

/// Labels of the race key fields shared by every race-level layout
pub const RACE_KEY: &[&str] = &["venue_code", "year", "round", "day", "race_num"];

/// First eight bytes of every race-level line: venue, year, meeting round,
/// meeting day (hex digit) and race number
fn race_key() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("venue_code", 1, 2, VENUE).to(EntityKind::Program, "venue_id"),
        FieldSchema::new("year", 3, 2, FieldKind::Integer).to(EntityKind::Program, "year"),
        FieldSchema::new("round", 5, 1, FieldKind::Integer).to(EntityKind::Program, "round"),
        FieldSchema::new("day", 6, 1, FieldKind::String).to(EntityKind::Program, "day"),
        FieldSchema::new("race_num", 7, 2, FieldKind::Integer).to(EntityKind::Race, "num"),
    ]
}

const SURFACE: FieldKind = FieldKind::Choice {
    codes: &[("1", "turf"), ("2", "dirt"), ("3", "steeplechase")],
};

/// Registered layouts keyed by format code
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<&'static str, SchemaSet>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every layout shipped with the loader
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.register(bac::schema()?)?;
        registry.register(kyi::schema()?)?;
        registry.register(oz::schema()?)?;
        registry.register(sed::schema()?)?;
        registry.register(ukc::schema()?)?;
        Ok(registry)
    }

    pub fn register(&mut self, schema: SchemaSet) -> Result<(), SchemaError> {
        let code = schema.code();
        if self.formats.contains_key(code) {
            return Err(SchemaError::DuplicateFormat(code.to_string()));
        }
        self.formats.insert(code, schema);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&SchemaSet> {
        self.formats.get(code)
    }

    /// Layout for a file, picked by its name
    pub fn for_path(&self, path: &Path) -> Result<&SchemaSet, IngestError> {
        let code = format_code_for(path).unwrap_or_default();
        self.get(&code).ok_or_else(|| IngestError::UnknownFormat {
            code,
            path: path.to_path_buf(),
        })
    }

    pub fn codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.formats.keys().copied()
    }
}

/// Upper-cased leading alphabetic prefix of the file name
pub fn format_code_for(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let code: String = name
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    (!code.is_empty()).then_some(code)
}
