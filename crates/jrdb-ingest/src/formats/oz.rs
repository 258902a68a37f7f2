//! OZ: basic odds (基準オッズ)

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::schema::{FieldKind, FieldSchema, SchemaSet};

use super::race_key;

/// Odds cells hold zero-padded digits with one implied decimal
const ODDS: FieldKind = FieldKind::Float { scale: 1 };

/// Slots per odds array, one per possible contender number
pub const ODDS_SLOTS: usize = 18;

pub const ODDS_WIDTH: usize = 5;

pub(super) fn schema() -> Result<SchemaSet, SchemaError> {
    let mut fields = race_key();
    fields.extend([
        FieldSchema::new("head_count", 9, 2, FieldKind::Integer).to(EntityKind::Race, "head_count"),
        FieldSchema::array("win_odds", 11, &ODDS, ODDS_WIDTH, ODDS_SLOTS)
            .to(EntityKind::Race, "win_odds"),
        FieldSchema::array("place_odds", 101, &ODDS, ODDS_WIDTH, ODDS_SLOTS)
            .to(EntityKind::Race, "place_odds"),
    ]);

    SchemaSet::new("OZ", "basic odds", fields, vec![])
}
