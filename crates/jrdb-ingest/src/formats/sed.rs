//! SED: race results (成績データ)
//!
//! Race-level conditions are repeated on every contender line. Track variant,
//! pace and going are occasionally inconsistent between lines of the same
//! race, so they are settled by consensus.

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::schema::{ConsensusRule, FieldKind, FieldSchema, SchemaSet, ValueType};
use crate::transform::derived;

use super::{race_key, RACE_KEY, SURFACE};

const TRACK_CONDITION: FieldKind = FieldKind::Choice {
    codes: &[
        ("10", "firm"),
        ("11", "firm_fast"),
        ("12", "firm_slow"),
        ("20", "good"),
        ("21", "good_fast"),
        ("22", "good_slow"),
        ("30", "yielding"),
        ("31", "yielding_fast"),
        ("32", "yielding_slow"),
        ("40", "heavy"),
        ("41", "heavy_fast"),
        ("42", "heavy_slow"),
    ],
};

const PACE: FieldKind = FieldKind::Choice {
    codes: &[("H", "high"), ("M", "middle"), ("S", "slow")],
};

pub(super) fn schema() -> Result<SchemaSet, SchemaError> {
    let mut fields = race_key();
    fields.extend([
        FieldSchema::new("contender_num", 9, 2, FieldKind::Integer)
            .to(EntityKind::Contender, "num"),
        FieldSchema::new("pedigree_reg_num", 11, 8, FieldKind::String)
            .to(EntityKind::Horse, "pedigree_reg_num"),
        FieldSchema::new("race_date", 19, 8, FieldKind::Date { format: "%Y%m%d" })
            .to(EntityKind::Program, "held_on"),
        FieldSchema::new("horse_name", 27, 36, FieldKind::String).to(EntityKind::Horse, "name"),
        FieldSchema::new("distance", 63, 4, FieldKind::Integer).to(EntityKind::Race, "distance"),
        FieldSchema::new("surface", 67, 1, SURFACE).to(EntityKind::Race, "surface"),
        FieldSchema::new("track_condition", 68, 2, TRACK_CONDITION)
            .to(EntityKind::Race, "track_condition"),
        FieldSchema::new("finish_position", 70, 2, FieldKind::Integer)
            .to(EntityKind::Contender, "finish_position"),
        FieldSchema::new("finish_time_raw", 72, 4, FieldKind::Integer),
        FieldSchema::new("weight_carried", 76, 3, FieldKind::Float { scale: 1 })
            .to(EntityKind::Contender, "weight_carried"),
        FieldSchema::new("win_odds", 79, 6, FieldKind::Float { scale: 1 })
            .to(EntityKind::Contender, "win_odds"),
        FieldSchema::new("popularity", 85, 2, FieldKind::Integer)
            .to(EntityKind::Contender, "popularity"),
        FieldSchema::new("track_variant", 87, 3, FieldKind::Integer)
            .to(EntityKind::Race, "track_variant"),
        FieldSchema::new("pace", 90, 1, PACE).to(EntityKind::Race, "pace"),
        FieldSchema::derived(
            "finish_time",
            &["finish_time_raw"],
            ValueType::Double,
            derived::minutes_seconds_tenths,
        )
        .to(EntityKind::Contender, "finish_time"),
        // Results are authoritative for the horse as of the race date
        FieldSchema::derived("data_as_of", &["race_date"], ValueType::Date, derived::copy)
            .to(EntityKind::Horse, "data_as_of"),
    ]);

    let consensus = vec![ConsensusRule {
        group_by: RACE_KEY,
        fields: &["track_variant", "pace", "track_condition"],
    }];

    SchemaSet::new("SED", "race results", fields, consensus)
}
