//! BAC: race programme (番組データ)

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::schema::{FieldKind, FieldSchema, SchemaSet, ValueType};
use crate::transform::derived;

use super::{race_key, SURFACE};

const DIRECTION: FieldKind = FieldKind::Choice {
    codes: &[("1", "right"), ("2", "left"), ("3", "straight"), ("9", "other")],
};

const GRADE: FieldKind = FieldKind::Choice {
    codes: &[
        ("1", "g1"),
        ("2", "g2"),
        ("3", "g3"),
        ("4", "graded"),
        ("5", "special"),
        ("6", "listed"),
    ],
};

pub(super) fn schema() -> Result<SchemaSet, SchemaError> {
    let mut fields = race_key();
    fields.extend([
        FieldSchema::new("held_on", 9, 8, FieldKind::Date { format: "%Y%m%d" })
            .to(EntityKind::Program, "held_on"),
        FieldSchema::new("post_time", 17, 4, FieldKind::String).to(EntityKind::Race, "post_time"),
        FieldSchema::new("distance", 21, 4, FieldKind::Integer).to(EntityKind::Race, "distance"),
        FieldSchema::new("surface", 25, 1, SURFACE).to(EntityKind::Race, "surface"),
        FieldSchema::new("direction", 26, 1, DIRECTION).to(EntityKind::Race, "direction"),
        FieldSchema::new("grade", 27, 1, GRADE).to(EntityKind::Race, "grade"),
        FieldSchema::new("race_name", 28, 50, FieldKind::String).to(EntityKind::Race, "name"),
        FieldSchema::new("head_count", 78, 2, FieldKind::Integer)
            .to(EntityKind::Race, "head_count"),
        // Prize in units of 10,000 yen, blank for races without a listed purse
        FieldSchema::new("first_prize_raw", 80, 5, FieldKind::Integer),
        FieldSchema::new(
            "win_ticket_sold",
            85,
            1,
            FieldKind::Boolean {
                true_literal: "1",
                false_literal: "0",
            },
        )
        .to(EntityKind::Race, "win_ticket_sold"),
        FieldSchema::derived(
            "first_prize",
            &["first_prize_raw"],
            ValueType::BigInt,
            derived::zero_when_blank_if_any,
        )
        .to(EntityKind::Race, "first_prize"),
    ]);

    SchemaSet::new("BAC", "race programme", fields, vec![])
}
