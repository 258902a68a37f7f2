//! KYI: pre-race contender data (競走馬データ)

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::schema::{FieldKind, FieldSchema, SchemaSet};

use super::race_key;

const RUNNING_STYLE: FieldKind = FieldKind::Choice {
    codes: &[
        ("1", "front_runner"),
        ("2", "stalker"),
        ("3", "mid_pack"),
        ("4", "closer"),
    ],
};

pub(super) fn schema() -> Result<SchemaSet, SchemaError> {
    let mut fields = race_key();
    fields.extend([
        FieldSchema::new("contender_num", 9, 2, FieldKind::Integer)
            .to(EntityKind::Contender, "num"),
        FieldSchema::new("pedigree_reg_num", 11, 8, FieldKind::String)
            .to(EntityKind::Horse, "pedigree_reg_num"),
        FieldSchema::new("horse_name", 19, 36, FieldKind::String).to(EntityKind::Horse, "name"),
        FieldSchema::new("idm", 55, 5, FieldKind::Float { scale: 1 })
            .to(EntityKind::Contender, "idm"),
        FieldSchema::new("jockey_index", 60, 5, FieldKind::Float { scale: 1 })
            .to(EntityKind::Contender, "jockey_index"),
        FieldSchema::new("jockey_code", 65, 5, FieldKind::String).to(EntityKind::Jockey, "code"),
        FieldSchema::new("jockey_name", 70, 12, FieldKind::String).to(EntityKind::Jockey, "name"),
        FieldSchema::new("trainer_code", 82, 5, FieldKind::String).to(EntityKind::Trainer, "code"),
        FieldSchema::new("trainer_name", 87, 12, FieldKind::String).to(EntityKind::Trainer, "name"),
        FieldSchema::new("weight_carried", 99, 3, FieldKind::Float { scale: 1 })
            .to(EntityKind::Contender, "weight_carried"),
        FieldSchema::new(
            "blinkers",
            102,
            1,
            FieldKind::Boolean {
                true_literal: "1",
                false_literal: "0",
            },
        )
        .to(EntityKind::Contender, "blinkers"),
        FieldSchema::new("running_style", 103, 1, RUNNING_STYLE)
            .to(EntityKind::Contender, "running_style"),
    ]);

    SchemaSet::new("KYI", "pre-race contender data", fields, vec![])
}
