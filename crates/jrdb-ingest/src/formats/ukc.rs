//! UKC: horse master (馬基本データ)

use crate::entity::EntityKind;
use crate::error::SchemaError;
use crate::schema::{FieldKind, FieldSchema, SchemaSet};

const SEX: FieldKind = FieldKind::Choice {
    codes: &[("1", "colt"), ("2", "filly"), ("3", "gelding")],
};

pub(super) fn schema() -> Result<SchemaSet, SchemaError> {
    let fields = vec![
        FieldSchema::new("pedigree_reg_num", 1, 8, FieldKind::String)
            .to(EntityKind::Horse, "pedigree_reg_num"),
        FieldSchema::new("horse_name", 9, 36, FieldKind::String).to(EntityKind::Horse, "name"),
        FieldSchema::new("sex", 45, 1, SEX).to(EntityKind::Horse, "sex"),
        FieldSchema::new("birth_date", 46, 8, FieldKind::Date { format: "%Y%m%d" })
            .to(EntityKind::Horse, "birth_date"),
        FieldSchema::new("data_as_of", 54, 8, FieldKind::Date { format: "%Y%m%d" })
            .to(EntityKind::Horse, "data_as_of"),
    ];

    SchemaSet::new("UKC", "horse master", fields, vec![])
}
