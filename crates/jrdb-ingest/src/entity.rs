//! Persistent entity catalogue
//!
//! Every table the loader writes is described here once: its natural key, the
//! parents whose surrogate ids it stores, and the optional recency column that
//! guards updates. Load order follows the parent links.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Program,
    Race,
    Horse,
    Jockey,
    Trainer,
    Contender,
}

impl EntityKind {
    /// Parents always precede their children
    pub const LOAD_ORDER: [EntityKind; 6] = [
        EntityKind::Program,
        EntityKind::Race,
        EntityKind::Horse,
        EntityKind::Jockey,
        EntityKind::Trainer,
        EntityKind::Contender,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Program => "program",
            EntityKind::Race => "race",
            EntityKind::Horse => "horse",
            EntityKind::Jockey => "jockey",
            EntityKind::Trainer => "trainer",
            EntityKind::Contender => "contender",
        }
    }

    pub fn def(self) -> &'static EntityDef {
        match self {
            EntityKind::Program => &PROGRAM,
            EntityKind::Race => &RACE,
            EntityKind::Horse => &HORSE,
            EntityKind::Jockey => &JOCKEY,
            EntityKind::Trainer => &TRAINER,
            EntityKind::Contender => &CONTENDER,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Column on a child row holding the surrogate id of its parent
#[derive(Debug, Clone, Copy)]
pub struct ParentLink {
    pub parent: EntityKind,
    pub column: &'static str,
    /// A child row whose required parent did not resolve is skipped. An
    /// optional link is stored as null instead.
    pub required: bool,
}

#[derive(Debug)]
pub struct EntityDef {
    pub kind: EntityKind,
    pub table: &'static str,
    /// Natural key columns, in the order of the table's unique constraint
    pub key: &'static [&'static str],
    pub parents: &'static [ParentLink],
    /// Date marker compared before overwriting an existing row
    pub recency_column: Option<&'static str>,
}

impl EntityDef {
    pub fn parent_link(&self, column: &str) -> Option<&ParentLink> {
        self.parents.iter().find(|link| link.column == column)
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.key.contains(&column)
    }
}

static PROGRAM: EntityDef = EntityDef {
    kind: EntityKind::Program,
    table: "programs",
    key: &["venue_id", "year", "round", "day"],
    parents: &[],
    recency_column: None,
};

static RACE: EntityDef = EntityDef {
    kind: EntityKind::Race,
    table: "races",
    key: &["program_id", "num"],
    parents: &[ParentLink {
        parent: EntityKind::Program,
        column: "program_id",
        required: true,
    }],
    recency_column: None,
};

static HORSE: EntityDef = EntityDef {
    kind: EntityKind::Horse,
    table: "horses",
    key: &["pedigree_reg_num"],
    parents: &[],
    recency_column: Some("data_as_of"),
};

static JOCKEY: EntityDef = EntityDef {
    kind: EntityKind::Jockey,
    table: "jockeys",
    key: &["code"],
    parents: &[],
    recency_column: None,
};

static TRAINER: EntityDef = EntityDef {
    kind: EntityKind::Trainer,
    table: "trainers",
    key: &["code"],
    parents: &[],
    recency_column: None,
};

static CONTENDER: EntityDef = EntityDef {
    kind: EntityKind::Contender,
    table: "contenders",
    key: &["race_id", "num"],
    parents: &[
        ParentLink {
            parent: EntityKind::Race,
            column: "race_id",
            required: true,
        },
        ParentLink {
            parent: EntityKind::Horse,
            column: "horse_id",
            required: true,
        },
        ParentLink {
            parent: EntityKind::Jockey,
            column: "jockey_id",
            required: false,
        },
        ParentLink {
            parent: EntityKind::Trainer,
            column: "trainer_id",
            required: false,
        },
    ],
    recency_column: None,
};
