//! Field schema
//!
//! A [`SchemaSet`] is the complete layout of one file format: the ordered
//! field declarations, where each value goes, and which fields are voted on
//! per group. Layouts are validated once when the set is built, so decoding
//! and transforming never meet an inconsistent declaration.

mod field;
mod value;

use std::collections::HashMap;

pub use field::{DeriveFn, FieldKind, FieldSchema, Target, MAX_SCALE};
pub use value::{KeyPart, NaturalKey, Value, ValueType};

use crate::entity::EntityKind;
use crate::error::SchemaError;

/// Fields whose values must agree across every row sharing the same group key
#[derive(Debug, Clone)]
pub struct ConsensusRule {
    /// Labels of the fields forming the group key
    pub group_by: &'static [&'static str],
    /// Labels of the fields replaced by the group's most common value
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone)]
pub struct SchemaSet {
    code: &'static str,
    description: &'static str,
    fields: Vec<FieldSchema>,
    consensus: Vec<ConsensusRule>,
    line_width: usize,
}

impl SchemaSet {
    pub fn new(
        code: &'static str,
        description: &'static str,
        fields: Vec<FieldSchema>,
        consensus: Vec<ConsensusRule>,
    ) -> Result<Self, SchemaError> {
        let line_width = fields.iter().map(FieldSchema::end).max().unwrap_or(0);
        let set = Self {
            code,
            description,
            fields,
            consensus,
            line_width,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn consensus(&self) -> &[ConsensusRule] {
        &self.consensus
    }

    /// Minimum number of bytes a data line must have
    pub fn line_width(&self) -> usize {
        self.line_width
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.label == label)
    }

    pub fn field(&self, label: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.label == label)
    }

    /// Entities this layout writes, in load order
    pub fn entities(&self) -> Vec<EntityKind> {
        EntityKind::LOAD_ORDER
            .into_iter()
            .filter(|kind| self.targets(*kind).next().is_some())
            .collect()
    }

    /// Fields routed to `entity`, in declaration order
    pub fn targets(&self, entity: EntityKind) -> impl Iterator<Item = (usize, &FieldSchema)> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(move |(_, f)| f.target.is_some_and(|t| t.entity == entity))
    }

    fn validate(&self) -> Result<(), SchemaError> {
        let format = || self.code.to_string();
        let mut labels: HashMap<&str, usize> = HashMap::new();
        let mut targets: HashMap<Target, &str> = HashMap::new();

        for (idx, field) in self.fields.iter().enumerate() {
            let label = || field.label.to_string();

            if labels.insert(field.label, idx).is_some() {
                return Err(SchemaError::DuplicateLabel {
                    format: format(),
                    label: label(),
                });
            }

            match &field.kind {
                FieldKind::Derived { inputs, .. } => {
                    // Inputs must already be computed when this field runs
                    for input in inputs.iter() {
                        if !self.fields[..idx].iter().any(|f| f.label == *input) {
                            return Err(SchemaError::DerivedInput {
                                format: format(),
                                label: label(),
                                input: input.to_string(),
                            });
                        }
                    }
                }
                kind => {
                    if field.declared_start() == 0 {
                        return Err(SchemaError::ZeroOffset {
                            format: format(),
                            label: label(),
                        });
                    }
                    if field.byte_width == 0 {
                        return Err(SchemaError::ZeroWidth {
                            format: format(),
                            label: label(),
                        });
                    }
                    self.validate_kind(field, kind)?;
                }
            }

            if let Some(target) = field.target {
                let def = target.entity.def();
                if def.parent_link(target.attribute).is_some() {
                    return Err(SchemaError::ParentColumnTarget {
                        format: format(),
                        attribute: target.to_string(),
                    });
                }
                if def.is_key_column(target.attribute) && !field.value_type().is_keyable() {
                    return Err(SchemaError::UnkeyableAttribute {
                        format: format(),
                        attribute: target.to_string(),
                    });
                }
                if let Some(first) = targets.insert(target, field.label) {
                    return Err(SchemaError::DuplicateTarget {
                        format: format(),
                        attribute: target.to_string(),
                        first: first.to_string(),
                        second: label(),
                    });
                }
            }
        }

        for entity in self.entities() {
            let def = entity.def();
            for key in def.key {
                let filled_by_parent = def.parent_link(key).is_some();
                let targeted = targets.contains_key(&Target {
                    entity,
                    attribute: *key,
                });
                if !filled_by_parent && !targeted {
                    return Err(SchemaError::MissingKey {
                        format: format(),
                        entity,
                        attribute: key.to_string(),
                    });
                }
            }
            for link in def.parents.iter().filter(|l| l.required) {
                if self.targets(link.parent).next().is_none() {
                    return Err(SchemaError::MissingParent {
                        format: format(),
                        entity,
                        parent: link.parent,
                    });
                }
            }
        }

        for rule in &self.consensus {
            for label in rule.group_by.iter().chain(rule.fields.iter()) {
                if !labels.contains_key(label) {
                    return Err(SchemaError::ConsensusField {
                        format: format(),
                        label: label.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn validate_kind(&self, field: &FieldSchema, kind: &FieldKind) -> Result<(), SchemaError> {
        let format = self.code.to_string();
        let label = field.label.to_string();
        match kind {
            FieldKind::Float { scale } if *scale > MAX_SCALE => Err(SchemaError::Scale {
                format,
                label,
                scale: *scale,
                max: MAX_SCALE,
            }),
            FieldKind::Choice { codes } if codes.is_empty() => {
                Err(SchemaError::EmptyChoice { format, label })
            }
            FieldKind::Array {
                element,
                element_width,
                count,
            } => {
                if !element.is_scalar() {
                    return Err(SchemaError::ArrayElement {
                        format,
                        label,
                        element: element.name(),
                    });
                }
                let expected = element_width * count;
                if expected == 0 || expected != field.byte_width {
                    return Err(SchemaError::ArrayWidth {
                        format,
                        label,
                        width: field.byte_width,
                        element_width: *element_width,
                        count: *count,
                        expected,
                    });
                }
                self.validate_kind(field, element)
            }
            _ => Ok(()),
        }
    }
}
