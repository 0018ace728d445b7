use std::any::TypeId;
use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::database::entity::{Entity, EntityDescriptor};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid identifier '{identifier}' on entity {entity}")]
    InvalidIdentifier { entity: &'static str, identifier: String },

    #[error("Entity {entity} declares tenant column '{column}' which is not one of its columns")]
    MissingTenantColumn { entity: &'static str, column: &'static str },

    #[error("Table '{table}' is mapped by both {first} and {second}")]
    DuplicateTable {
        table: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("Table '{table}' is scoped by both '{first}' and '{second}'")]
    ConflictingScope {
        table: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

/// Declares the entity types exposed as top-level collections
#[derive(Default)]
pub struct SchemaBuilder {
    collections: Vec<EntityDescriptor>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection<T: Entity>(mut self) -> Self {
        self.collections.push(T::descriptor());
        self
    }

    /// Validate every reachable entity type and freeze the model
    pub fn build(self) -> Result<SchemaModel, SchemaError> {
        let model = SchemaModel {
            entities: walk_graph(&self.collections),
            collections: self.collections,
        };

        let mut tables: HashMap<&'static str, &'static str> = HashMap::new();
        for entity in &model.entities {
            validate_descriptor(entity)?;
            if let Some(first) = tables.insert(entity.table, entity.name) {
                return Err(SchemaError::DuplicateTable {
                    table: entity.table,
                    first,
                    second: entity.name,
                });
            }
        }

        tracing::info!(
            "Schema model built: {} collections, {} entity types",
            model.collections.len(),
            model.entities.len()
        );
        Ok(model)
    }
}

/// Immutable schema model shared by every session
#[derive(Debug, Clone)]
pub struct SchemaModel {
    collections: Vec<EntityDescriptor>,
    entities: Vec<EntityDescriptor>,
}

impl SchemaModel {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Types declared as top-level collections, in declaration order
    pub fn collections(&self) -> &[EntityDescriptor] {
        &self.collections
    }

    /// Every type reachable from the collections, each listed once
    pub fn entity_types(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn find(&self, type_id: TypeId) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|d| d.type_id == type_id)
    }

    pub fn contains<T: Entity>(&self) -> bool {
        self.find(TypeId::of::<T>()).is_some()
    }
}

/// Breadth-first walk over declared relationships
fn walk_graph(roots: &[EntityDescriptor]) -> Vec<EntityDescriptor> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut queue: VecDeque<EntityDescriptor> = roots.iter().copied().collect();

    while let Some(descriptor) = queue.pop_front() {
        if !seen.insert(descriptor.type_id) {
            continue;
        }
        queue.extend((descriptor.related)());
        ordered.push(descriptor);
    }
    ordered
}

fn validate_descriptor(entity: &EntityDescriptor) -> Result<(), SchemaError> {
    let identifiers = std::iter::once(entity.table)
        .chain(std::iter::once(entity.key_column))
        .chain(entity.columns.iter().copied());
    for identifier in identifiers {
        if !is_valid_identifier(identifier) {
            return Err(SchemaError::InvalidIdentifier {
                entity: entity.name,
                identifier: identifier.to_string(),
            });
        }
    }

    if let Some(column) = entity.tenant_column {
        if !entity.columns.contains(&column) {
            return Err(SchemaError::MissingTenantColumn {
                entity: entity.name,
                column,
            });
        }
    }
    Ok(())
}

pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
