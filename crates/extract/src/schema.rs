use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a product or recipe in the remote system.
pub type Identifier = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Product,
    Recipe,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Product, EntityKind::Recipe];

    /// Name of the JSON field that references this kind in a days export
    pub fn field_name(&self) -> &'static str {
        match self {
            EntityKind::Product => "product_id",
            EntityKind::Recipe => "recipe_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Product => write!(f, "product"),
            EntityKind::Recipe => write!(f, "recipe"),
        }
    }
}

/// Identifiers found in one input document, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedIds {
    pub products: Vec<Identifier>,
    pub recipes: Vec<Identifier>,
}

impl ExtractedIds {
    pub fn get(&self, kind: EntityKind) -> &[Identifier] {
        match kind {
            EntityKind::Product => &self.products,
            EntityKind::Recipe => &self.recipes,
        }
    }

    pub fn total(&self) -> usize {
        self.products.len() + self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
