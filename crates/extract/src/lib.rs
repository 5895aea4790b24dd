pub mod patterns;
pub mod schema;

pub use patterns::{extract_ids, extract_ids_for_field};
pub use schema::{EntityKind, ExtractedIds, Identifier};

/// Collect product and recipe references from a days export in one pass per kind
pub fn extract_all(text: &str) -> ExtractedIds {
    let ids = ExtractedIds {
        products: extract_ids(text, EntityKind::Product),
        recipes: extract_ids(text, EntityKind::Recipe),
    };

    tracing::debug!(
        products = ids.products.len(),
        recipes = ids.recipes.len(),
        "Extracted entity references"
    );

    ids
}
