use crate::schema::{EntityKind, Identifier};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static PRODUCT_ID_RE: Lazy<Regex> = Lazy::new(|| field_pattern(EntityKind::Product.field_name()));
static RECIPE_ID_RE: Lazy<Regex> = Lazy::new(|| field_pattern(EntityKind::Recipe.field_name()));

/// `"<field>" : "<value>"`, whitespace (newlines included) allowed around the colon.
/// The value stops at the next quote and never crosses a line break.
fn field_pattern(field: &str) -> Regex {
    let pattern = format!(r#""{}"\s*:\s*"(.*?)""#, regex::escape(field));
    Regex::new(&pattern).expect("escaped field name always forms a valid pattern")
}

fn pattern_for(kind: EntityKind) -> &'static Regex {
    match kind {
        EntityKind::Product => &PRODUCT_ID_RE,
        EntityKind::Recipe => &RECIPE_ID_RE,
    }
}

/// Unique identifiers of `kind` referenced anywhere in `text`, in order of first occurrence
pub fn extract_ids(text: &str, kind: EntityKind) -> Vec<Identifier> {
    collect_unique(pattern_for(kind), text)
}

/// Same as [`extract_ids`] for an arbitrary reference field
pub fn extract_ids_for_field(text: &str, field: &str) -> Vec<Identifier> {
    match EntityKind::ALL.into_iter().find(|kind| kind.field_name() == field) {
        Some(kind) => extract_ids(text, kind),
        None => collect_unique(&field_pattern(field), text),
    }
}

fn collect_unique(re: &Regex, text: &str) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for caps in re.captures_iter(text) {
        let value = &caps[1];
        if value.is_empty() {
            continue;
        }
        if seen.insert(value.to_string()) {
            ids.push(value.to_string());
        }
    }

    ids
}
