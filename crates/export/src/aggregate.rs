use anyhow::{Context, Result};
use extract::{EntityKind, Identifier};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Collects per-kind result mappings into one document keyed by identifier
#[derive(Debug, Default)]
pub struct Aggregator {
    entries: BTreeMap<Identifier, (EntityKind, String)>,
    collisions: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union with `mapping`. An identifier that is already present is overwritten.
    pub fn merge(&mut self, kind: EntityKind, mapping: HashMap<Identifier, String>) {
        for (id, document) in mapping {
            if let Some((previous, _)) = self.entries.insert(id.clone(), (kind, document)) {
                self.collisions += 1;
                warn!(
                    id = %id,
                    previous = %previous,
                    kind = %kind,
                    "Identifier fetched as more than one kind, keeping the latest"
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }

    /// Tab-indented JSON object with sorted identifiers. Each document is
    /// re-indented at its nesting level and keeps its own key order.
    pub fn finish(self) -> Result<String> {
        let mut document: BTreeMap<&str, Value> = BTreeMap::new();

        for (id, (kind, raw)) in &self.entries {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => {
                    document.insert(id, value);
                }
                Err(e) => {
                    anyhow::bail!(
                        "Failed to encode export: {} {} is not valid JSON ({})\npartial result: {:#?}",
                        kind,
                        id,
                        e,
                        self.entries
                    );
                }
            }
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        document
            .serialize(&mut serializer)
            .context("Failed to serialize export")?;

        String::from_utf8(buf).context("Serialized export is not UTF-8")
    }
}
