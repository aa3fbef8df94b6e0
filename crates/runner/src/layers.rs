//! Output layer naming for classified entities.

use std::collections::BTreeMap;

use extract::{Classification, FALLBACK_CATEGORY, FALLBACK_TYPE};
use serde::{Deserialize, Serialize};

/// AutoCAD color index used when a layer has no explicit color (white).
pub const DEFAULT_COLOR: u8 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub name: String,
    pub color: u8,
}

/// category → type → output layer. Pairs not listed get
/// `"{prefix}-{category}-{type}"` in [`DEFAULT_COLOR`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerSchema {
    categories: BTreeMap<String, BTreeMap<String, LayerStyle>>,
}

impl Default for LayerSchema {
    fn default() -> Self {
        let mut schema = Self::empty();
        for (kind, layer, color) in [
            ("basic", "p-parking-basic", 7),
            ("large", "p-parking-large", 3),
            ("compact", "p-parking-small", 4),
            ("disabled", "p-parking-disable", 1),
            ("electric", "p-parking-large-electric", 5),
            ("women", "p-parking-large-women", 6),
        ] {
            schema.insert("parking", kind, layer, color);
        }
        schema
    }
}

impl LayerSchema {
    pub fn empty() -> Self {
        Self {
            categories: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, category: &str, kind: &str, name: &str, color: u8) {
        self.categories.entry(category.to_string()).or_default().insert(
            kind.to_string(),
            LayerStyle {
                name: name.to_string(),
                color,
            },
        );
    }

    pub fn style(&self, category: &str, kind: &str) -> LayerStyle {
        self.categories
            .get(category)
            .and_then(|types| types.get(kind))
            .cloned()
            .unwrap_or_else(|| LayerStyle {
                name: default_layer_name(category, kind),
                color: DEFAULT_COLOR,
            })
    }

    /// Layer for an entity; unclassified entities go to the fallback layer.
    pub fn style_for(&self, classification: Option<&Classification>) -> LayerStyle {
        match classification {
            Some(c) => self.style(&c.category, &c.kind),
            None => self.style(FALLBACK_CATEGORY, FALLBACK_TYPE),
        }
    }
}

pub fn layer_prefix(category: &str) -> char {
    match category {
        "parking" => 'p',
        "structure" => 's',
        "circulation" => 'c',
        "facility" => 'f',
        _ => 'x',
    }
}

pub fn default_layer_name(category: &str, kind: &str) -> String {
    format!("{}-{}-{}", layer_prefix(category), category, kind)
}
