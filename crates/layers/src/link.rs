//! Join metadata between layers and the knots that pull data through it.

use scene::{Aggregation, LevelType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    Intersects,
    Contains,
    Within,
    Touches,
    Crosses,
    Overlaps,
    Nearest,
    Direct,
    /// Change of level inside one layer.
    Inneragg,
}

/// One hop of a knot's link scheme, read from `this_layer`'s point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDescription {
    pub this_layer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_layer: Option<String>,
    pub predicate: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_level: Option<LevelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_level: Option<LevelType>,
    /// The other side is an abstract (non-geometric) data layer.
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
}

/// A join precomputed for a layer, stored alongside its features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedLayer {
    pub predicate: Predicate,
    pub layer_id: String,
    pub this_level: LevelType,
    pub other_level: LevelType,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
}

impl JoinedLayer {
    pub fn matches(&self, link: &LinkDescription) -> bool {
        self.is_abstract == link.is_abstract
            && link.other_layer.as_deref() == Some(self.layer_id.as_str())
            && link.other_level == Some(self.other_level)
            && link.this_level == Some(self.this_level)
            && link.predicate == self.predicate
    }
}

/// Result of a join: abstract values, or for a physical join the ids of the
/// other layer's elements related to each element of this one (`None` when
/// nothing matched).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedObjects {
    pub joined_layer_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_ids: Option<Vec<Option<Vec<u32>>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedJson {
    #[serde(default)]
    pub joined_layers: Vec<JoinedLayer>,
    #[serde(default)]
    pub joined_objects: Vec<JoinedObjects>,
}

impl JoinedJson {
    /// Objects of the last joined layer matching `link`.
    pub fn objects_for(&self, link: &LinkDescription) -> Option<&JoinedObjects> {
        let index = self
            .joined_layers
            .iter()
            .rposition(|joined| joined.matches(link))?;
        self.joined_objects
            .iter()
            .find(|o| o.joined_layer_index == index)
    }
}

/// Binding of a layer's color to data reached through a chain of links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Knot {
    pub id: String,
    #[serde(default)]
    pub link_scheme: Vec<LinkDescription>,
    #[serde(default)]
    pub aggregation_scheme: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_map: Option<String>,
}

impl Knot {
    /// Layer that receives the knot's values: `this_layer` of the last link.
    pub fn target_layer(&self) -> Option<&str> {
        self.link_scheme.last().map(|l| l.this_layer.as_str())
    }
}
