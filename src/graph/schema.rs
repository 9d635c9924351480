//! Graph schema for the contract relationship mirror

use serde::{Deserialize, Serialize};

use super::labels;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSchema {
    pub property_keys: Vec<PropertyKey>,
    pub vertex_labels: Vec<Label>,
    pub edge_labels: Vec<EdgeLabel>,
    pub vertex_indexes: Vec<Index>,
    pub edge_indexes: Vec<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyKey {
    pub name: String,
    pub data_type: String,
    pub cardinality: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeLabel {
    pub name: String,
    pub multiplicity: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,
    pub property_keys: Vec<String>,
    pub composite: bool,
    pub unique: bool,
}

fn string_key(name: &str) -> PropertyKey {
    PropertyKey {
        name: name.to_string(),
        data_type: "String".to_string(),
        cardinality: "SINGLE".to_string(),
    }
}

fn index(name: &str, key: &str, unique: bool) -> Index {
    Index {
        name: name.to_string(),
        property_keys: vec![key.to_string()],
        composite: true,
        unique,
    }
}

impl GraphSchema {
    /// Schema for party/contract/location vertices and their edges
    pub fn contracts() -> Self {
        Self {
            property_keys: ["name", "location", "title", "party", "enddate", "startdate", "hash"]
                .iter()
                .map(|k| string_key(k))
                .collect(),
            vertex_labels: [labels::PARTY, labels::CONTRACT, labels::LOCATION]
                .iter()
                .map(|l| Label {
                    name: l.to_string(),
                })
                .collect(),
            edge_labels: [labels::PARTIES_EDGE, labels::LOCATIONS_EDGE]
                .iter()
                .map(|l| EdgeLabel {
                    name: l.to_string(),
                    multiplicity: "MULTI".to_string(),
                })
                .collect(),
            vertex_indexes: vec![
                index("vByContract", "name", true),
                index("vByLocation", "location", true),
                index("vByParty", "party", true),
            ],
            edge_indexes: vec![
                index("eByParties", "party", false),
                index("eByLocations", "location", false),
            ],
        }
    }
}
