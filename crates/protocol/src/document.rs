//! Persisted and exported document shapes.
//!
//! Collections deserialize leniently: an entry that does not match its type is
//! dropped instead of failing the whole document, and a non-array value counts
//! as absent.

use crate::model::{Group, IndividualPlacement, Marker, MarkerKind, Member, Stroke};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const EXPORT_VERSION: &str = "1.0";

fn lenient<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(lenient_opt(d)?.unwrap_or_default())
}

fn lenient_opt<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = serde_json::Value::deserialize(d)?;
    let serde_json::Value::Array(items) = raw else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect(),
    ))
}

fn lenient_array<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = Vec::<serde_json::Value>::deserialize(d)?;
    Ok(items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

fn lenient_map<'de, D>(d: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(d)?;
    let serde_json::Value::Object(map) = raw else {
        return Ok(None);
    };
    Ok(Some(
        map.into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect(),
    ))
}

/// The nine marker collections, flattened into both document shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerSet {
    #[serde(default, deserialize_with = "lenient")]
    pub objectives: Vec<Marker>,
    #[serde(default, deserialize_with = "lenient")]
    pub bosses: Vec<Marker>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub blue_towers: Option<Vec<Marker>>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub red_towers: Option<Vec<Marker>>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub blue_trees: Option<Vec<Marker>>,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub red_trees: Option<Vec<Marker>>,
    #[serde(default, deserialize_with = "lenient")]
    pub blue_geese: Vec<Marker>,
    #[serde(default, deserialize_with = "lenient")]
    pub red_geese: Vec<Marker>,
    #[serde(default, deserialize_with = "lenient")]
    pub enemies: Vec<Marker>,
    /// Single-colour tower list from before the blue/red split.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub towers: Option<Vec<Marker>>,
    /// Single-colour tree list from before the blue/red split.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub trees: Option<Vec<Marker>>,
}

impl MarkerSet {
    pub fn from_collections<'a>(
        mut collection: impl FnMut(MarkerKind) -> &'a [Marker],
    ) -> MarkerSet {
        let mut owned = |kind| collection(kind).to_vec();
        MarkerSet {
            objectives: owned(MarkerKind::Objective),
            bosses: owned(MarkerKind::Boss),
            blue_towers: Some(owned(MarkerKind::BlueTower)),
            red_towers: Some(owned(MarkerKind::RedTower)),
            blue_trees: Some(owned(MarkerKind::BlueTree)),
            red_trees: Some(owned(MarkerKind::RedTree)),
            blue_geese: owned(MarkerKind::BlueGoose),
            red_geese: owned(MarkerKind::RedGoose),
            enemies: owned(MarkerKind::EnemyGroup),
            towers: None,
            trees: None,
        }
    }

    /// Resolves the collection for `kind`. The legacy `towers`/`trees` lists
    /// stand in for the blue variant only when neither split list is present.
    pub fn collection(&self, kind: MarkerKind) -> &[Marker] {
        fn split_or_legacy<'a>(
            own: &'a Option<Vec<Marker>>,
            sibling: &'a Option<Vec<Marker>>,
            legacy: &'a Option<Vec<Marker>>,
        ) -> &'a [Marker] {
            match (own, sibling, legacy) {
                (Some(v), _, _) => v.as_slice(),
                (None, None, Some(v)) => v.as_slice(),
                _ => &[],
            }
        }

        match kind {
            MarkerKind::Objective => self.objectives.as_slice(),
            MarkerKind::Boss => self.bosses.as_slice(),
            MarkerKind::BlueTower => split_or_legacy(&self.blue_towers, &self.red_towers, &self.towers),
            MarkerKind::RedTower => self.red_towers.as_deref().unwrap_or_default(),
            MarkerKind::BlueTree => split_or_legacy(&self.blue_trees, &self.red_trees, &self.trees),
            MarkerKind::RedTree => self.red_trees.as_deref().unwrap_or_default(),
            MarkerKind::BlueGoose => self.blue_geese.as_slice(),
            MarkerKind::RedGoose => self.red_geese.as_slice(),
            MarkerKind::EnemyGroup => self.enemies.as_slice(),
        }
    }
}

/// Board snapshot written to the durable store on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDocument {
    #[serde(default, deserialize_with = "lenient")]
    pub members: Vec<IndividualPlacement>,
    #[serde(default, deserialize_with = "lenient")]
    pub groups: Vec<Group>,
    #[serde(flatten)]
    pub markers: MarkerSet,
}

/// What the store may hold under the board key. The oldest format was a bare
/// list of individual placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredBoard {
    Legacy(#[serde(deserialize_with = "lenient_array")] Vec<IndividualPlacement>),
    Current(BoardDocument),
}

/// Portable, self-contained board file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Any JSON value; see [`ExportDocument::has_version`].
    #[serde(default)]
    pub version: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub players: Option<Vec<Member>>,
    #[serde(default, deserialize_with = "lenient")]
    pub individuals: Vec<IndividualPlacement>,
    #[serde(default, deserialize_with = "lenient")]
    pub groups: Vec<Group>,
    #[serde(flatten)]
    pub markers: MarkerSet,
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub drawings: Option<Vec<Stroke>>,
    #[serde(default, deserialize_with = "lenient_map", skip_serializing_if = "Option::is_none")]
    pub team_names: Option<BTreeMap<String, String>>,
}

impl ExportDocument {
    /// A version tag counts as present unless it is `null`, an empty string,
    /// zero or `false`.
    pub fn has_version(&self) -> bool {
        match &self.version {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => false,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(_) => true,
        }
    }
}
