use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type MemberId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Tank,
    #[serde(rename = "DPS")]
    Dps,
    Healer,
    Support,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Tank, Role::Dps, Role::Healer, Role::Support];
}

/// One of the six canonical team slots. Display names live in the team-name
/// overrides; the key itself never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TeamKey {
    Team1,
    Team2,
    Team3,
    Team4,
    Team5,
    Team6,
}

impl TeamKey {
    pub const ALL: [TeamKey; 6] = [
        TeamKey::Team1,
        TeamKey::Team2,
        TeamKey::Team3,
        TeamKey::Team4,
        TeamKey::Team5,
        TeamKey::Team6,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TeamKey::Team1 => "Team 1",
            TeamKey::Team2 => "Team 2",
            TeamKey::Team3 => "Team 3",
            TeamKey::Team4 => "Team 4",
            TeamKey::Team5 => "Team 5",
            TeamKey::Team6 => "Team 6",
        }
    }

    /// Maps the free-text team names used before the canonical keys existed.
    pub fn from_legacy(name: &str) -> Option<TeamKey> {
        match name {
            "FrontLine" => Some(TeamKey::Team1),
            "Jungle" => Some(TeamKey::Team2),
            "Defence 1" => Some(TeamKey::Team3),
            "Defence 2" => Some(TeamKey::Team4),
            "Backline 1" => Some(TeamKey::Team5),
            "Backline 2" => Some(TeamKey::Team6),
            _ => None,
        }
    }

    pub fn is_legacy_name(name: &str) -> bool {
        Self::from_legacy(name).is_some()
    }
}

impl fmt::Display for TeamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTeam(pub String);

impl fmt::Display for UnknownTeam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown team: {:?}", self.0)
    }
}

impl std::error::Error for UnknownTeam {}

impl FromStr for TeamKey {
    type Err = UnknownTeam;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TeamKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .or_else(|| TeamKey::from_legacy(s))
            .ok_or_else(|| UnknownTeam(s.to_string()))
    }
}

impl TryFrom<String> for TeamKey {
    type Error = UnknownTeam;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TeamKey> for String {
    fn from(value: TeamKey) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub role: Role,
    pub team: TeamKey,
    #[serde(default)]
    pub weapon1: String,
    #[serde(default)]
    pub weapon2: String,
}

/// Roster add/edit request. The id is assigned by the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDraft {
    pub name: String,
    pub role: Role,
    pub team: TeamKey,
    #[serde(default)]
    pub weapon1: String,
    #[serde(default)]
    pub weapon2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn rounded(self) -> Point {
        Point {
            x: self.x.round(),
            y: self.y.round(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualPlacement {
    pub member_id: MemberId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default)]
    pub id: String,
    pub teams: Vec<TeamKey>,
    pub member_ids: Vec<MemberId>,
    pub x: f64,
    pub y: f64,
}

impl Group {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    Objective,
    Boss,
    BlueTower,
    RedTower,
    BlueTree,
    RedTree,
    BlueGoose,
    RedGoose,
    EnemyGroup,
}

impl MarkerKind {
    pub const ALL: [MarkerKind; 9] = [
        MarkerKind::Objective,
        MarkerKind::Boss,
        MarkerKind::BlueTower,
        MarkerKind::RedTower,
        MarkerKind::BlueTree,
        MarkerKind::RedTree,
        MarkerKind::BlueGoose,
        MarkerKind::RedGoose,
        MarkerKind::EnemyGroup,
    ];

    /// Id prefix, also the kebab-case wire name.
    pub fn slug(self) -> &'static str {
        match self {
            MarkerKind::Objective => "objective",
            MarkerKind::Boss => "boss",
            MarkerKind::BlueTower => "blue-tower",
            MarkerKind::RedTower => "red-tower",
            MarkerKind::BlueTree => "blue-tree",
            MarkerKind::RedTree => "red-tree",
            MarkerKind::BlueGoose => "blue-goose",
            MarkerKind::RedGoose => "red-goose",
            MarkerKind::EnemyGroup => "enemy-group",
        }
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(default)]
    pub id: String,
    pub x: f64,
    pub y: f64,
    /// Enemy groups only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub id: String,
    pub points: Vec<Point>,
    /// Commit time, unix millis.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "default_stroke_color")]
    pub color: String,
    #[serde(default = "default_stroke_width")]
    pub width: f64,
}

pub const DEFAULT_STROKE_COLOR: &str = "#ff0000";
pub const STROKE_WIDTH: f64 = 3.0;

fn default_stroke_color() -> String {
    DEFAULT_STROKE_COLOR.to_string()
}

fn default_stroke_width() -> f64 {
    STROKE_WIDTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    pub tank: usize,
    pub dps: usize,
    pub healer: usize,
    pub support: usize,
}

impl RoleCount {
    pub fn add(&mut self, role: Role) {
        match role {
            Role::Tank => self.tank += 1,
            Role::Dps => self.dps += 1,
            Role::Healer => self.healer += 1,
            Role::Support => self.support += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.tank + self.dps + self.healer + self.support
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub roster_size: usize,
    pub placed_players: usize,
    pub max_players: usize,
    pub enemy_total: u32,
    pub max_enemies: u32,
    pub enemy_groups_exhausted: bool,
    pub marker_counts: std::collections::BTreeMap<MarkerKind, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_keys_accept_canonical_and_legacy_names() {
        assert_eq!("Team 4".parse::<TeamKey>(), Ok(TeamKey::Team4));
        assert_eq!("Backline 1".parse::<TeamKey>(), Ok(TeamKey::Team5));
        assert!("Team 7".parse::<TeamKey>().is_err());

        let member: Member =
            serde_json::from_str(r#"{"id":1,"name":"A","role":"DPS","team":"Jungle"}"#).unwrap();
        assert_eq!(member.team, TeamKey::Team2);
        assert_eq!(member.role, Role::Dps);
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["team"], "Team 2");
        assert_eq!(json["role"], "DPS");
    }

    #[test]
    fn marker_kinds_use_their_slug_on_the_wire() {
        for kind in MarkerKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.slug()));
        }
    }

    #[test]
    fn summary_fields_are_camel_case() {
        let summary = BoardSummary {
            roster_size: 12,
            placed_players: 4,
            max_players: 30,
            enemy_total: 5,
            max_enemies: 30,
            enemy_groups_exhausted: false,
            marker_counts: std::collections::BTreeMap::from([(MarkerKind::EnemyGroup, 1)]),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["placedPlayers"], 4);
        assert_eq!(json["enemyGroupsExhausted"], false);
        assert_eq!(json["markerCounts"]["enemy-group"], 1);
        assert!(json.get("placed_players").is_none());
    }

    #[test]
    fn stroke_defaults_color_and_width() {
        let s: Stroke = serde_json::from_str(r#"{"points":[{"x":1,"y":2}]}"#).unwrap();
        assert_eq!(s.color, DEFAULT_STROKE_COLOR);
        assert_eq!(s.width, STROKE_WIDTH);
        assert_eq!(s.timestamp, 0);
    }
}
