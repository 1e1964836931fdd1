//! Board snapshots for the durable store and the portable export file.
//!
//! Loading never fails on bad entries: dangling member ids, duplicates and
//! anything past the player or enemy caps are dropped, then the rest of the
//! document is applied.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};
use warboard_protocol::{
    BoardDocument, ExportDocument, Group, IndividualPlacement, Marker, MarkerKind, MarkerSet,
    MemberId, Point, Stroke, StoredBoard, EXPORT_VERSION,
};

use crate::board::Board;
use crate::error::{BoardError, BoardResult};
use crate::roster::Roster;
use crate::teams::TeamNames;
use crate::{new_id, ENEMIES_PER_GROUP, MAX_ENEMIES, MAX_PLAYERS};

pub fn board_document(board: &Board) -> BoardDocument {
    BoardDocument {
        members: board.individuals.clone(),
        groups: board.groups.clone(),
        markers: MarkerSet::from_collections(|kind| board.markers(kind)),
    }
}

pub fn restore_board(stored: StoredBoard, roster: &Roster) -> Board {
    match stored {
        StoredBoard::Legacy(individuals) => {
            debug!(count = individuals.len(), "reading legacy board list");
            rebuild(individuals, Vec::new(), &MarkerSet::default(), roster)
        }
        StoredBoard::Current(doc) => rebuild(doc.members, doc.groups, &doc.markers, roster),
    }
}

fn rebuild(
    individuals: Vec<IndividualPlacement>,
    groups: Vec<Group>,
    markers: &MarkerSet,
    roster: &Roster,
) -> Board {
    let mut board = Board::new();
    let mut placed: BTreeSet<MemberId> = BTreeSet::new();
    let mut dropped = 0usize;

    for p in individuals {
        if !roster.contains(p.member_id) || placed.contains(&p.member_id) || placed.len() >= MAX_PLAYERS {
            dropped += 1;
            continue;
        }
        placed.insert(p.member_id);
        board.individuals.push(p);
    }

    for mut group in groups {
        let mut member_ids = Vec::with_capacity(group.member_ids.len());
        for id in group.member_ids {
            if roster.contains(id) && !placed.contains(&id) && !member_ids.contains(&id) {
                member_ids.push(id);
            }
        }
        if member_ids.is_empty() || placed.len() + member_ids.len() > MAX_PLAYERS {
            dropped += 1;
            continue;
        }
        placed.extend(member_ids.iter().copied());
        group.member_ids = member_ids;
        let mut teams = Vec::with_capacity(group.teams.len());
        for team in group.teams {
            if !teams.contains(&team) {
                teams.push(team);
            }
        }
        group.teams = teams;
        if group.id.is_empty() || board.group(&group.id).is_some() {
            group.id = new_id("group");
        }
        board.groups.push(group);
    }

    for kind in MarkerKind::ALL {
        let mut list: Vec<Marker> = Vec::new();
        for mut marker in markers.collection(kind).iter().cloned() {
            if kind == MarkerKind::EnemyGroup {
                if (list.len() as u32 + 1) * ENEMIES_PER_GROUP > MAX_ENEMIES {
                    dropped += 1;
                    continue;
                }
                marker.count = Some(ENEMIES_PER_GROUP);
            } else {
                marker.count = None;
            }
            if marker.id.is_empty() || list.iter().any(|m| m.id == marker.id) {
                marker.id = new_id(kind.slug());
            }
            list.push(marker);
        }
        if !list.is_empty() {
            board.markers.insert(kind, list);
        }
    }

    if dropped > 0 {
        warn!(dropped, "skipped board entries while restoring");
    }
    board
}

/// A fully validated import, ready to be swapped in. Strokes and team names
/// are `None` when the file has no such section; the current ones stay.
#[derive(Debug, Clone)]
pub struct ImportedBoard {
    pub roster: Roster,
    pub board: Board,
    pub strokes: Option<Vec<Stroke>>,
    pub team_names: Option<TeamNames>,
}

pub fn export_document(
    roster: &Roster,
    board: &Board,
    strokes: &[Stroke],
    team_names: &TeamNames,
) -> ExportDocument {
    let export_date = OffsetDateTime::now_utc().format(&Rfc3339).ok();
    let round = |x: f64, y: f64| Point::new(x, y).rounded();

    let individuals = board
        .individuals()
        .iter()
        .map(|p| {
            let at = round(p.x, p.y);
            IndividualPlacement {
                member_id: p.member_id,
                x: at.x,
                y: at.y,
            }
        })
        .collect();
    let groups = board
        .groups()
        .iter()
        .map(|g| {
            let at = round(g.x, g.y);
            Group {
                x: at.x,
                y: at.y,
                ..g.clone()
            }
        })
        .collect();
    let rounded_markers: BTreeMap<MarkerKind, Vec<Marker>> = MarkerKind::ALL
        .into_iter()
        .map(|kind| {
            let list = board
                .markers(kind)
                .iter()
                .map(|m| {
                    let at = round(m.x, m.y);
                    Marker {
                        x: at.x,
                        y: at.y,
                        ..m.clone()
                    }
                })
                .collect();
            (kind, list)
        })
        .collect();

    ExportDocument {
        version: Some(serde_json::Value::from(EXPORT_VERSION)),
        export_date,
        players: Some(roster.members().to_vec()),
        individuals,
        groups,
        markers: MarkerSet::from_collections(|kind| {
            rounded_markers.get(&kind).map(Vec::as_slice).unwrap_or_default()
        }),
        drawings: Some(strokes.to_vec()),
        team_names: Some(team_names.to_raw()),
    }
}

/// Validates an export file. Nothing is applied here; the caller swaps the
/// result in as a whole.
pub fn parse_import(json: &str, now_ms: i64) -> BoardResult<ImportedBoard> {
    let doc: ExportDocument =
        serde_json::from_str(json).map_err(|err| BoardError::invalid_format(err.to_string()))?;
    if !doc.has_version() {
        return Err(BoardError::invalid_format("missing version"));
    }
    let Some(players) = doc.players else {
        return Err(BoardError::invalid_format("missing players"));
    };

    let roster = Roster::new(players);
    let board = rebuild(doc.individuals, doc.groups, &doc.markers, &roster);
    let team_names = doc.team_names.map(|raw| TeamNames::from_raw(raw).0);
    let strokes = doc.drawings.map(|drawings| {
        drawings
            .into_iter()
            .filter(|s| s.points.len() >= 2)
            .map(|mut s| {
                if s.id.is_empty() {
                    s.id = new_id("stroke");
                }
                if s.timestamp == 0 {
                    s.timestamp = now_ms;
                }
                s
            })
            .collect()
    });

    Ok(ImportedBoard {
        roster,
        board,
        strokes,
        team_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::tests::{full_roster, member};
    use warboard_protocol::TeamKey;

    fn stored(json: &str) -> StoredBoard {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn legacy_list_restores_individuals() {
        let roster = full_roster(1);
        let board = restore_board(
            stored(r#"[{"memberId":1,"x":10,"y":20},{"memberId":99,"x":0,"y":0}]"#),
            &roster,
        );
        assert_eq!(board.individuals().len(), 1);
        assert_eq!(board.individuals()[0].member_id, 1);
    }

    #[test]
    fn restore_skips_dangling_and_duplicate_ids() {
        let roster = full_roster(2);
        let board = restore_board(
            stored(
                r#"{
                "members":[{"memberId":1,"x":0,"y":0},{"memberId":1,"x":5,"y":5}],
                "groups":[
                    {"id":"g1","teams":["Team 1","FrontLine"],"memberIds":[1,2,77],"x":0,"y":0},
                    {"id":"g2","teams":["Team 4"],"memberIds":[77],"x":0,"y":0}
                ]}"#,
            ),
            &roster,
        );
        assert_eq!(board.individuals().len(), 1);
        assert_eq!(board.groups().len(), 1);
        let g = &board.groups()[0];
        assert_eq!(g.member_ids, vec![2]);
        assert_eq!(g.teams, vec![TeamKey::Team1]);
        assert_eq!(board.total_placed_players(), 2);
    }

    #[test]
    fn restore_stops_at_player_cap() {
        let roster = full_roster(6);
        let members: Vec<String> = (1..=36)
            .map(|id| format!(r#"{{"memberId":{id},"x":0,"y":0}}"#))
            .collect();
        let json = format!(
            r#"{{"members":[{}],"groups":[{{"id":"g","teams":["Team 6"],"memberIds":[31],"x":0,"y":0}}]}}"#,
            members[..28].join(",")
        );
        let board = restore_board(stored(&json), &roster);
        assert_eq!(board.total_placed_players(), 29);

        let json = format!(r#"{{"members":[{}]}}"#, members.join(","));
        let board = restore_board(stored(&json), &roster);
        assert_eq!(board.total_placed_players(), MAX_PLAYERS);
    }

    #[test]
    fn restore_caps_enemy_groups_and_fills_ids() {
        let enemies: Vec<&str> = std::iter::repeat(r#"{"x":1,"y":1,"count":99}"#).take(8).collect();
        let json = format!(r#"{{"enemies":[{}],"bosses":[{{"x":3,"y":4}}]}}"#, enemies.join(","));
        let board = restore_board(stored(&json), &Roster::default());
        let enemies = board.markers(MarkerKind::EnemyGroup);
        assert_eq!(enemies.len(), 6);
        assert!(enemies.iter().all(|m| m.count == Some(5)));
        assert_eq!(board.enemy_total(), 30);
        let boss = &board.markers(MarkerKind::Boss)[0];
        assert!(boss.id.starts_with("boss-"));
    }

    #[test]
    fn legacy_tower_list_restores_as_blue() {
        let board = restore_board(
            stored(r#"{"towers":[{"id":"t1","x":1,"y":1}]}"#),
            &Roster::default(),
        );
        assert_eq!(board.markers(MarkerKind::BlueTower).len(), 1);
        assert!(board.markers(MarkerKind::RedTower).is_empty());
    }

    #[test]
    fn stored_document_restores_losslessly() {
        let roster = full_roster(2);
        let mut board = Board::new();
        board.place_member(&member(1, TeamKey::Team1), 10.5, 20.25).unwrap();
        board.place_team(&roster, TeamKey::Team3, 300.0, 300.0).unwrap();
        board.place_marker(MarkerKind::RedGoose, 4.0, 4.0).unwrap();
        board.place_marker(MarkerKind::EnemyGroup, 8.0, 8.0).unwrap();

        let json = serde_json::to_string(&board_document(&board)).unwrap();
        let restored = restore_board(stored(&json), &roster);
        assert_eq!(restored, board);
    }

    #[test]
    fn import_requires_version_and_players() {
        for bad in [
            r#"{"players":[]}"#,
            r#"{"version":"","players":[]}"#,
            r#"{"version":null,"players":[]}"#,
            r#"{"version":"1.0"}"#,
            "not json",
            "[1,2]",
        ] {
            assert!(
                matches!(parse_import(bad, 0), Err(BoardError::InvalidFormat { .. })),
                "{bad}"
            );
        }
        let numeric = parse_import(r#"{"version":1,"players":[]}"#, 0).unwrap();
        assert!(numeric.roster.is_empty());
    }

    #[test]
    fn import_without_optional_sections_leaves_them_unset() {
        let imported = parse_import(r#"{"version":"1.0","players":[]}"#, 0).unwrap();
        assert!(imported.strokes.is_none());
        assert!(imported.team_names.is_none());
    }

    #[test]
    fn export_rounds_coordinates_and_import_reads_it_back() {
        let roster = full_roster(1);
        let mut board = Board::new();
        board.place_member(&member(2, TeamKey::Team2), 10.4, 20.6).unwrap();
        board.place_marker(MarkerKind::Objective, 1.5, -1.4).unwrap();
        let (names, _) =
            TeamNames::from_raw(BTreeMap::from([("Team 1".to_string(), "Vanguard".to_string())]));
        let strokes = vec![Stroke {
            id: "s1".into(),
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            timestamp: 42,
            color: "#123456".into(),
            width: 3.0,
        }];

        let doc = export_document(&roster, &board, &strokes, &names);
        assert_eq!(doc.version, Some(serde_json::Value::from(EXPORT_VERSION)));
        assert!(doc.export_date.is_some());
        assert_eq!((doc.individuals[0].x, doc.individuals[0].y), (10.0, 21.0));
        assert_eq!(doc.markers.objectives[0].x, 2.0);

        let json = serde_json::to_string(&doc).unwrap();
        let imported = parse_import(&json, 1_000).unwrap();
        assert_eq!(imported.roster, roster);
        assert_eq!(imported.strokes, Some(strokes));
        let names = imported.team_names.unwrap();
        assert_eq!(names.display_name(TeamKey::Team1), "Vanguard");
        assert_eq!(imported.board.individuals()[0].y, 21.0);
        assert_eq!(
            imported.board.markers(MarkerKind::Objective)[0].id,
            board.markers(MarkerKind::Objective)[0].id
        );
    }

    #[test]
    fn import_fills_missing_stroke_fields_and_drops_taps() {
        let json = r#"{
            "version":"1.0","players":[],
            "drawings":[
                {"points":[{"x":0,"y":0},{"x":2,"y":2}]},
                {"points":[{"x":0,"y":0}]}
            ]}"#;
        let imported = parse_import(json, 777).unwrap();
        let strokes = imported.strokes.unwrap();
        assert_eq!(strokes.len(), 1);
        let s = &strokes[0];
        assert_eq!(s.timestamp, 777);
        assert!(s.id.starts_with("stroke-"));
        assert_eq!(s.color, "#ff0000");
    }
}
