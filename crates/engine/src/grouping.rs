//! Proximity grouping of team placements.
//!
//! A group merges with another whenever its center lands strictly inside
//! [`GROUP_MERGE_DISTANCE`](crate::GROUP_MERGE_DISTANCE) of it. When several
//! groups are in range the earliest-placed one wins: groups are scanned in
//! the order they were created or restored, and merged groups keep the
//! survivor's slot.

use std::f64::consts::TAU;
use tracing::debug;
use warboard_protocol::{Group, IndividualPlacement, MemberId, Point, RoleCount, TeamKey};

use crate::board::Board;
use crate::error::{BoardError, BoardResult};
use crate::roster::Roster;
use crate::{new_id, MAX_PLAYERS, SPLIT_MEMBER_OFFSET_X, SPLIT_TEAM_RADIUS, TEAM_DROP_OFFSET};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupChange {
    Created { group_id: String },
    Merged { into: String },
    Moved { group_id: String },
}

impl GroupChange {
    pub fn group_id(&self) -> &str {
        match self {
            GroupChange::Created { group_id } | GroupChange::Moved { group_id } => group_id,
            GroupChange::Merged { into } => into,
        }
    }
}

impl Board {
    /// Drops every unplaced member of `team` at `(x, y)`, merging into a group
    /// already within range or creating a new one.
    pub fn place_team(&mut self, roster: &Roster, team: TeamKey, x: f64, y: f64) -> BoardResult<GroupChange> {
        let new_ids: Vec<MemberId> = roster
            .of_team(team)
            .map(|m| m.id)
            .filter(|id| !self.is_placed(*id))
            .collect();
        if new_ids.is_empty() {
            return Err(BoardError::NoEligibleMembers { team });
        }
        if self.total_placed_players() + new_ids.len() > MAX_PLAYERS {
            return Err(BoardError::capacity(team.as_str(), MAX_PLAYERS));
        }

        if let Some(idx) = self.find_group_near(Point::new(x, y), None) {
            let group = &mut self.groups[idx];
            if !group.teams.contains(&team) {
                group.teams.push(team);
            }
            group.member_ids.extend(new_ids);
            debug!(group_id = %group.id, %team, "team merged into nearby group");
            return Ok(GroupChange::Merged {
                into: group.id.clone(),
            });
        }

        let group = Group {
            id: new_id("group"),
            teams: vec![team],
            member_ids: new_ids,
            x: x + TEAM_DROP_OFFSET,
            y: y - TEAM_DROP_OFFSET,
        };
        let group_id = group.id.clone();
        self.groups.push(group);
        Ok(GroupChange::Created { group_id })
    }

    /// Moves a group; if it lands in range of another group it is absorbed by
    /// that group. At most one merge happens per drag.
    pub fn drag_group(&mut self, group_id: &str, x: f64, y: f64) -> BoardResult<GroupChange> {
        let idx = self.group_index(group_id)?;
        self.groups[idx].x = x;
        self.groups[idx].y = y;

        let Some(target) = self.find_group_near(Point::new(x, y), Some(group_id)) else {
            return Ok(GroupChange::Moved {
                group_id: group_id.to_string(),
            });
        };

        let moved = self.groups.remove(idx);
        let target = if target > idx { target - 1 } else { target };
        let survivor = &mut self.groups[target];
        for team in moved.teams {
            if !survivor.teams.contains(&team) {
                survivor.teams.push(team);
            }
        }
        survivor.member_ids.extend(moved.member_ids);
        debug!(from = %moved.id, into = %survivor.id, "dragged group merged");
        Ok(GroupChange::Merged {
            into: survivor.id.clone(),
        })
    }

    /// Pulls one member out of a group and places them individually beside
    /// it. The member is already counted, so no capacity check applies.
    pub fn split_member_from_group(
        &mut self,
        roster: &Roster,
        group_id: &str,
        member_id: MemberId,
    ) -> BoardResult<IndividualPlacement> {
        let idx = self.group_index(group_id)?;
        if !roster.contains(member_id) {
            return Err(BoardError::UnknownMember { member_id });
        }
        let group = &self.groups[idx];
        if !group.member_ids.contains(&member_id) {
            return Err(BoardError::NotInGroup {
                group_id: group_id.to_string(),
                member_id,
            });
        }
        let at = Point::new(group.x + SPLIT_MEMBER_OFFSET_X, group.y);
        Ok(self.relocate_into_individual(member_id, at.x, at.y))
    }

    /// Replaces a multi-team group with one group per team, laid out on a
    /// circle around the original center.
    pub fn split_group_by_team(&mut self, roster: &Roster, group_id: &str) -> BoardResult<Vec<Group>> {
        let idx = self.group_index(group_id)?;
        if self.groups[idx].teams.len() <= 1 {
            return Err(BoardError::SingleTeamGroup {
                group_id: group_id.to_string(),
            });
        }
        let source = self.groups.remove(idx);

        // Members edited onto a team outside the group's set still need a home.
        let mut teams = source.teams.clone();
        for id in &source.member_ids {
            if let Some(m) = roster.get(*id) {
                if !teams.contains(&m.team) {
                    teams.push(m.team);
                }
            }
        }

        let team_count = teams.len() as f64;
        let mut created = Vec::new();
        for (index, team) in teams.iter().enumerate() {
            let member_ids: Vec<MemberId> = source
                .member_ids
                .iter()
                .copied()
                .filter(|id| roster.get(*id).is_some_and(|m| m.team == *team))
                .collect();
            if member_ids.is_empty() {
                continue;
            }
            let angle = TAU * index as f64 / team_count;
            created.push(Group {
                id: new_id("group"),
                teams: vec![*team],
                member_ids,
                x: source.x + angle.cos() * SPLIT_TEAM_RADIUS,
                y: source.y + angle.sin() * SPLIT_TEAM_RADIUS,
            });
        }
        self.groups.extend(created.iter().cloned());
        Ok(created)
    }

    pub fn role_breakdown(&self, roster: &Roster, group_id: &str) -> Option<RoleCount> {
        let group = self.group(group_id)?;
        let mut count = RoleCount::default();
        for member in group.member_ids.iter().filter_map(|id| roster.get(*id)) {
            count.add(member.role);
        }
        Some(count)
    }

    fn group_index(&self, group_id: &str) -> BoardResult<usize> {
        self.groups
            .iter()
            .position(|g| g.id == group_id)
            .ok_or_else(|| BoardError::UnknownGroup {
                group_id: group_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::tests::full_roster;
    use std::collections::BTreeSet;

    fn placed(board: &Board) -> usize {
        board.total_placed_players()
    }

    #[test]
    fn second_team_in_range_merges() {
        let roster = full_roster(5);
        let mut board = Board::new();
        let g1 = board.place_team(&roster, TeamKey::Team1, 100.0, 100.0).unwrap();
        let GroupChange::Created { group_id } = g1 else {
            panic!("expected a new group");
        };
        assert_eq!(board.group(&group_id).map(|g| g.member_ids.len()), Some(5));

        let g2 = board.place_team(&roster, TeamKey::Team2, 110.0, 105.0).unwrap();
        assert_eq!(g2, GroupChange::Merged { into: group_id.clone() });
        let merged = board.group(&group_id).unwrap();
        assert_eq!(merged.member_ids.len(), 10);
        assert_eq!(merged.teams, vec![TeamKey::Team1, TeamKey::Team2]);
        assert_eq!(board.groups().len(), 1);
    }

    #[test]
    fn team_drop_out_of_range_creates_group_with_offset() {
        let roster = full_roster(5);
        let mut board = Board::new();
        board.place_team(&roster, TeamKey::Team1, 100.0, 100.0).unwrap();
        board.place_team(&roster, TeamKey::Team2, 400.0, 400.0).unwrap();
        assert_eq!(board.groups().len(), 2);
        let g = &board.groups()[1];
        assert_eq!((g.x, g.y), (421.0, 379.0));
    }

    #[test]
    fn team_drop_rejections_leave_board_unchanged() {
        let roster = full_roster(6);
        let mut board = Board::new();
        board.place_team(&roster, TeamKey::Team1, 0.0, 0.0).unwrap();
        assert_eq!(
            board.place_team(&roster, TeamKey::Team1, 500.0, 0.0),
            Err(BoardError::NoEligibleMembers { team: TeamKey::Team1 })
        );

        // 6 + 14 individuals = 20 placed; another full team of 6 fits (26),
        // a further one would not.
        for m in roster.of_team(TeamKey::Team2).chain(roster.of_team(TeamKey::Team3)) {
            board.place_member(m, 900.0, 900.0).unwrap();
        }
        for m in roster.of_team(TeamKey::Team4).take(2) {
            board.place_member(m, 900.0, 900.0).unwrap();
        }
        assert_eq!(placed(&board), 20);
        board.place_team(&roster, TeamKey::Team5, 300.0, 300.0).unwrap();
        let before = board.clone();
        let err = board.place_team(&roster, TeamKey::Team6, 300.0, 300.0);
        assert!(matches!(err, Err(BoardError::CapacityExceeded { .. })));
        assert_eq!(board, before);
    }

    #[test]
    fn full_board_rejects_another_team() {
        let roster = full_roster(6);
        let mut board = Board::new();
        board.place_team(&roster, TeamKey::Team1, 100.0, 100.0).unwrap();
        board.place_team(&roster, TeamKey::Team2, 110.0, 105.0).unwrap();
        assert_eq!(board.groups().len(), 1);
        for team in [TeamKey::Team3, TeamKey::Team4, TeamKey::Team5] {
            for m in roster.of_team(team) {
                board.place_member(m, 600.0, 600.0).unwrap();
            }
        }
        assert_eq!(placed(&board), 30);
        let before = board.clone();
        let err = board.place_team(&roster, TeamKey::Team6, 10.0, 10.0);
        assert!(matches!(err, Err(BoardError::CapacityExceeded { limit: 30, .. })));
        assert_eq!(board, before);
    }

    #[test]
    fn drag_merges_into_first_group_in_range() {
        let roster = full_roster(5);
        let mut board = Board::new();
        let a = board.place_team(&roster, TeamKey::Team1, 0.0, 0.0).unwrap();
        let b = board.place_team(&roster, TeamKey::Team2, 100.0, 0.0).unwrap();
        let c = board.place_team(&roster, TeamKey::Team3, 0.0, 500.0).unwrap();
        assert_eq!(board.groups().len(), 3);
        let total = placed(&board);

        // a sits at (21, -21) and b at (121, -21); this spot is 50 from both.
        let merged = board.drag_group(c.group_id(), 71.0, -21.0).unwrap();
        assert_eq!(merged, GroupChange::Merged { into: a.group_id().to_string() });
        assert_eq!(placed(&board), total);
        assert!(board.group(c.group_id()).is_none());
        let survivor = board.group(a.group_id()).unwrap();
        assert_eq!(survivor.teams, vec![TeamKey::Team1, TeamKey::Team3]);
        assert_eq!(survivor.member_ids.len(), 10);
        assert_eq!(board.group(b.group_id()).map(|g| g.member_ids.len()), Some(5));

        let moved = board.drag_group(b.group_id(), 121.0, 400.0).unwrap();
        assert_eq!(moved, GroupChange::Moved { group_id: b.group_id().to_string() });
        assert_eq!(board.groups().len(), 2);
    }

    #[test]
    fn drag_unknown_group_errors() {
        let mut board = Board::new();
        assert!(matches!(
            board.drag_group("group-missing", 0.0, 0.0),
            Err(BoardError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn split_member_places_beside_group_without_changing_total() {
        let roster = full_roster(5);
        let mut board = Board::new();
        let g = board.place_team(&roster, TeamKey::Team1, 100.0, 100.0).unwrap();
        let group = board.group(g.group_id()).unwrap().clone();
        let total = placed(&board);

        let p = board.split_member_from_group(&roster, &group.id, group.member_ids[0]).unwrap();
        assert_eq!((p.x, p.y), (group.x + 50.0, group.y));
        assert_eq!(placed(&board), total);
        assert_eq!(board.group(&group.id).unwrap().member_ids.len(), 4);

        let err = board.split_member_from_group(&roster, &group.id, group.member_ids[0]);
        assert!(matches!(err, Err(BoardError::NotInGroup { .. })));
    }

    #[test]
    fn splitting_last_member_deletes_group() {
        let roster = full_roster(1);
        let mut board = Board::new();
        let g = board.place_team(&roster, TeamKey::Team4, 0.0, 0.0).unwrap();
        let id = board.group(g.group_id()).unwrap().member_ids[0];
        board.split_member_from_group(&roster, g.group_id(), id).unwrap();
        assert!(board.groups().is_empty());
        assert_eq!(board.individuals().len(), 1);
    }

    #[test]
    fn split_by_team_partitions_members() {
        let roster = full_roster(3);
        let mut board = Board::new();
        let g = board.place_team(&roster, TeamKey::Team1, 200.0, 200.0).unwrap();
        board.place_team(&roster, TeamKey::Team2, 200.0, 200.0).unwrap();
        board.place_team(&roster, TeamKey::Team3, 200.0, 200.0).unwrap();
        let original = board.group(g.group_id()).unwrap().clone();
        assert_eq!(original.member_ids.len(), 9);

        let created = board.split_group_by_team(&roster, &original.id).unwrap();
        assert_eq!(created.len(), 3);
        assert!(board.group(&original.id).is_none());
        let mut seen = BTreeSet::new();
        for (i, group) in created.iter().enumerate() {
            assert_eq!(group.teams.len(), 1);
            assert_eq!(group.member_ids.len(), 3);
            for id in &group.member_ids {
                assert!(seen.insert(*id), "member {id} in two groups");
            }
            let expected = TAU * i as f64 / 3.0;
            assert!((group.x - (original.x + expected.cos() * 45.0)).abs() < 1e-9);
            assert!((group.y - (original.y + expected.sin() * 45.0)).abs() < 1e-9);
        }
        assert_eq!(seen, original.member_ids.iter().copied().collect());
        assert_eq!(placed(&board), 9);
    }

    #[test]
    fn split_single_team_group_fails() {
        let roster = full_roster(2);
        let mut board = Board::new();
        let g = board.place_team(&roster, TeamKey::Team1, 0.0, 0.0).unwrap();
        let before = board.clone();
        assert!(matches!(
            board.split_group_by_team(&roster, g.group_id()),
            Err(BoardError::SingleTeamGroup { .. })
        ));
        assert_eq!(board, before);
    }

    #[test]
    fn role_breakdown_skips_unknown_ids() {
        let roster = full_roster(4);
        let mut board = Board::new();
        let g = board.place_team(&roster, TeamKey::Team1, 0.0, 0.0).unwrap();
        board.groups[0].member_ids.push(999);
        let count = board.role_breakdown(&roster, g.group_id()).unwrap();
        assert_eq!(count.total(), 4);
    }
}
