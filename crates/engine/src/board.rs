use std::collections::BTreeMap;
use warboard_protocol::{
    BoardSummary, Group, IndividualPlacement, Marker, MarkerKind, Member, MemberId, Point,
};

use crate::error::{BoardError, BoardResult};
use crate::{new_id, ENEMIES_PER_GROUP, MAX_ENEMIES, MAX_PLAYERS};

/// Everything placed on the map. Members are referenced by id only; the
/// roster owns them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Board {
    pub(crate) individuals: Vec<IndividualPlacement>,
    pub(crate) groups: Vec<Group>,
    pub(crate) markers: BTreeMap<MarkerKind, Vec<Marker>>,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn individuals(&self) -> &[IndividualPlacement] {
        &self.individuals
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    pub fn markers(&self, kind: MarkerKind) -> &[Marker] {
        self.markers.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty() && self.groups.is_empty() && self.marker_count() == 0
    }

    /// Individual placements plus every group's member count. Always
    /// recomputed so merges and splits can never leave a stale total.
    pub fn total_placed_players(&self) -> usize {
        self.individuals.len() + self.groups.iter().map(|g| g.member_ids.len()).sum::<usize>()
    }

    pub fn is_placed(&self, member_id: MemberId) -> bool {
        self.individuals.iter().any(|p| p.member_id == member_id)
            || self.groups.iter().any(|g| g.member_ids.contains(&member_id))
    }

    pub fn enemy_total(&self) -> u32 {
        self.markers(MarkerKind::EnemyGroup)
            .iter()
            .map(|m| m.count.unwrap_or(ENEMIES_PER_GROUP))
            .sum()
    }

    pub fn summary(&self, roster_size: usize) -> BoardSummary {
        let enemy_groups = self.markers(MarkerKind::EnemyGroup).len();
        BoardSummary {
            roster_size,
            placed_players: self.total_placed_players(),
            max_players: MAX_PLAYERS,
            enemy_total: self.enemy_total(),
            max_enemies: MAX_ENEMIES,
            enemy_groups_exhausted: enemy_groups_exhausted(enemy_groups),
            marker_counts: MarkerKind::ALL
                .into_iter()
                .map(|kind| (kind, self.markers(kind).len()))
                .collect(),
        }
    }

    pub fn place_member(&mut self, member: &Member, x: f64, y: f64) -> BoardResult<IndividualPlacement> {
        if self.is_placed(member.id) {
            return Err(BoardError::AlreadyPlaced {
                member_id: member.id,
                name: member.name.clone(),
            });
        }
        if self.total_placed_players() + 1 > MAX_PLAYERS {
            return Err(BoardError::capacity(member.name.clone(), MAX_PLAYERS));
        }
        Ok(self.insert_individual(member.id, x, y))
    }

    /// Unchecked placement for a member already counted on the board. The
    /// member is pulled out of any group first, so the total never grows.
    /// Only the group split path may call this.
    pub(crate) fn relocate_into_individual(
        &mut self,
        member_id: MemberId,
        x: f64,
        y: f64,
    ) -> IndividualPlacement {
        self.individuals.retain(|p| p.member_id != member_id);
        self.insert_individual(member_id, x, y)
    }

    fn insert_individual(&mut self, member_id: MemberId, x: f64, y: f64) -> IndividualPlacement {
        self.detach_from_groups(member_id);
        let placement = IndividualPlacement { member_id, x, y };
        self.individuals.push(placement.clone());
        placement
    }

    pub fn remove_member(&mut self, member_id: MemberId) -> bool {
        let before = self.individuals.len();
        self.individuals.retain(|p| p.member_id != member_id);
        self.individuals.len() != before
    }

    pub fn move_member(&mut self, member_id: MemberId, x: f64, y: f64) -> bool {
        match self.individuals.iter_mut().find(|p| p.member_id == member_id) {
            Some(p) => {
                p.x = x;
                p.y = y;
                true
            }
            None => false,
        }
    }

    /// Removes the member from every group, deleting groups left empty.
    /// Returns whether any group changed.
    pub(crate) fn detach_from_groups(&mut self, member_id: MemberId) -> bool {
        let mut changed = false;
        for group in &mut self.groups {
            let before = group.member_ids.len();
            group.member_ids.retain(|id| *id != member_id);
            changed |= group.member_ids.len() != before;
        }
        self.groups.retain(|g| !g.member_ids.is_empty());
        changed
    }

    /// Drops a member from the board entirely (roster delete).
    pub(crate) fn forget_member(&mut self, member_id: MemberId) -> bool {
        let individual = self.remove_member(member_id);
        let grouped = self.detach_from_groups(member_id);
        individual || grouped
    }

    pub fn remove_group(&mut self, group_id: &str) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g.id != group_id);
        self.groups.len() != before
    }

    pub fn place_marker(&mut self, kind: MarkerKind, x: f64, y: f64) -> BoardResult<Marker> {
        let count = if kind == MarkerKind::EnemyGroup {
            if enemy_groups_exhausted(self.markers(kind).len()) {
                return Err(BoardError::capacity("enemy group", MAX_ENEMIES as usize));
            }
            Some(ENEMIES_PER_GROUP)
        } else {
            None
        };
        let marker = Marker {
            id: new_id(kind.slug()),
            x,
            y,
            count,
        };
        self.markers.entry(kind).or_default().push(marker.clone());
        Ok(marker)
    }

    pub fn remove_marker(&mut self, kind: MarkerKind, id: &str) -> bool {
        let Some(list) = self.markers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|m| m.id != id);
        list.len() != before
    }

    pub fn move_marker(&mut self, kind: MarkerKind, id: &str, x: f64, y: f64) -> bool {
        let marker = self
            .markers
            .get_mut(&kind)
            .and_then(|list| list.iter_mut().find(|m| m.id == id));
        match marker {
            Some(m) => {
                m.x = x;
                m.y = y;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.individuals.clear();
        self.groups.clear();
        self.markers.clear();
    }

    pub(crate) fn find_group_near(&self, at: Point, skip: Option<&str>) -> Option<usize> {
        self.groups.iter().position(|g| {
            Some(g.id.as_str()) != skip && g.position().distance(at) < crate::GROUP_MERGE_DISTANCE
        })
    }
}

fn enemy_groups_exhausted(groups: usize) -> bool {
    groups as u32 * ENEMIES_PER_GROUP >= MAX_ENEMIES
}
