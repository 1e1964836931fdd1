use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warboard_protocol::{
    BoardSummary, ExportDocument, Group, IndividualPlacement, Marker, MarkerKind, Member,
    MemberDraft, MemberId, Point, RoleCount, StoredBoard, Stroke, TeamKey,
};

use crate::board::Board;
use crate::clock::{Clock, SystemClock};
use crate::drawing::{Drawing, HistoryStep};
use crate::error::{BoardError, BoardResult};
use crate::grouping::GroupChange;
use crate::persist::{board_document, export_document, parse_import, restore_board};
use crate::roster::Roster;
use crate::store::{keys, KvStore, MemoryStore};
use crate::teams::TeamNames;

/// The single board document and everything that hangs off it. Every
/// mutation that succeeds is written through to the store before returning;
/// a failed one changes nothing.
#[derive(Debug)]
pub struct Session {
    store: Box<dyn KvStore>,
    clock: Arc<dyn Clock>,
    roster: Roster,
    board: Board,
    drawing: Drawing,
    team_names: TeamNames,
}

impl Session {
    /// Loads roster, team names and board from `store`. Unreadable values
    /// are logged and treated as absent.
    pub fn open(store: impl KvStore + 'static, clock: Arc<dyn Clock>) -> Self {
        let mut session = Session {
            store: Box::new(store),
            clock,
            roster: Roster::default(),
            board: Board::new(),
            drawing: Drawing::new(),
            team_names: TeamNames::default(),
        };
        session.load();
        session
    }

    pub fn in_memory() -> Self {
        Self::open(MemoryStore::new(), Arc::new(SystemClock))
    }

    fn load(&mut self) {
        if let Some(raw) = self.read(keys::PLAYERS) {
            match Roster::from_stored(&raw) {
                Ok((roster, migrated)) => {
                    self.roster = roster;
                    if migrated {
                        info!("migrated legacy team names in roster");
                        self.save_roster();
                    }
                }
                Err(err) => warn!("ignoring unreadable roster: {err:#}"),
            }
        }

        if let Some(raw) = self.read(keys::TEAM_NAMES) {
            match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(map) => {
                    let (names, migrated) = TeamNames::from_raw(map);
                    self.team_names = names;
                    if migrated {
                        info!("migrated legacy team name overrides");
                        self.save_team_names();
                    }
                }
                Err(err) => warn!(%err, "ignoring unreadable team names"),
            }
        }

        if let Some(raw) = self.read(keys::POSITIONS) {
            match serde_json::from_str::<StoredBoard>(&raw) {
                Ok(stored) => self.board = restore_board(stored, &self.roster),
                Err(err) => warn!(%err, "ignoring unreadable board"),
            }
        }

        info!(
            roster = self.roster.len(),
            placed = self.board.total_placed_players(),
            markers = self.board.marker_count(),
            "session loaded"
        );
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, "storage read failed: {err:#}");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(key, %err, "could not serialize value");
                return;
            }
        };
        if let Err(err) = self.store.put(key, &json) {
            warn!(key, "storage write failed: {err:#}");
        }
    }

    fn save_board(&self) {
        self.write(keys::POSITIONS, &board_document(&self.board));
    }

    fn save_roster(&self) {
        self.write(keys::PLAYERS, self.roster.members());
    }

    fn save_team_names(&self) {
        self.write(keys::TEAM_NAMES, &self.team_names.to_raw());
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    pub fn team_names(&self) -> &TeamNames {
        &self.team_names
    }

    pub fn summary(&self) -> BoardSummary {
        self.board.summary(self.roster.len())
    }

    /// Store write counter, or 0 when the store cannot be read.
    pub fn revision(&self) -> i64 {
        self.store.revision().unwrap_or_else(|err| {
            warn!("revision unavailable: {err:#}");
            0
        })
    }

    // Placement

    pub fn place_member(&mut self, member_id: MemberId, x: f64, y: f64) -> BoardResult<IndividualPlacement> {
        let member = self
            .roster
            .get(member_id)
            .ok_or(BoardError::UnknownMember { member_id })?;
        let placement = self.board.place_member(member, x, y)?;
        self.save_board();
        Ok(placement)
    }

    pub fn remove_member(&mut self, member_id: MemberId) -> bool {
        let removed = self.board.remove_member(member_id);
        if removed {
            self.save_board();
        }
        removed
    }

    pub fn move_member(&mut self, member_id: MemberId, x: f64, y: f64) -> bool {
        let moved = self.board.move_member(member_id, x, y);
        if moved {
            self.save_board();
        }
        moved
    }

    pub fn place_marker(&mut self, kind: MarkerKind, x: f64, y: f64) -> BoardResult<Marker> {
        let marker = self.board.place_marker(kind, x, y)?;
        self.save_board();
        Ok(marker)
    }

    pub fn remove_marker(&mut self, kind: MarkerKind, id: &str) -> bool {
        let removed = self.board.remove_marker(kind, id);
        if removed {
            self.save_board();
        }
        removed
    }

    pub fn move_marker(&mut self, kind: MarkerKind, id: &str, x: f64, y: f64) -> BoardResult<()> {
        if !self.board.move_marker(kind, id, x, y) {
            return Err(BoardError::UnknownMarker {
                kind,
                id: id.to_string(),
            });
        }
        self.save_board();
        Ok(())
    }

    /// Wipes placements, groups and markers. The roster and drawings stay.
    pub fn clear_board(&mut self) {
        self.board.clear();
        self.save_board();
        info!("board cleared");
    }

    // Groups

    pub fn place_team(&mut self, team: TeamKey, x: f64, y: f64) -> BoardResult<GroupChange> {
        let change = self.board.place_team(&self.roster, team, x, y)?;
        self.save_board();
        Ok(change)
    }

    pub fn drag_group(&mut self, group_id: &str, x: f64, y: f64) -> BoardResult<GroupChange> {
        let change = self.board.drag_group(group_id, x, y)?;
        self.save_board();
        Ok(change)
    }

    pub fn split_member_from_group(
        &mut self,
        group_id: &str,
        member_id: MemberId,
    ) -> BoardResult<IndividualPlacement> {
        let placement = self
            .board
            .split_member_from_group(&self.roster, group_id, member_id)?;
        self.save_board();
        Ok(placement)
    }

    pub fn split_group_by_team(&mut self, group_id: &str) -> BoardResult<Vec<Group>> {
        let groups = self.board.split_group_by_team(&self.roster, group_id)?;
        self.save_board();
        Ok(groups)
    }

    pub fn remove_group(&mut self, group_id: &str) -> bool {
        let removed = self.board.remove_group(group_id);
        if removed {
            self.save_board();
        }
        removed
    }

    pub fn role_breakdown(&self, group_id: &str) -> BoardResult<RoleCount> {
        self.board
            .role_breakdown(&self.roster, group_id)
            .ok_or_else(|| BoardError::UnknownGroup {
                group_id: group_id.to_string(),
            })
    }

    // Roster

    pub fn add_member(&mut self, draft: MemberDraft) -> BoardResult<Member> {
        let member = self.roster.add(draft)?;
        self.save_roster();
        info!(member_id = member.id, name = %member.name, "member added");
        Ok(member)
    }

    pub fn edit_member(&mut self, member_id: MemberId, draft: MemberDraft) -> BoardResult<Member> {
        let member = self.roster.edit(member_id, draft)?;
        self.save_roster();
        Ok(member)
    }

    /// Deletes a member and takes them off the map.
    pub fn delete_member(&mut self, member_id: MemberId) -> BoardResult<Member> {
        let member = self
            .roster
            .remove(member_id)
            .ok_or(BoardError::UnknownMember { member_id })?;
        self.save_roster();
        if self.board.forget_member(member_id) {
            self.save_board();
        }
        info!(member_id, "member deleted");
        Ok(member)
    }

    pub fn rename_team(&mut self, team: TeamKey, name: &str) -> bool {
        let changed = self.team_names.rename(team, name.trim());
        if changed {
            self.save_team_names();
        }
        changed
    }

    // Drawing

    pub fn set_drawing_mode(&mut self, on: bool) {
        self.drawing.set_mode(on);
    }

    pub fn set_stroke_color(&mut self, color: &str) {
        self.drawing.set_color(color);
    }

    pub fn begin_stroke(&mut self, at: Point) -> bool {
        self.drawing.begin_stroke(at)
    }

    pub fn extend_stroke(&mut self, at: Point) -> bool {
        self.drawing.extend_stroke(at)
    }

    pub fn cancel_stroke(&mut self) {
        self.drawing.cancel_stroke();
    }

    pub fn end_stroke(&mut self) -> Option<Stroke> {
        let now = self.clock.now_ms();
        self.drawing.end_stroke(now).cloned()
    }

    pub fn undo_drawing(&mut self) -> HistoryStep {
        self.drawing.undo()
    }

    pub fn redo_drawing(&mut self) -> HistoryStep {
        self.drawing.redo()
    }

    pub fn set_auto_delete(&mut self, on: bool) {
        let now = self.clock.now_ms();
        self.drawing.set_auto_delete(on, now);
        debug!(on, pending = self.drawing.pending_expiries(), "auto-delete toggled");
    }

    pub fn clear_drawings(&mut self) -> bool {
        self.drawing.clear_all()
    }

    /// Removes strokes whose auto-delete deadline has passed.
    pub fn expire_drawings(&mut self) -> usize {
        let now = self.clock.now_ms();
        self.drawing.expire_due(now)
    }

    // Export / import

    pub fn export_board(&self) -> ExportDocument {
        export_document(
            &self.roster,
            &self.board,
            self.drawing.strokes(),
            &self.team_names,
        )
    }

    pub fn export_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_board())?)
    }

    /// Replaces roster and board as one step, plus strokes and team names
    /// when the file carries them. On error nothing is touched.
    pub fn import_board(&mut self, json: &str) -> BoardResult<()> {
        let now = self.clock.now_ms();
        let imported = parse_import(json, now)?;
        self.roster = imported.roster;
        self.board = imported.board;
        if let Some(strokes) = imported.strokes {
            self.drawing.replace_strokes(strokes, now);
        }

        self.save_roster();
        self.save_board();
        if let Some(names) = imported.team_names {
            self.team_names = names;
            self.save_team_names();
        }
        info!(
            roster = self.roster.len(),
            placed = self.board.total_placed_players(),
            strokes = self.drawing.strokes().len(),
            "board imported"
        );
        Ok(())
    }

    // Theme

    pub fn theme(&self) -> Option<String> {
        let raw = self.read(keys::THEME)?;
        match serde_json::from_str(&raw) {
            Ok(theme) => Some(theme),
            Err(err) => {
                warn!(%err, "ignoring unreadable theme");
                None
            }
        }
    }

    pub fn set_theme(&mut self, theme: &str) {
        self.write(keys::THEME, theme);
    }
}
