//! Freehand annotations over the map.
//!
//! Undo/redo history and auto-delete are mutually exclusive: while
//! auto-delete is on the history stacks stay empty and every stroke carries a
//! deadline; while it is off no deadlines exist.

use std::collections::BTreeMap;
use tracing::debug;
use warboard_protocol::{Point, Stroke, DEFAULT_STROKE_COLOR, STROKE_WIDTH};

use crate::{new_id, AUTO_DELETE_DELAY_MS};

#[derive(Debug, Clone, PartialEq, Default)]
enum Pen {
    #[default]
    Idle,
    Drawing(Vec<Point>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    Applied,
    /// The relevant stack was empty.
    Nothing,
    /// Auto-delete is on; history is unavailable.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drawing {
    mode: bool,
    pen: Pen,
    color: String,
    strokes: Vec<Stroke>,
    history: Vec<Vec<Stroke>>,
    redo: Vec<Vec<Stroke>>,
    auto_delete: bool,
    /// Stroke id -> unix millis at which it is removed.
    expiries: BTreeMap<String, i64>,
}

impl Default for Drawing {
    fn default() -> Self {
        Self {
            mode: false,
            pen: Pen::Idle,
            color: DEFAULT_STROKE_COLOR.to_string(),
            strokes: Vec::new(),
            history: Vec::new(),
            redo: Vec::new(),
            auto_delete: false,
            expiries: BTreeMap::new(),
        }
    }
}

impl Drawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn mode(&self) -> bool {
        self.mode
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.pen, Pen::Drawing(_))
    }

    pub fn can_undo(&self) -> bool {
        !self.auto_delete && !self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.auto_delete && !self.redo.is_empty()
    }

    pub fn pending_expiries(&self) -> usize {
        self.expiries.len()
    }

    /// Turning drawing mode off drops any stroke in progress.
    pub fn set_mode(&mut self, on: bool) {
        self.mode = on;
        if !on {
            self.pen = Pen::Idle;
        }
    }

    pub fn set_color(&mut self, color: impl Into<String>) {
        self.color = color.into();
    }

    /// Returns false when drawing mode is off.
    pub fn begin_stroke(&mut self, at: Point) -> bool {
        if !self.mode {
            return false;
        }
        self.pen = Pen::Drawing(vec![at]);
        true
    }

    pub fn extend_stroke(&mut self, at: Point) -> bool {
        match &mut self.pen {
            Pen::Drawing(points) => {
                points.push(at);
                true
            }
            Pen::Idle => false,
        }
    }

    /// Pointer left the canvas mid-stroke.
    pub fn cancel_stroke(&mut self) {
        self.pen = Pen::Idle;
    }

    /// Commits the in-progress stroke. A capture shorter than two points is a
    /// tap and is discarded.
    pub fn end_stroke(&mut self, now_ms: i64) -> Option<&Stroke> {
        let Pen::Drawing(points) = std::mem::take(&mut self.pen) else {
            return None;
        };
        if points.len() < 2 {
            return None;
        }
        let stroke = Stroke {
            id: new_id("stroke"),
            points,
            timestamp: now_ms,
            color: self.color.clone(),
            width: STROKE_WIDTH,
        };
        if self.auto_delete {
            self.expiries
                .insert(stroke.id.clone(), now_ms + AUTO_DELETE_DELAY_MS);
        }
        self.strokes.push(stroke);
        if !self.auto_delete {
            self.history.push(self.strokes.clone());
            self.redo.clear();
        }
        self.strokes.last()
    }

    pub fn undo(&mut self) -> HistoryStep {
        if self.auto_delete {
            return HistoryStep::Disabled;
        }
        if self.history.is_empty() {
            return HistoryStep::Nothing;
        }
        self.redo.push(self.strokes.clone());
        self.history.pop();
        self.strokes = self.history.last().cloned().unwrap_or_default();
        HistoryStep::Applied
    }

    pub fn redo(&mut self) -> HistoryStep {
        if self.auto_delete {
            return HistoryStep::Disabled;
        }
        let Some(next) = self.redo.pop() else {
            return HistoryStep::Nothing;
        };
        let current = std::mem::replace(&mut self.strokes, next);
        self.history.push(current);
        HistoryStep::Applied
    }

    /// Enabling drops history and gives every stroke the remainder of its
    /// delay, removing ones already past it. Disabling cancels every pending
    /// removal and seeds history with the current strokes.
    pub fn set_auto_delete(&mut self, on: bool, now_ms: i64) {
        if on == self.auto_delete {
            return;
        }
        self.auto_delete = on;
        if on {
            self.history.clear();
            self.redo.clear();
            self.schedule_all(now_ms);
        } else {
            self.expiries.clear();
            self.history = vec![self.strokes.clone()];
        }
    }

    fn schedule_all(&mut self, now_ms: i64) {
        self.expiries.clear();
        self.strokes.retain(|s| s.timestamp + AUTO_DELETE_DELAY_MS > now_ms);
        for stroke in &self.strokes {
            self.expiries
                .insert(stroke.id.clone(), stroke.timestamp + AUTO_DELETE_DELAY_MS);
        }
    }

    /// Fires every removal whose deadline has passed. Returns how many
    /// strokes were removed.
    pub fn expire_due(&mut self, now_ms: i64) -> usize {
        if self.expiries.is_empty() {
            return 0;
        }
        let due: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, deadline)| **deadline <= now_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due {
            self.expiries.remove(id);
        }
        let before = self.strokes.len();
        self.strokes.retain(|s| !due.contains(&s.id));
        let removed = before - self.strokes.len();
        if removed > 0 {
            debug!(removed, "expired strokes removed");
        }
        removed
    }

    /// Wipes every stroke and pending removal. The wiped state goes onto the
    /// history stack so it can be undone. Returns false when there was
    /// nothing to clear.
    pub fn clear_all(&mut self) -> bool {
        if self.strokes.is_empty() {
            return false;
        }
        if !self.auto_delete {
            self.history.push(self.strokes.clone());
        }
        self.strokes.clear();
        self.expiries.clear();
        true
    }

    /// Installs imported strokes as the only undo checkpoint.
    pub fn replace_strokes(&mut self, strokes: Vec<Stroke>, now_ms: i64) {
        self.pen = Pen::Idle;
        self.strokes = strokes;
        self.redo.clear();
        self.history.clear();
        if self.auto_delete {
            self.schedule_all(now_ms);
        } else {
            self.expiries.clear();
            if !self.strokes.is_empty() {
                self.history.push(self.strokes.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawing_on() -> Drawing {
        let mut d = Drawing::new();
        d.set_mode(true);
        d
    }

    fn stroke(d: &mut Drawing, now: i64, points: &[(f64, f64)]) -> Option<Stroke> {
        let (first, rest) = points.split_first()?;
        d.begin_stroke(Point::new(first.0, first.1));
        for p in rest {
            d.extend_stroke(Point::new(p.0, p.1));
        }
        d.end_stroke(now).cloned()
    }

    #[test]
    fn stroke_requires_drawing_mode() {
        let mut d = Drawing::new();
        assert!(!d.begin_stroke(Point::new(0.0, 0.0)));
        assert!(!d.extend_stroke(Point::new(1.0, 1.0)));
        assert!(d.end_stroke(0).is_none());
    }

    #[test]
    fn tap_is_discarded() {
        let mut d = drawing_on();
        assert!(stroke(&mut d, 10, &[(5.0, 5.0)]).is_none());
        assert!(d.strokes().is_empty());
        assert!(!d.can_undo());
        assert!(!d.is_drawing());
    }

    #[test]
    fn committed_stroke_carries_color_width_and_time() {
        let mut d = drawing_on();
        d.set_color("#00ff00");
        let s = stroke(&mut d, 1234, &[(0.0, 0.0), (3.0, 4.0), (6.0, 8.0)]).unwrap();
        assert_eq!(s.points.len(), 3);
        assert_eq!(s.timestamp, 1234);
        assert_eq!(s.color, "#00ff00");
        assert_eq!(s.width, STROKE_WIDTH);
    }

    #[test]
    fn cancel_drops_in_progress_stroke() {
        let mut d = drawing_on();
        d.begin_stroke(Point::new(0.0, 0.0));
        d.extend_stroke(Point::new(1.0, 0.0));
        d.cancel_stroke();
        assert!(d.end_stroke(5).is_none());
        assert!(d.strokes().is_empty());
    }

    #[test]
    fn undo_redo_walk_history() {
        let mut d = drawing_on();
        for i in 0..3 {
            stroke(&mut d, i, &[(0.0, 0.0), (f64::from(i as i32), 1.0)]);
        }
        let three = d.strokes().to_vec();
        assert_eq!(d.undo(), HistoryStep::Applied);
        assert_eq!(d.strokes(), &three[..2]);
        assert_eq!(d.redo(), HistoryStep::Applied);
        assert_eq!(d.strokes(), &three[..]);
        assert_eq!(d.redo(), HistoryStep::Nothing);

        for _ in 0..3 {
            assert_eq!(d.undo(), HistoryStep::Applied);
        }
        assert!(d.strokes().is_empty());
        assert_eq!(d.undo(), HistoryStep::Nothing);
        assert!(d.strokes().is_empty());
    }

    #[test]
    fn new_stroke_clears_redo() {
        let mut d = drawing_on();
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        stroke(&mut d, 1, &[(0.0, 0.0), (2.0, 2.0)]);
        d.undo();
        assert!(d.can_redo());
        stroke(&mut d, 2, &[(0.0, 0.0), (3.0, 3.0)]);
        assert!(!d.can_redo());
    }

    #[test]
    fn history_disabled_under_auto_delete() {
        let mut d = drawing_on();
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        d.set_auto_delete(true, 0);
        assert_eq!(d.undo(), HistoryStep::Disabled);
        assert_eq!(d.redo(), HistoryStep::Disabled);
        assert!(!d.can_undo());
        assert_eq!(d.strokes().len(), 1);
    }

    #[test]
    fn enabling_auto_delete_schedules_remaining_delay() {
        let mut d = drawing_on();
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        stroke(&mut d, 6_000, &[(0.0, 0.0), (2.0, 2.0)]);
        stroke(&mut d, 12_000, &[(0.0, 0.0), (3.0, 3.0)]);

        // First stroke is already past its delay at t=11s.
        d.set_auto_delete(true, 11_000);
        assert_eq!(d.strokes().len(), 2);
        assert_eq!(d.pending_expiries(), 2);

        assert_eq!(d.expire_due(15_999), 0);
        assert_eq!(d.expire_due(16_000), 1);
        assert_eq!(d.expire_due(22_000), 1);
        assert!(d.strokes().is_empty());
        assert_eq!(d.pending_expiries(), 0);
    }

    #[test]
    fn strokes_committed_under_auto_delete_expire() {
        let mut d = drawing_on();
        d.set_auto_delete(true, 0);
        stroke(&mut d, 500, &[(0.0, 0.0), (1.0, 1.0)]);
        assert!(!d.can_undo());
        assert_eq!(d.expire_due(10_499), 0);
        assert_eq!(d.expire_due(10_500), 1);
    }

    #[test]
    fn disabling_auto_delete_cancels_and_seeds_history() {
        let mut d = drawing_on();
        d.set_auto_delete(true, 0);
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        d.set_auto_delete(false, 1_000);
        assert_eq!(d.pending_expiries(), 0);
        assert_eq!(d.expire_due(1_000_000), 0);
        assert_eq!(d.strokes().len(), 1);
        assert!(d.can_undo());
        // The seeded snapshot is the only checkpoint; undoing it empties.
        assert_eq!(d.undo(), HistoryStep::Applied);
        assert!(d.strokes().is_empty());
    }

    #[test]
    fn clear_all_is_undoable_without_auto_delete() {
        let mut d = drawing_on();
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        let before = d.strokes().to_vec();
        assert!(d.clear_all());
        assert!(d.strokes().is_empty());
        assert!(!d.clear_all());
        assert_eq!(d.undo(), HistoryStep::Applied);
        assert_eq!(d.strokes(), &before[..]);
    }

    #[test]
    fn clear_all_cancels_pending_removals() {
        let mut d = drawing_on();
        d.set_auto_delete(true, 0);
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        assert!(d.clear_all());
        assert_eq!(d.pending_expiries(), 0);
    }

    #[test]
    fn replace_strokes_seeds_single_checkpoint() {
        let mut d = drawing_on();
        stroke(&mut d, 0, &[(0.0, 0.0), (1.0, 1.0)]);
        let imported = vec![Stroke {
            id: "stroke-imported".into(),
            points: vec![Point::new(0.0, 0.0), Point::new(9.0, 9.0)],
            timestamp: 0,
            color: "#0000ff".into(),
            width: 3.0,
        }];
        d.replace_strokes(imported.clone(), 50);
        assert_eq!(d.strokes(), &imported[..]);
        assert_eq!(d.undo(), HistoryStep::Applied);
        assert!(d.strokes().is_empty());
        assert_eq!(d.undo(), HistoryStep::Nothing);
    }
}
