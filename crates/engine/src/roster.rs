use tracing::warn;
use warboard_protocol::{Member, MemberDraft, MemberId, TeamKey};

use crate::error::{BoardError, BoardResult};
use crate::MAX_PLAYERS;

/// Every defined member, independent of map placement. Survives board clears.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new(members: Vec<Member>) -> Self {
        let mut roster = Roster::default();
        for member in members {
            if roster.get(member.id).is_some() {
                warn!(member_id = member.id, "duplicate roster id dropped");
                continue;
            }
            roster.members.push(member);
        }
        roster
    }

    /// Reads a stored roster, skipping entries that do not parse. Legacy team
    /// names are mapped onto canonical keys; the flag reports whether any
    /// entry needed that so the caller can write the migrated roster back.
    pub fn from_stored(raw: &str) -> anyhow::Result<(Self, bool)> {
        let items: Vec<serde_json::Value> = serde_json::from_str(raw)?;
        let mut migrated = false;
        let mut members = Vec::with_capacity(items.len());
        for item in items {
            if item
                .get("team")
                .and_then(serde_json::Value::as_str)
                .is_some_and(TeamKey::is_legacy_name)
            {
                migrated = true;
            }
            match serde_json::from_value::<Member>(item) {
                Ok(member) => members.push(member),
                Err(err) => warn!(%err, "skipping unreadable roster entry"),
            }
        }
        Ok((Roster::new(members), migrated))
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.get(id).is_some()
    }

    pub fn of_team(&self, team: TeamKey) -> impl Iterator<Item = &Member> + '_ {
        self.members.iter().filter(move |m| m.team == team)
    }

    pub fn add(&mut self, draft: MemberDraft) -> BoardResult<Member> {
        let draft = validate(draft)?;
        if self.members.len() >= MAX_PLAYERS {
            return Err(BoardError::RosterFull { limit: MAX_PLAYERS });
        }
        let id = self.members.iter().map(|m| m.id).max().map_or(1, |max| max + 1);
        let member = Member {
            id,
            name: draft.name,
            role: draft.role,
            team: draft.team,
            weapon1: draft.weapon1,
            weapon2: draft.weapon2,
        };
        self.members.push(member.clone());
        Ok(member)
    }

    pub fn edit(&mut self, id: MemberId, draft: MemberDraft) -> BoardResult<Member> {
        let draft = validate(draft)?;
        let member = self
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(BoardError::UnknownMember { member_id: id })?;
        member.name = draft.name;
        member.role = draft.role;
        member.team = draft.team;
        member.weapon1 = draft.weapon1;
        member.weapon2 = draft.weapon2;
        Ok(member.clone())
    }

    pub fn remove(&mut self, id: MemberId) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.id == id)?;
        Some(self.members.remove(idx))
    }
}

fn validate(mut draft: MemberDraft) -> BoardResult<MemberDraft> {
    draft.name = draft.name.trim().to_string();
    if draft.name.is_empty() {
        return Err(BoardError::InvalidMember {
            reason: "player name is required".to_string(),
        });
    }
    Ok(draft)
}
