//! Narrative text for battle logs, world events and player notifications.
//!
//! Every phase reports what happened through a [`Chronicle`]; the driver
//! turns it into battle-log entries (kept with the battle record) and world
//! events (written to `events/{id}`).

use warband_types::{BattleEvent, BattleEventKind, Location, WorldEvent};

/// Who landed the killing blow on a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Killer {
    /// Display name of the killing unit (or structure).
    pub name: String,
    /// The blow was a critical hit.
    pub critical: bool,
    /// The critical hit was the second in a row.
    pub combo: bool,
}

/// Events produced while resolving one battle tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chronicle {
    tick: u64,
    location: Location,
    /// Entries for the battle's own log.
    pub battle: Vec<BattleEvent>,
    /// Entries for the world event log.
    pub world: Vec<String>,
}

impl Chronicle {
    /// An empty chronicle for one battle tick.
    pub const fn new(tick: u64, location: Location) -> Self {
        Self {
            tick,
            location,
            battle: Vec::new(),
            world: Vec::new(),
        }
    }

    /// Append to the battle log only.
    pub fn log(&mut self, kind: BattleEventKind, text: impl Into<String>) {
        self.battle.push(BattleEvent {
            tick: self.tick,
            kind,
            text: text.into(),
        });
    }

    /// Append to the world event log only.
    pub fn announce(&mut self, text: impl Into<String>) {
        self.world.push(text.into());
    }

    /// Append to both logs.
    pub fn record(&mut self, kind: BattleEventKind, text: impl Into<String>) {
        let text = text.into();
        self.world.push(text.clone());
        self.log(kind, text);
    }

    /// World events stamped with `timestamp`.
    pub fn world_events(&self, timestamp: i64) -> Vec<WorldEvent> {
        self.world
            .iter()
            .map(|text| WorldEvent::new(text.clone(), timestamp, self.location))
            .collect()
    }
}

/// Keep only the newest `limit` entries of a battle log.
pub fn trim_log(events: &mut Vec<BattleEvent>, limit: usize) {
    let excess = events.len().saturating_sub(limit);
    if excess > 0 {
        events.drain(..excess);
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Notification for a player killed in battle.
pub fn death_message(killer: Option<&Killer>, location: Location) -> String {
    match killer {
        Some(k) if k.combo => {
            format!("You were slain by {} with a second critical hit in a row at {location}", k.name)
        }
        Some(k) if k.critical => {
            format!("You were slain by a critical hit from {} at {location}", k.name)
        }
        Some(k) => format!("You were slain by {} at {location}", k.name),
        None => format!("You were slain in battle at {location}"),
    }
}

/// World event for a player killed in battle.
pub fn death_event(name: &str, killer: Option<&Killer>, location: Location) -> String {
    match killer {
        Some(k) if k.critical => {
            format!("{name} was slain by {} with a critical hit at {location}", k.name)
        }
        Some(k) => format!("{name} was slain by {} at {location}", k.name),
        None => format!("{name} fell in battle at {location}"),
    }
}

/// A group left the battle.
pub fn fled(group: &str, location: Location) -> String {
    format!("{group} fled the battle at {location}")
}

/// A group lost every unit.
pub fn wiped_out(group: &str, location: Location) -> String {
    format!("{group} was wiped out at {location}")
}

/// Casualties on both sides this tick.
pub fn casualties(side1: &str, lost1: u32, side2: &str, lost2: u32, location: Location) -> String {
    format!("Battle at {location}: {side1} lost {lost1} and {side2} lost {lost2}")
}

/// The stalemate guard forced casualties.
pub fn stalemate_break(loser: &str, casualties: u32) -> String {
    format!("Neither side gave ground; {loser} broke first and lost {casualties}")
}

/// A unit landed a critical hit.
pub fn critical_hit(attacker: &str, combo: bool) -> String {
    if combo {
        format!("{attacker} landed a second critical hit in a row")
    } else {
        format!("{attacker} landed a critical hit")
    }
}

/// A structure took damage.
pub fn structure_damaged(name: &str, damage: u32, health: u32, max: u32) -> String {
    format!("{name} took {damage} damage ({health}/{max})")
}

/// A structure was destroyed.
pub fn structure_destroyed(name: &str, location: Location) -> String {
    format!("{name} at {location} was destroyed")
}

/// A standalone player died when a structure collapsed.
pub fn crushed(name: &str, structure: &str, location: Location) -> String {
    format!("{name} died in the ruins of {structure} at {location}")
}

/// Notification for a standalone player killed by a collapse.
pub fn crushed_message(structure: &str, location: Location) -> String {
    format!("You died when {structure} at {location} was destroyed")
}

/// A structure changed hands.
pub fn captured(structure: &str, group: &str, location: Location) -> String {
    format!("{group} captured {structure} at {location}")
}

/// Monsters razed a structure.
pub fn razed(structure: &str, group: &str, location: Location) -> String {
    format!("{group} razed {structure} at {location}")
}

/// A side won.
pub fn victory(winner: &str, loser: &str, location: Location) -> String {
    format!("{winner} defeated {loser} at {location}")
}

/// The battle ended without a winner.
pub fn draw(location: Location) -> String {
    format!("The battle at {location} ended in a draw")
}

/// Loot went to a group.
pub fn looted(group: &str, count: usize) -> String {
    format!("{group} claimed {count} spoils")
}

/// Loot was left on the tile.
pub fn scattered(count: usize, location: Location) -> String {
    format!("{count} spoils lie scattered at {location}")
}

/// Notification for a player whose battle ended and who survived.
pub fn battle_over_message(result: &str, location: Location) -> String {
    format!("Your battle at {location} is over: {result}")
}
