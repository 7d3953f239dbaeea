use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::board::{Board, Position};
use super::cards::{Card, CardEffect, CardId, EffectTrigger};
use super::config::GameConfig;
use super::effects::{EffectSource, EffectTarget};
use super::player::{Player, PlayerId};

/// Engine-assigned unit identifier, unique within a match.
pub type UnitId = u32;
pub type BuffId = u32;

pub const ROOT_BUFF: &str = "ROOT";
/// Buff duration meaning "never expires".
pub const PERMANENT: i32 = -1;

/// A stat or status change applied to a unit. Buffs are kept individually so
/// their provenance stays visible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Buff {
    pub id: BuffId,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A card that resolved onto the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: UnitId,
    pub card_id: CardId,
    pub name: String,
    pub player_id: PlayerId,
    pub archetype: String,
    pub cost: u32,
    pub attack: i32,
    pub health: i32,
    pub max_health: i32,
    pub position: Position,
    #[serde(default)]
    pub effects: Vec<CardEffect>,
    #[serde(default)]
    pub buffs: Vec<Buff>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub has_attacked: bool,
    #[serde(default)]
    pub is_rooted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_duration: Option<i32>,
    #[serde(default)]
    pub advances_this_turn: u32,
}

impl Unit {
    pub fn from_card(id: UnitId, card: &Card, player_id: PlayerId, position: Position) -> Self {
        let health = card.health.unwrap_or(1);
        Self {
            id,
            card_id: card.id.clone(),
            name: card.name.clone(),
            player_id,
            archetype: card.archetype.clone(),
            cost: card.cost,
            attack: card.attack.unwrap_or(0),
            health,
            max_health: health,
            position,
            effects: card.effects.clone(),
            buffs: Vec::new(),
            icon: card.icon.clone(),
            has_attacked: false,
            is_rooted: false,
            root_duration: None,
            advances_this_turn: 0,
        }
    }

    pub fn has_taunt(&self) -> bool {
        self.has_trigger(EffectTrigger::Taunt)
    }

    pub fn has_trigger(&self, trigger: EffectTrigger) -> bool {
        self.effects.iter().any(|effect| effect.trigger == trigger)
    }

    pub fn effects_for(&self, trigger: EffectTrigger) -> Vec<CardEffect> {
        self.effects
            .iter()
            .filter(|effect| effect.trigger == trigger)
            .cloned()
            .collect()
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    Setup,
    #[default]
    Draw,
    Advance,
    Play,
    Battle,
    End,
}

impl GamePhase {
    pub fn is_automatic(self) -> bool {
        matches!(self, GamePhase::Draw | GamePhase::Advance)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PendingAction {
    #[serde(rename_all = "camelCase")]
    PlaceStartingUnit { player_id: PlayerId, message: String },
}

/// One effect waiting for, or undergoing, resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectExecution {
    pub effect: CardEffect,
    pub source: EffectSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EffectTarget>,
    pub timestamp: f64,
}

/// An open interactive target selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetingMode {
    pub source: EffectSource,
    pub effect: CardEffect,
    pub valid_targets: Vec<EffectTarget>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VictoryReason {
    #[serde(rename_all = "camelCase")]
    ReachedSpawn { unit_id: UnitId },
    HealthDepleted { loser: PlayerId },
}

impl std::fmt::Display for VictoryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VictoryReason::ReachedSpawn { unit_id } => {
                write!(f, "unit {unit_id} reached the enemy spawn row")
            }
            VictoryReason::HealthDepleted { loser } => write!(f, "player {loser} was defeated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub winner: PlayerId,
    pub reason: VictoryReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntegrityError {
    PlayerCount { count: usize },
    /// The tile grid does not match the board's declared size.
    MalformedBoard { rows: i32, cols: i32 },
    InvalidPlayerIndex { index: usize },
    DuplicateUnitId { unit_id: UnitId },
    UnitPositionMismatch { unit_id: UnitId },
    OrphanTile { position: Position },
    ManaOutOfRange { player_id: PlayerId, value: u32 },
    HandOverflow { player_id: PlayerId, size: usize },
}

/// The canonical match state. Only the rule engine mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub config: GameConfig,
    pub players: Vec<Player>,
    pub board: Board,
    pub current_player_index: usize,
    pub phase: GamePhase,
    pub turn_number: u32,
    pub game_over: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
    #[serde(default)]
    pub pending_actions: Vec<PendingAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targeting_mode: Option<TargetingMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queued_targeting: Vec<EffectExecution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effect_stack: Vec<EffectExecution>,
    #[serde(default)]
    pub setup_completed: Vec<PlayerId>,
    next_unit_id: UnitId,
    next_buff_id: BuffId,
}

impl GameState {
    pub fn new(config: GameConfig, players: Vec<Player>) -> Self {
        let board = Board::new(config.board_rows, config.board_cols);
        Self {
            config,
            players,
            board,
            current_player_index: 0,
            phase: GamePhase::default(),
            turn_number: 1,
            game_over: false,
            outcome: None,
            pending_actions: Vec::new(),
            targeting_mode: None,
            queued_targeting: Vec::new(),
            effect_stack: Vec::new(),
            setup_completed: Vec::new(),
            next_unit_id: 1,
            next_buff_id: 1,
        }
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.outcome.as_ref().map(|outcome| outcome.winner)
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current_player_index]
    }

    pub fn current_player_mut(&mut self) -> &mut Player {
        &mut self.players[self.current_player_index]
    }

    pub fn current_player_id(&self) -> PlayerId {
        self.current_player().id
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|player| player.id != player_id)
            .map(|player| player.id)
    }

    /// The first player starts at the bottom edge and marches up; everyone
    /// else starts at the top.
    pub fn spawn_row(&self, player_id: PlayerId) -> i32 {
        if self.is_bottom_player(player_id) {
            self.board.rows() - 1
        } else {
            0
        }
    }

    pub fn enemy_spawn_row(&self, player_id: PlayerId) -> i32 {
        if self.is_bottom_player(player_id) {
            0
        } else {
            self.board.rows() - 1
        }
    }

    /// Row delta of one step toward the opponent.
    pub fn forward(&self, player_id: PlayerId) -> i32 {
        if self.is_bottom_player(player_id) {
            -1
        } else {
            1
        }
    }

    fn is_bottom_player(&self, player_id: PlayerId) -> bool {
        self.players.first().map(|player| player.id) == Some(player_id)
    }

    pub fn valid_spawn_positions(&self, player_id: PlayerId) -> Vec<Position> {
        let row = self.spawn_row(player_id);
        self.board
            .row_positions(row)
            .filter(|pos| self.board.is_empty(*pos))
            .collect()
    }

    /// Whether `pos` lies within `yar_range` rows of `player_id`'s own spawn
    /// edge.
    pub fn is_in_yar(&self, pos: Position, player_id: PlayerId) -> bool {
        let spawn_row = self.spawn_row(player_id);
        let range = self.config.yar_range.max(1);
        if self.forward(player_id) < 0 {
            pos.row >= spawn_row - range + 1
        } else {
            pos.row <= spawn_row + range - 1
        }
    }

    pub fn all_units(&self) -> impl Iterator<Item = &Unit> {
        self.players.iter().flat_map(|player| player.units.iter())
    }

    pub fn unit(&self, unit_id: UnitId) -> Option<&Unit> {
        self.all_units().find(|unit| unit.id == unit_id)
    }

    pub(crate) fn unit_mut(&mut self, unit_id: UnitId) -> Option<&mut Unit> {
        self.players
            .iter_mut()
            .flat_map(|player| player.units.iter_mut())
            .find(|unit| unit.id == unit_id)
    }

    pub fn unit_at(&self, pos: Position) -> Option<&Unit> {
        self.board.occupant(pos).and_then(|unit_id| self.unit(unit_id))
    }

    pub fn has_taunt_units(&self, player_id: PlayerId) -> bool {
        self.get_player(player_id)
            .is_some_and(|player| player.units.iter().any(Unit::has_taunt))
    }

    pub fn setup_pending(&self, player_id: PlayerId) -> bool {
        !self.setup_completed.contains(&player_id)
    }

    pub(crate) fn mark_setup_completed(&mut self, player_id: PlayerId) {
        if !self.setup_completed.contains(&player_id) {
            self.setup_completed.push(player_id);
        }
    }

    pub(crate) fn allocate_buff_id(&mut self) -> BuffId {
        let id = self.next_buff_id;
        self.next_buff_id += 1;
        id
    }

    /// Creates a unit for `card` at `pos`, updating the board and the owner's
    /// unit list together. Fails if the tile is unavailable or the owner is
    /// unknown.
    pub(crate) fn spawn_unit(
        &mut self,
        card: &Card,
        player_id: PlayerId,
        pos: Position,
    ) -> Option<UnitId> {
        if !self.board.is_empty(pos) {
            return None;
        }
        let unit_id = self.next_unit_id;
        let player = self.get_player_mut(player_id)?;
        player.units.push(Unit::from_card(unit_id, card, player_id, pos));
        self.board.place(unit_id, pos);
        self.next_unit_id += 1;
        Some(unit_id)
    }

    /// Relocates a unit, keeping its `position` and the board in sync.
    /// Returns the previous position.
    pub(crate) fn move_unit_forced(&mut self, unit_id: UnitId, to: Position) -> Option<Position> {
        let from = self.unit(unit_id)?.position;
        if !self.board.move_unit(from, to) {
            return None;
        }
        if let Some(unit) = self.unit_mut(unit_id) {
            unit.position = to;
        }
        Some(from)
    }

    /// Takes a unit off the board and out of its owner's list.
    pub(crate) fn remove_unit(&mut self, unit_id: UnitId) -> Option<Unit> {
        let owner = self.unit(unit_id)?.player_id;
        let player = self.get_player_mut(owner)?;
        let index = player.units.iter().position(|unit| unit.id == unit_id)?;
        let unit = player.units.remove(index);
        self.board.remove(unit.position);
        Some(unit)
    }

    /// Ends the match. Once a winner is recorded later calls are ignored.
    pub(crate) fn declare_victory(&mut self, winner: PlayerId, reason: VictoryReason) -> bool {
        if self.game_over {
            return false;
        }
        self.game_over = true;
        self.outcome = Some(VictoryState { winner, reason });
        true
    }

    /// Spawn-row occupation first, then depleted health.
    pub fn detect_victory(&self) -> Option<VictoryState> {
        for player in &self.players {
            let enemy_spawn = self.enemy_spawn_row(player.id);
            if let Some(unit) = player.units.iter().find(|unit| unit.position.row == enemy_spawn) {
                return Some(VictoryState {
                    winner: player.id,
                    reason: VictoryReason::ReachedSpawn { unit_id: unit.id },
                });
            }
        }
        for player in &self.players {
            if player.health <= 0 {
                if let Some(winner) = self.opponent_of(player.id) {
                    return Some(VictoryState {
                        winner,
                        reason: VictoryReason::HealthDepleted { loser: player.id },
                    });
                }
            }
        }
        None
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if !self.board.is_well_formed() {
            return Err(IntegrityError::MalformedBoard {
                rows: self.board.rows(),
                cols: self.board.cols(),
            });
        }
        if self.players.len() != 2 {
            return Err(IntegrityError::PlayerCount {
                count: self.players.len(),
            });
        }
        if self.current_player_index >= self.players.len() {
            return Err(IntegrityError::InvalidPlayerIndex {
                index: self.current_player_index,
            });
        }

        let mut seen = HashSet::new();
        for player in &self.players {
            if player.mana > player.max_mana {
                return Err(IntegrityError::ManaOutOfRange {
                    player_id: player.id,
                    value: player.mana,
                });
            }
            if player.hand.len() > player.hand_limit {
                return Err(IntegrityError::HandOverflow {
                    player_id: player.id,
                    size: player.hand.len(),
                });
            }
            for unit in &player.units {
                if !seen.insert(unit.id) {
                    return Err(IntegrityError::DuplicateUnitId { unit_id: unit.id });
                }
                if self.board.occupant(unit.position) != Some(unit.id) {
                    return Err(IntegrityError::UnitPositionMismatch { unit_id: unit.id });
                }
            }
        }

        for (position, unit_id) in self.board.occupied() {
            if !seen.contains(&unit_id) {
                return Err(IntegrityError::OrphanTile { position });
            }
        }

        Ok(())
    }
}
