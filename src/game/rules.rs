use std::collections::VecDeque;
use std::future::Future;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{
    board::Position,
    cards::{Card, CardCatalog, CardEffect, CardType, EffectAction},
    config::GameConfig,
    deck::{build_deck, DeckPreset, DeckSource},
    effects::{Casualty, EffectEngine, EffectResolution, EffectSource, EffectTarget},
    events::{EventBus, EventRecord, GameEvent, SubscriptionId},
    history::History,
    player::{DrawResult, Player, PlayerId},
    state::{
        EffectExecution, GamePhase, GameState, IntegrityError, PendingAction, TargetingMode, Unit,
        UnitId, VictoryReason, VictoryState,
    },
};
use crate::utils::now_ms;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameNotStarted,
    GameAlreadyStarted,
    GameFinished,
    NotPlayerTurn,
    PlayerNotFound {
        player_id: PlayerId,
    },
    InvalidPhase {
        expected: GamePhase,
        actual: GamePhase,
    },
    InvalidHandIndex {
        index: usize,
    },
    InsufficientMana {
        required: u32,
        available: u32,
    },
    PositionOutOfBounds {
        position: Position,
    },
    TileOccupied {
        position: Position,
    },
    NotSpawnRow {
        position: Position,
    },
    UnitNotFound {
        unit_id: UnitId,
    },
    AlreadyAttacked {
        unit_id: UnitId,
    },
    OutOfRange,
    FriendlyTarget,
    TauntBlocks,
    SetupPending {
        player_id: PlayerId,
    },
    SetupNotPending,
    AutomaticPhasePending,
    TargetingPending,
    NoTargetingSession,
    InvalidTarget,
    ManualMovementDisallowed,
    StartingCardMissing {
        card_id: String,
    },
    IntegrityViolation {
        error: IntegrityError,
    },
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleError::GameNotStarted => write!(f, "Game has not started"),
            RuleError::GameAlreadyStarted => write!(f, "Game has already started"),
            RuleError::GameFinished => write!(f, "Game is over"),
            RuleError::NotPlayerTurn => write!(f, "Not this player's turn"),
            RuleError::PlayerNotFound { player_id } => write!(f, "Player {player_id} not found"),
            RuleError::InvalidPhase { expected, actual } => {
                write!(f, "Action requires phase {expected:?}, current phase is {actual:?}")
            }
            RuleError::InvalidHandIndex { index } => write!(f, "Invalid card index {index}"),
            RuleError::InsufficientMana {
                required,
                available,
            } => write!(f, "Not enough mana ({available}/{required})"),
            RuleError::PositionOutOfBounds { position } => {
                write!(f, "Position ({}, {}) is off the board", position.row, position.col)
            }
            RuleError::TileOccupied { position } => {
                write!(f, "Position ({}, {}) is occupied", position.row, position.col)
            }
            RuleError::NotSpawnRow { .. } => write!(f, "Units must be played on spawn row"),
            RuleError::UnitNotFound { unit_id } => write!(f, "Unit {unit_id} not found"),
            RuleError::AlreadyAttacked { unit_id } => {
                write!(f, "Unit {unit_id} has already attacked this turn")
            }
            RuleError::OutOfRange => write!(f, "Target is out of attack range"),
            RuleError::FriendlyTarget => write!(f, "Cannot attack a friendly unit"),
            RuleError::TauntBlocks => write!(f, "A taunt unit must be attacked first"),
            RuleError::SetupPending { player_id } => {
                write!(f, "Player {player_id} must place a starting unit first")
            }
            RuleError::SetupNotPending => write!(f, "No starting unit placement is pending"),
            RuleError::AutomaticPhasePending => write!(f, "Automatic phases are still resolving"),
            RuleError::TargetingPending => write!(f, "A target must be chosen first"),
            RuleError::NoTargetingSession => write!(f, "No target selection in progress"),
            RuleError::InvalidTarget => write!(f, "Invalid target"),
            RuleError::ManualMovementDisallowed => {
                write!(f, "Units only move during the advance phase or when forced by effects")
            }
            RuleError::StartingCardMissing { card_id } => {
                write!(f, "Starting unit card {card_id} is not in the catalog")
            }
            RuleError::IntegrityViolation { error } => write!(f, "State integrity violated: {error:?}"),
        }
    }
}

impl std::error::Error for RuleError {}

/// Sub-steps of the automatic DRAW and ADVANCE phases, run in queue order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AutoStep {
    Draw,
    Advance,
    EnterPlay,
}

impl AutoStep {
    /// Pause an animated host leaves before running the step.
    pub fn default_delay_ms(self) -> u32 {
        match self {
            AutoStep::Draw => 300,
            AutoStep::Advance => 500,
            AutoStep::EnterPlay => 0,
        }
    }
}

/// Something a unit may attack right now: an enemy unit or an empty enemy
/// spawn tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttackTarget {
    #[serde(rename_all = "camelCase")]
    Unit { unit_id: UnitId },
    #[serde(rename_all = "camelCase")]
    SpawnTile {
        position: Position,
        player_id: PlayerId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    pub fn new(state: &GameState, events: Vec<GameEvent>) -> Self {
        Self {
            state: state.clone(),
            events,
            victory: state.outcome.clone(),
        }
    }
}

/// The match orchestrator and sole mutator of [`GameState`].
#[derive(Debug)]
pub struct RuleEngine {
    state: GameState,
    catalog: CardCatalog,
    effect_engine: EffectEngine,
    bus: EventBus,
    history: History,
    auto_steps: VecDeque<AutoStep>,
    started: bool,
}

impl RuleEngine {
    /// Builds both decks, shuffles them and deals starting hands. Player 1
    /// gets `decks[0]`.
    pub fn new(config: GameConfig, catalog: CardCatalog, decks: [DeckSource; 2]) -> Self {
        let mut rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let mut players = Vec::with_capacity(2);
        for (id, source) in (1..=2).zip(decks.iter()) {
            let cards = build_deck(&catalog, source, &config);
            let mut player = Player::new(id, format!("Player {id}"), cards, &config, &mut rng)
                .with_deck_name(source.name());
            for _ in 0..config.starting_hand_size {
                player.draw_card();
            }
            log::info!(
                "player {} uses deck {} ({} cards left after dealing)",
                id,
                player.deck_name,
                player.deck.len()
            );
            players.push(player);
        }

        let effect_engine = EffectEngine::new(config.rng_seed.map(|seed| seed.wrapping_add(1)));
        let history = History::new(config.history_limit);
        Self {
            state: GameState::new(config, players),
            catalog,
            effect_engine,
            bus: EventBus::new(),
            history,
            auto_steps: VecDeque::new(),
            started: false,
        }
    }

    /// Base catalog and two preset decks.
    pub fn with_presets(config: GameConfig, first: DeckPreset, second: DeckPreset) -> Self {
        Self::new(config, CardCatalog::base(), [first.into(), second.into()])
    }

    /// Resumes a match from a snapshot, e.g. one taken from [`History`].
    pub fn from_snapshot(state: GameState, catalog: CardCatalog) -> Result<Self, RuleError> {
        Self::ensure_integrity(&state)?;
        let effect_engine = EffectEngine::new(state.config.rng_seed);
        let history = History::new(state.config.history_limit);
        let mut auto_steps = VecDeque::new();
        match state.phase {
            GamePhase::Draw => auto_steps.extend([AutoStep::Draw, AutoStep::Advance, AutoStep::EnterPlay]),
            GamePhase::Advance => auto_steps.extend([AutoStep::Advance, AutoStep::EnterPlay]),
            _ => {}
        }
        let mut engine = Self {
            state,
            catalog,
            effect_engine,
            bus: EventBus::new(),
            history,
            auto_steps,
            started: true,
        };
        if engine.state.config.auto_resolve_phases && !engine.state.game_over {
            let mut events = Vec::new();
            engine.drain_automatic(&mut events);
        }
        Ok(engine)
    }

    // ---- queries --------------------------------------------------------

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.state.config
    }

    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn current_player(&self) -> &Player {
        self.state.current_player()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn valid_spawn_positions(&self, player_id: PlayerId) -> Vec<Position> {
        self.state.valid_spawn_positions(player_id)
    }

    /// Enemy units and empty enemy spawn tiles `unit_id` could attack now.
    pub fn valid_attack_targets(&self, unit_id: UnitId) -> Vec<AttackTarget> {
        let Some(unit) = self.state.unit(unit_id) else {
            return Vec::new();
        };
        if unit.has_attacked
            || unit.player_id != self.state.current_player_id()
            || self.state.phase != GamePhase::Battle
        {
            return Vec::new();
        }
        let Some(enemy) = self.state.opponent_of(unit.player_id) else {
            return Vec::new();
        };
        let row = unit.position.row + self.state.forward(unit.player_id);
        let enemy_has_taunt = self.state.has_taunt_units(enemy);

        let mut targets = Vec::new();
        for col in unit.position.col - 1..=unit.position.col + 1 {
            let position = Position::new(row, col);
            if !self.state.board.is_valid_position(position) {
                continue;
            }
            match self.state.unit_at(position) {
                Some(target) if target.player_id != unit.player_id => {
                    if !enemy_has_taunt || target.has_taunt() {
                        targets.push(AttackTarget::Unit { unit_id: target.id });
                    }
                }
                Some(_) => {}
                None if row == self.state.enemy_spawn_row(unit.player_id) && !enemy_has_taunt => {
                    targets.push(AttackTarget::SpawnTile {
                        position,
                        player_id: enemy,
                    });
                }
                None => {}
            }
        }
        targets
    }

    pub fn pending_steps(&self) -> impl Iterator<Item = &AutoStep> {
        self.auto_steps.iter()
    }

    pub fn has_pending_steps(&self) -> bool {
        !self.auto_steps.is_empty()
    }

    // ---- events ---------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&EventRecord) + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Events up to a `TurnEnded` belong to the player whose turn ended.
    fn publish(&mut self, events: &[GameEvent]) {
        let current = self.state.current_player_id();
        let mut acting_player = events
            .iter()
            .find_map(|event| match event {
                GameEvent::TurnEnded { player_id, .. } => Some(*player_id),
                _ => None,
            })
            .unwrap_or(current);
        for event in events {
            self.bus.publish(&EventRecord {
                acting_player,
                timestamp: now_ms(),
                event: event.clone(),
            });
            if matches!(event, GameEvent::TurnEnded { .. }) {
                acting_player = current;
            }
        }
    }

    // ---- guards ---------------------------------------------------------

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state.integrity_check().map_err(|error| {
            log::error!("state integrity violated: {error:?}");
            RuleError::IntegrityViolation { error }
        })
    }

    fn ensure_phase(state: &GameState, expected: GamePhase) -> Result<(), RuleError> {
        if state.phase != expected {
            return Err(RuleError::InvalidPhase {
                expected,
                actual: state.phase,
            });
        }
        Ok(())
    }

    /// Preconditions shared by every command, targeting included.
    fn ensure_running(&self) -> Result<(), RuleError> {
        if !self.started {
            return Err(RuleError::GameNotStarted);
        }
        if self.state.game_over {
            return Err(RuleError::GameFinished);
        }
        Self::ensure_integrity(&self.state)?;
        if !self.auto_steps.is_empty() {
            return Err(RuleError::AutomaticPhasePending);
        }
        Ok(())
    }

    /// Common preconditions of every state-mutating command.
    fn ensure_ready(&self) -> Result<(), RuleError> {
        self.ensure_running()?;
        if self.state.targeting_mode.is_some() {
            return Err(RuleError::TargetingPending);
        }
        Ok(())
    }

    fn ensure_position(&self, position: Position) -> Result<(), RuleError> {
        if !self.state.board.is_valid_position(position) {
            return Err(RuleError::PositionOutOfBounds { position });
        }
        Ok(())
    }

    /// A ready attacker owned by the current player.
    fn ensure_attacker(&self, attacker_id: UnitId) -> Result<Unit, RuleError> {
        let attacker = self
            .state
            .unit(attacker_id)
            .ok_or(RuleError::UnitNotFound {
                unit_id: attacker_id,
            })?;
        if attacker.player_id != self.state.current_player_id() {
            return Err(RuleError::NotPlayerTurn);
        }
        if attacker.has_attacked {
            return Err(RuleError::AlreadyAttacked {
                unit_id: attacker_id,
            });
        }
        Ok(attacker.clone())
    }

    /// Directly ahead or diagonally ahead, exactly one row forward.
    fn is_in_attack_range(&self, attacker: &Unit, target: Position) -> bool {
        target.row - attacker.position.row == self.state.forward(attacker.player_id)
            && (target.col - attacker.position.col).abs() <= 1
    }

    // ---- lifecycle ------------------------------------------------------

    pub fn start_game(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        if self.started {
            return Err(RuleError::GameAlreadyStarted);
        }
        Self::ensure_integrity(&self.state)?;
        log::info!("starting new game");

        self.started = true;
        self.state.current_player_index = 0;
        self.state.turn_number = 1;
        self.state.current_player_mut().start_turn();

        let mut events = vec![GameEvent::GameStarted {
            first_player: self.state.current_player_id(),
        }];
        self.begin_turn(&mut events);
        self.publish(&events);
        Ok(events)
    }

    /// Enters SETUP if the current player still owes a starting placement,
    /// otherwise schedules the automatic phases.
    fn begin_turn(&mut self, events: &mut Vec<GameEvent>) {
        let player_id = self.state.current_player_id();
        if self.state.setup_pending(player_id) {
            let player_name = self.state.current_player().name.clone();
            self.state.phase = GamePhase::Setup;
            self.state.pending_actions = vec![PendingAction::PlaceStartingUnit {
                player_id,
                message: format!("{player_name}: Place your starting unit on any spawn tile"),
            }];
            events.push(GameEvent::SetupPhaseEntered {
                player_id,
                spawn_positions: self.state.valid_spawn_positions(player_id),
            });
            return;
        }

        self.state.phase = GamePhase::Draw;
        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::Draw,
        });
        self.auto_steps
            .extend([AutoStep::Draw, AutoStep::Advance, AutoStep::EnterPlay]);
        if self.state.config.auto_resolve_phases {
            self.drain_automatic(events);
        }
    }

    pub fn place_starting_unit(
        &mut self,
        player_id: PlayerId,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        if !self.started {
            return Err(RuleError::GameNotStarted);
        }
        if self.state.game_over {
            return Err(RuleError::GameFinished);
        }
        Self::ensure_integrity(&self.state)?;
        if self.state.phase != GamePhase::Setup {
            return Err(RuleError::SetupNotPending);
        }
        self.state
            .get_player(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })?;
        if self.state.current_player_id() != player_id {
            return Err(RuleError::NotPlayerTurn);
        }
        if !self.state.setup_pending(player_id) {
            return Err(RuleError::SetupNotPending);
        }
        self.ensure_position(position)?;
        if position.row != self.state.spawn_row(player_id) {
            return Err(RuleError::NotSpawnRow { position });
        }
        if !self.state.board.is_empty(position) {
            return Err(RuleError::TileOccupied { position });
        }
        let card_id = self.state.config.starting_unit_card.clone();
        let card = self
            .catalog
            .get(&card_id)
            .cloned()
            .ok_or(RuleError::StartingCardMissing { card_id })?;

        let unit_id = self
            .state
            .spawn_unit(&card, player_id, position)
            .ok_or(RuleError::TileOccupied { position })?;
        self.state.mark_setup_completed(player_id);
        self.state.pending_actions.clear();
        log::info!("player {player_id} placed starting unit at ({}, {})", position.row, position.col);

        let mut events = vec![
            GameEvent::UnitCreated {
                player_id,
                unit_id,
                position,
            },
            GameEvent::StartingUnitPlaced {
                player_id,
                unit_id,
                position,
            },
        ];
        self.begin_turn(&mut events);
        self.publish(&events);
        Ok(events)
    }

    // ---- automatic phases -----------------------------------------------

    /// Runs the next automatic step, if any, and publishes its events.
    pub fn step_automatic(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if let Some(step) = self.auto_steps.pop_front() {
            self.run_step(step, &mut events);
            self.publish(&events);
        }
        events
    }

    /// Runs every pending automatic step.
    pub fn run_automatic_phases(&mut self) -> Vec<GameEvent> {
        let mut events = Vec::new();
        self.drain_automatic(&mut events);
        self.publish(&events);
        events
    }

    /// Runs pending automatic steps, awaiting `pause(step)` before each one
    /// so a host can animate between them.
    pub async fn drive_automatic_phases<F, Fut>(&mut self, mut pause: F) -> Vec<GameEvent>
    where
        F: FnMut(AutoStep) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut events = Vec::new();
        while let Some(step) = self.auto_steps.front().copied() {
            pause(step).await;
            events.extend(self.step_automatic());
        }
        events
    }

    fn drain_automatic(&mut self, events: &mut Vec<GameEvent>) {
        while let Some(step) = self.auto_steps.pop_front() {
            self.run_step(step, events);
        }
    }

    fn run_step(&mut self, step: AutoStep, events: &mut Vec<GameEvent>) {
        if self.state.game_over {
            self.auto_steps.clear();
            return;
        }
        log::debug!("automatic step {step:?}");
        match step {
            AutoStep::Draw => self.handle_draw_phase(events),
            AutoStep::Advance => self.handle_advance_phase(events),
            AutoStep::EnterPlay => {
                self.state.phase = GamePhase::Play;
                events.push(GameEvent::PhaseChanged {
                    phase: GamePhase::Play,
                });
            }
        }
        self.check_win_conditions(events);
        if self.state.game_over {
            self.auto_steps.clear();
        }
    }

    fn handle_draw_phase(&mut self, events: &mut Vec<GameEvent>) {
        let draw_on_first_turn = self.state.config.draw_on_first_turn;
        let player = self.state.current_player_mut();
        let player_id = player.id;
        if draw_on_first_turn || player.turn_count > 1 {
            events.push(match player.draw_card() {
                DrawResult::Drawn(card) => GameEvent::CardDrawn {
                    player_id,
                    card_id: card.id,
                },
                DrawResult::Burned(card) => GameEvent::CardBurned {
                    player_id,
                    card_id: card.id,
                },
                DrawResult::Fatigue(damage) => GameEvent::FatigueDamage { player_id, damage },
            });
        }
        self.state.phase = GamePhase::Advance;
        events.push(GameEvent::PhaseChanged {
            phase: GamePhase::Advance,
        });
    }

    /// Ticks every root down, then moves each unrooted unit of the current
    /// player one row forward, front units first. Reaching the enemy spawn
    /// row ends the match at once.
    fn handle_advance_phase(&mut self, events: &mut Vec<GameEvent>) {
        let resolution = self.effect_engine.on_advance_phase(&mut self.state);
        events.extend(resolution.events);

        let player_id = self.state.current_player_id();
        let forward = self.state.forward(player_id);
        let enemy_spawn = self.state.enemy_spawn_row(player_id);

        let mut order: Vec<(UnitId, Position, bool)> = self
            .state
            .current_player()
            .units
            .iter()
            .map(|unit| (unit.id, unit.position, unit.is_rooted))
            .collect();
        order.sort_by_key(|(_, position, _)| position.row * forward);
        order.reverse();

        for (unit_id, from, rooted) in order {
            if rooted {
                log::debug!("unit {unit_id} is rooted and cannot advance");
                continue;
            }
            let to = from.offset(forward, 0);
            if !self.state.board.is_empty(to) {
                continue;
            }
            if self.state.move_unit_forced(unit_id, to).is_none() {
                continue;
            }
            if let Some(unit) = self.state.unit_mut(unit_id) {
                unit.advances_this_turn += 1;
            }
            events.push(GameEvent::UnitAdvanced { unit_id, from, to });

            if to.row == enemy_spawn {
                self.end_game(player_id, VictoryReason::ReachedSpawn { unit_id }, events);
                return;
            }
        }
    }

    // ---- commands -------------------------------------------------------

    /// Plays the card at `hand_index`. Units go to `position`, which must be
    /// an empty tile of the player's spawn row; spells ignore it.
    pub fn play_card(
        &mut self,
        hand_index: usize,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_ready()?;
        Self::ensure_phase(&self.state, GamePhase::Play)?;

        let player = self.state.current_player();
        let player_id = player.id;
        let card = player
            .hand
            .get(hand_index)
            .cloned()
            .ok_or(RuleError::InvalidHandIndex { index: hand_index })?;
        let cost = player.effective_cost(&card);
        if cost > player.mana {
            return Err(RuleError::InsufficientMana {
                required: cost,
                available: player.mana,
            });
        }
        if card.card_type == CardType::Unit {
            self.ensure_position(position)?;
            if position.row != self.state.spawn_row(player_id) {
                return Err(RuleError::NotSpawnRow { position });
            }
            if !self.state.board.is_empty(position) {
                return Err(RuleError::TileOccupied { position });
            }
        }

        self.history.record(&self.state);
        let player = self.state.current_player_mut();
        player.hand.remove(hand_index);
        player.mana -= cost;
        if player.cost_reduction(&card.archetype) > 0 {
            player.use_cost_reduction(&card.archetype);
        }
        log::info!("player {player_id} plays {} for {cost} mana", card.name);

        let mut events = Vec::new();
        match card.card_type {
            CardType::Unit => {
                let unit_id = self
                    .state
                    .spawn_unit(&card, player_id, position)
                    .ok_or(RuleError::TileOccupied { position })?;
                events.push(GameEvent::UnitCreated {
                    player_id,
                    unit_id,
                    position,
                });
                events.push(GameEvent::UnitPlayed {
                    player_id,
                    unit_id,
                    card_id: card.id.clone(),
                });
                let resolution = self.effect_engine.on_unit_played(&mut self.state, unit_id);
                self.absorb(resolution, &mut events);
            }
            CardType::Spell => {
                events.push(GameEvent::SpellPlayed {
                    player_id,
                    card_id: card.id.clone(),
                });
                let resolution = self.effect_engine.on_spell_cast(&mut self.state, &card, player_id);
                self.state.current_player_mut().graveyard.push(card);
                self.absorb(resolution, &mut events);
            }
        }

        self.check_win_conditions(&mut events);
        self.publish(&events);
        Ok(events)
    }

    pub fn attack(&mut self, attacker_id: UnitId, target_id: UnitId) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_ready()?;
        Self::ensure_phase(&self.state, GamePhase::Battle)?;

        let attacker = self.ensure_attacker(attacker_id)?;
        let target = self
            .state
            .unit(target_id)
            .ok_or(RuleError::UnitNotFound { unit_id: target_id })?;
        if target.player_id == attacker.player_id {
            return Err(RuleError::FriendlyTarget);
        }
        if !self.is_in_attack_range(&attacker, target.position) {
            return Err(RuleError::OutOfRange);
        }
        if self.state.has_taunt_units(target.player_id) && !target.has_taunt() {
            return Err(RuleError::TauntBlocks);
        }

        self.history.record(&self.state);
        let damage = attacker.attack;
        let mut casualties = Vec::new();
        if let Some(unit) = self.state.unit_mut(attacker_id) {
            unit.has_attacked = true;
        }
        if let Some(unit) = self.state.unit_mut(target_id) {
            unit.health -= damage;
            if unit.is_dead() {
                casualties.push(Casualty {
                    unit_id: target_id,
                    killer: Some(attacker_id),
                });
            }
        }
        log::info!("unit {attacker_id} attacks unit {target_id} for {damage}");

        let mut events = vec![GameEvent::UnitAttacked {
            attacker_id,
            target_id,
            damage,
        }];
        let mut resolution = self.effect_engine.on_attack(&mut self.state, attacker_id, target_id);
        casualties.append(&mut resolution.casualties);
        resolution.casualties = casualties;
        self.absorb(resolution, &mut events);

        self.check_win_conditions(&mut events);
        self.publish(&events);
        Ok(events)
    }

    /// Attacks an empty enemy spawn tile, damaging the opposing player.
    pub fn attack_spawn_tile(
        &mut self,
        attacker_id: UnitId,
        position: Position,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_ready()?;
        Self::ensure_phase(&self.state, GamePhase::Battle)?;

        let attacker = self.ensure_attacker(attacker_id)?;
        self.ensure_position(position)?;
        if position.row != self.state.enemy_spawn_row(attacker.player_id) {
            return Err(RuleError::NotSpawnRow { position });
        }
        if !self.is_in_attack_range(&attacker, position) {
            return Err(RuleError::OutOfRange);
        }
        if !self.state.board.is_empty(position) {
            return Err(RuleError::TileOccupied { position });
        }
        let target_player = self
            .state
            .opponent_of(attacker.player_id)
            .ok_or(RuleError::PlayerNotFound {
                player_id: attacker.player_id,
            })?;
        if self.state.has_taunt_units(target_player) {
            return Err(RuleError::TauntBlocks);
        }

        self.history.record(&self.state);
        if let Some(unit) = self.state.unit_mut(attacker_id) {
            unit.has_attacked = true;
        }
        let damage = attacker.attack;
        let mut events = vec![GameEvent::SpawnTileAttacked {
            attacker_id,
            position,
            target_player,
            damage,
        }];
        if let Some(player) = self.state.get_player_mut(target_player) {
            player.health -= damage;
            if player.health <= 0 {
                events.push(GameEvent::PlayerDefeated {
                    player_id: target_player,
                });
            }
        }
        log::info!("unit {attacker_id} hits player {target_player}'s spawn for {damage}");

        self.check_win_conditions(&mut events);
        self.publish(&events);
        Ok(events)
    }

    /// PLAY → BATTLE → END → next player's turn.
    pub fn advance_phase(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_ready()?;
        match self.state.phase {
            GamePhase::Setup => {
                return Err(RuleError::SetupPending {
                    player_id: self.state.current_player_id(),
                })
            }
            phase if phase.is_automatic() => {
                log::warn!("unexpected manual transition from {:?}", self.state.phase);
                return Err(RuleError::AutomaticPhasePending);
            }
            _ => {}
        }

        self.history.record(&self.state);
        let mut events = Vec::new();
        match self.state.phase {
            GamePhase::Play => self.enter_phase(GamePhase::Battle, &mut events),
            GamePhase::Battle => self.enter_phase(GamePhase::End, &mut events),
            _ => self.end_turn(&mut events),
        }

        self.check_win_conditions(&mut events);
        self.publish(&events);
        Ok(events)
    }

    fn enter_phase(&mut self, phase: GamePhase, events: &mut Vec<GameEvent>) {
        self.state.phase = phase;
        events.push(GameEvent::PhaseChanged { phase });
    }

    fn end_turn(&mut self, events: &mut Vec<GameEvent>) {
        let ending = self.state.current_player_id();
        self.state.current_player_mut().reset_attacks();
        events.push(GameEvent::TurnEnded {
            player_id: ending,
            turn_number: self.state.turn_number,
        });

        self.state.current_player_index = (self.state.current_player_index + 1) % self.state.players.len();
        if self.state.current_player_index == 0 {
            self.state.turn_number += 1;
        }
        self.state.current_player_mut().start_turn();
        log::info!(
            "turn {} begins for player {}",
            self.state.turn_number,
            self.state.current_player_id()
        );
        self.begin_turn(events);
    }

    /// Units never move by player choice.
    pub fn move_unit(&mut self, unit_id: UnitId, position: Position) -> Result<Vec<GameEvent>, RuleError> {
        log::warn!(
            "manual movement of unit {unit_id} to ({}, {}) rejected",
            position.row,
            position.col
        );
        Err(RuleError::ManualMovementDisallowed)
    }

    // ---- targeting ------------------------------------------------------

    /// Opens a target selection for `effect`. Returns no events and opens
    /// nothing when the effect has no legal target.
    pub fn enter_targeting_mode(
        &mut self,
        source: EffectSource,
        effect: CardEffect,
    ) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_ready()?;
        let mut events = Vec::new();
        self.open_targeting(source, effect, &mut events);
        self.publish(&events);
        Ok(events)
    }

    fn open_targeting(&mut self, source: EffectSource, effect: CardEffect, events: &mut Vec<GameEvent>) -> bool {
        let valid_targets = self.effect_engine.get_valid_targets(&self.state, &effect, &source);
        if valid_targets.is_empty() {
            log::warn!("no valid targets for effect of {}", source.name());
            return false;
        }
        let message = targeting_message(effect.action).to_string();
        events.push(GameEvent::TargetingModeEntered {
            message: message.clone(),
            valid_targets: valid_targets.clone(),
        });
        self.state.targeting_mode = Some(TargetingMode {
            source,
            effect,
            valid_targets,
            message,
        });
        true
    }

    /// Opens the next queued selection that still has a legal target.
    fn open_next_queued(&mut self, events: &mut Vec<GameEvent>) {
        while self.state.targeting_mode.is_none() && !self.state.game_over {
            if self.state.queued_targeting.is_empty() {
                return;
            }
            let next = self.state.queued_targeting.remove(0);
            self.open_targeting(next.source, next.effect, events);
        }
    }

    /// Runs the open selection's effect on `target` and closes it.
    pub fn resolve_targeting(&mut self, target: EffectTarget) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_running()?;
        let session = self
            .state
            .targeting_mode
            .as_ref()
            .ok_or(RuleError::NoTargetingSession)?;
        if !session.valid_targets.contains(&target) {
            return Err(RuleError::InvalidTarget);
        }
        let Some(session) = self.state.targeting_mode.take() else {
            return Err(RuleError::NoTargetingSession);
        };

        let resolution = self.effect_engine.execute_effect_action(
            &mut self.state,
            &session.source,
            &session.effect,
            std::slice::from_ref(&target),
        );
        if !resolution.outcome.success {
            log::info!("targeted effect failed: {:?}", resolution.outcome.message);
        }
        let mut events = Vec::new();
        self.absorb(resolution, &mut events);
        events.push(GameEvent::TargetingModeExited);
        self.open_next_queued(&mut events);

        self.check_win_conditions(&mut events);
        self.publish(&events);
        Ok(events)
    }

    /// Cancels the open selection. Queued selections still open afterwards.
    pub fn exit_targeting_mode(&mut self) -> Result<Vec<GameEvent>, RuleError> {
        self.ensure_running()?;
        if self.state.targeting_mode.take().is_none() {
            return Err(RuleError::NoTargetingSession);
        }
        let mut events = vec![GameEvent::TargetingModeExited];
        self.open_next_queued(&mut events);
        self.publish(&events);
        Ok(events)
    }

    // ---- resolution plumbing --------------------------------------------

    /// Folds an effect resolution into the command's events: finalizes deaths
    /// and opens or queues interactive selections.
    fn absorb(&mut self, resolution: EffectResolution, events: &mut Vec<GameEvent>) {
        events.extend(resolution.events);
        self.finalize_casualties(resolution.casualties, events);
        for request in resolution.targeting_requests {
            self.request_targeting(request, events);
        }
    }

    fn request_targeting(&mut self, request: EffectExecution, events: &mut Vec<GameEvent>) {
        if self.state.targeting_mode.is_some() {
            self.state.queued_targeting.push(request);
        } else {
            self.open_targeting(request.source, request.effect, events);
        }
    }

    /// Removes dead units, sends their cards to the graveyard and runs death
    /// triggers. Chains stop after `max_effect_depth` generations.
    fn finalize_casualties(&mut self, casualties: Vec<Casualty>, events: &mut Vec<GameEvent>) {
        let max_depth = self.state.config.max_effect_depth;
        let mut pending: VecDeque<(Casualty, usize)> =
            casualties.into_iter().map(|casualty| (casualty, 1)).collect();

        while let Some((casualty, depth)) = pending.pop_front() {
            if !self.state.unit(casualty.unit_id).is_some_and(Unit::is_dead) {
                continue;
            }
            let killer = casualty
                .killer
                .and_then(|id| self.state.unit(id))
                .cloned();
            let Some(dead) = self.state.remove_unit(casualty.unit_id) else {
                continue;
            };
            let card = self
                .catalog
                .get(&dead.card_id)
                .cloned()
                .unwrap_or_else(|| card_from_unit(&dead));
            if let Some(owner) = self.state.get_player_mut(dead.player_id) {
                owner.graveyard.push(card);
            }
            log::info!("unit {} ({}) died", dead.id, dead.name);
            events.push(GameEvent::UnitDied {
                unit_id: dead.id,
                player_id: dead.player_id,
                card_id: dead.card_id.clone(),
                killer: casualty.killer,
            });

            if depth > max_depth {
                log::warn!("death trigger chain exceeded depth {max_depth}, skipping triggers of {}", dead.name);
                continue;
            }
            let resolution = self
                .effect_engine
                .on_unit_died(&mut self.state, &dead, killer.as_ref());
            events.extend(resolution.events);
            pending.extend(
                resolution
                    .casualties
                    .into_iter()
                    .map(|casualty| (casualty, depth + 1)),
            );
            for request in resolution.targeting_requests {
                self.request_targeting(request, events);
            }
        }
    }

    fn check_win_conditions(&mut self, events: &mut Vec<GameEvent>) {
        if self.state.game_over {
            return;
        }
        if let Some(VictoryState { winner, reason }) = self.state.detect_victory() {
            self.end_game(winner, reason, events);
        }
    }

    fn end_game(&mut self, winner: PlayerId, reason: VictoryReason, events: &mut Vec<GameEvent>) {
        if self.state.declare_victory(winner, reason.clone()) {
            log::info!("game ended - player {winner} wins: {reason}");
            self.auto_steps.clear();
            events.push(GameEvent::GameEnded { winner, reason });
        }
    }
}

fn targeting_message(action: Option<EffectAction>) -> &'static str {
    match action {
        Some(EffectAction::Root) => "Select a unit to root",
        Some(EffectAction::Push) => "Select a unit to push forward",
        Some(EffectAction::Pull) => "Select a unit to pull back",
        Some(EffectAction::Teleport) => "Select a unit to teleport",
        Some(EffectAction::Discard) => "Select a card to discard",
        Some(EffectAction::ReturnToHand) => "Select cards to return to hand",
        Some(EffectAction::Resurrect) => "Select a unit to resurrect",
        _ => "Select a target",
    }
}

/// Rebuilds a card for the graveyard when the unit's card is not in the
/// catalog, e.g. a deleted custom card loaded from stored deck data.
fn card_from_unit(unit: &Unit) -> Card {
    let mut card = Card::unit(
        unit.card_id.clone(),
        unit.name.clone(),
        unit.cost,
        unit.attack,
        unit.max_health.max(1),
    )
    .with_archetype(unit.archetype.clone());
    card.effects = unit.effects.clone();
    card.icon = unit.icon.clone();
    card
}
