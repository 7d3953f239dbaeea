use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::board::Position;
use super::cards::{
    Card, CardEffect, CardId, CardLocation, CardType, ControllerFilter, EffectAction, EffectArea,
    EffectTrigger, TargetFilter, TargetSelector,
};
use super::events::GameEvent;
use super::player::{DrawResult, PlayerId};
use super::state::{
    Buff, EffectExecution, GameState, Unit, UnitId, VictoryReason, PERMANENT, ROOT_BUFF,
};
use crate::utils::now_ms;

/// Who is acting. Units are captured by value so triggers of a unit that
/// already left the board still know its controller and last position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EffectSource {
    Unit { unit: Unit },
    Card { card: Card, controller: PlayerId },
}

impl EffectSource {
    pub fn controller(&self) -> PlayerId {
        match self {
            EffectSource::Unit { unit } => unit.player_id,
            EffectSource::Card { controller, .. } => *controller,
        }
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        match self {
            EffectSource::Unit { unit } => Some(unit.id),
            EffectSource::Card { .. } => None,
        }
    }

    pub fn card_id(&self) -> &str {
        match self {
            EffectSource::Unit { unit } => &unit.card_id,
            EffectSource::Card { card, .. } => &card.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EffectSource::Unit { unit } => &unit.name,
            EffectSource::Card { card, .. } => &card.name,
        }
    }

    /// Current position when the unit is still on the board, otherwise the
    /// last one it had.
    fn position(&self, state: &GameState) -> Option<Position> {
        match self {
            EffectSource::Unit { unit } => Some(
                state
                    .unit(unit.id)
                    .map(|live| live.position)
                    .unwrap_or(unit.position),
            ),
            EffectSource::Card { .. } => None,
        }
    }
}

/// Anything an effect can be aimed at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EffectTarget {
    #[serde(rename_all = "camelCase")]
    Unit { unit_id: UnitId },
    #[serde(rename_all = "camelCase")]
    Player { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    Card { card_id: CardId },
    Position { position: Position },
}

impl EffectTarget {
    pub fn unit(unit_id: UnitId) -> Self {
        EffectTarget::Unit { unit_id }
    }

    pub fn card(card_id: impl Into<CardId>) -> Self {
        EffectTarget::Card {
            card_id: card_id.into(),
        }
    }
}

/// Success flag and optional detail of a single action. Actions never error;
/// a missing or mismatched target is a failed outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EffectOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Tiles moved for push/pull, cards moved for return-to-hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,
}

impl EffectOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            amount: None,
        }
    }

    fn with_amount(mut self, amount: i32, message: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.message = Some(message.into());
        self
    }
}

/// A unit whose health dropped to zero. Removal is left to the rule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Casualty {
    pub unit_id: UnitId,
    pub killer: Option<UnitId>,
}

#[derive(Debug, Clone, Default)]
pub struct EffectResolution {
    pub outcome: EffectOutcome,
    pub events: Vec<GameEvent>,
    pub casualties: Vec<Casualty>,
    /// Interactive effects waiting for the host to pick a target.
    pub targeting_requests: Vec<EffectExecution>,
}

impl EffectResolution {
    fn from_outcome(outcome: EffectOutcome) -> Self {
        Self {
            outcome,
            ..Self::default()
        }
    }

    /// Merges `other` in. The merged outcome succeeds if either side did.
    pub fn extend(&mut self, mut other: EffectResolution) {
        self.events.append(&mut other.events);
        self.casualties.append(&mut other.casualties);
        self.targeting_requests.append(&mut other.targeting_requests);
        if other.outcome.success || !self.outcome.success {
            self.outcome = other.outcome;
        }
    }
}

/// Interprets declared card effects against the game state.
#[derive(Debug)]
pub struct EffectEngine {
    rng: SmallRng,
}

impl Default for EffectEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EffectEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self { rng }
    }

    // ---- trigger points -------------------------------------------------

    pub fn on_unit_played(&mut self, state: &mut GameState, unit_id: UnitId) -> EffectResolution {
        let Some(unit) = state.unit(unit_id).cloned() else {
            return EffectResolution::default();
        };
        let effects = unit.effects_for(EffectTrigger::Warshout);
        let source = EffectSource::Unit { unit };
        self.resolve_warshouts(state, &source, effects)
    }

    pub fn on_spell_cast(
        &mut self,
        state: &mut GameState,
        card: &Card,
        controller: PlayerId,
    ) -> EffectResolution {
        let effects: Vec<CardEffect> = card
            .effects
            .iter()
            .filter(|effect| effect.trigger == EffectTrigger::Warshout)
            .cloned()
            .collect();
        let source = EffectSource::Card {
            card: card.clone(),
            controller,
        };
        self.resolve_warshouts(state, &source, effects)
    }

    fn resolve_warshouts(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effects: Vec<CardEffect>,
    ) -> EffectResolution {
        let mut resolution = EffectResolution::default();
        for effect in effects {
            log::debug!("resolving warshout of {}: {:?}", source.name(), effect);
            if effect.requires_targeting {
                if self.get_valid_targets(state, &effect, source).is_empty() {
                    log::warn!("no valid targets for warshout of {}", source.name());
                    continue;
                }
                resolution.targeting_requests.push(EffectExecution {
                    effect,
                    source: source.clone(),
                    target: None,
                    timestamp: now_ms(),
                });
            } else {
                resolution.extend(self.apply_triggered(state, source, &effect, None));
            }
        }
        resolution
    }

    /// STRIKE effects of the attacker, aimed at the defender.
    pub fn on_attack(
        &mut self,
        state: &mut GameState,
        attacker_id: UnitId,
        defender_id: UnitId,
    ) -> EffectResolution {
        let Some(attacker) = state.unit(attacker_id).cloned() else {
            return EffectResolution::default();
        };
        let effects = attacker.effects_for(EffectTrigger::Strike);
        let source = EffectSource::Unit { unit: attacker };
        let defender = EffectTarget::unit(defender_id);
        let mut resolution = EffectResolution::default();
        for effect in effects {
            resolution.extend(self.apply_triggered(state, &source, &effect, Some(&defender)));
        }
        resolution
    }

    /// DEATHBLOW of the dead unit (aimed at its killer) then DEATHSTRIKE of
    /// the killer (aimed at the victim).
    pub fn on_unit_died(
        &mut self,
        state: &mut GameState,
        dead: &Unit,
        killer: Option<&Unit>,
    ) -> EffectResolution {
        let mut resolution = EffectResolution::default();

        let dead_source = EffectSource::Unit { unit: dead.clone() };
        let killer_target = killer.map(|unit| EffectTarget::unit(unit.id));
        for effect in dead.effects_for(EffectTrigger::Deathblow) {
            resolution.extend(self.apply_triggered(
                state,
                &dead_source,
                &effect,
                killer_target.as_ref(),
            ));
        }

        if let Some(killer) = killer {
            let killer_source = EffectSource::Unit {
                unit: killer.clone(),
            };
            let victim = EffectTarget::unit(dead.id);
            for effect in killer.effects_for(EffectTrigger::Deathstrike) {
                resolution.extend(self.apply_triggered(state, &killer_source, &effect, Some(&victim)));
            }
        }
        resolution
    }

    /// Counts down root durations of every unit on the board, whoever's
    /// ADVANCE phase it is.
    pub fn on_advance_phase(&mut self, state: &mut GameState) -> EffectResolution {
        let mut resolution = EffectResolution::default();
        let rooted = state
            .players
            .iter_mut()
            .flat_map(|player| player.units.iter_mut())
            .filter(|unit| unit.is_rooted);
        for unit in rooted {
            let remaining = unit.root_duration.unwrap_or(1) - 1;
            if remaining <= 0 {
                unit.is_rooted = false;
                unit.root_duration = None;
                resolution
                    .events
                    .push(GameEvent::RootExpired { unit_id: unit.id });
            } else {
                unit.root_duration = Some(remaining);
            }
        }
        resolution
    }

    // ---- targeting ------------------------------------------------------

    /// Candidate targets of `effect` when cast by `source`.
    pub fn get_valid_targets(
        &self,
        state: &GameState,
        effect: &CardEffect,
        source: &EffectSource,
    ) -> Vec<EffectTarget> {
        let controller = source.controller();
        let filter = effect.filter.clone().unwrap_or_default();

        match effect.action {
            Some(EffectAction::Discard) => {
                return Self::card_targets(state, controller, CardLocation::Hand, &filter, false)
            }
            Some(EffectAction::ReturnToHand) => {
                return Self::card_targets(state, controller, CardLocation::Graveyard, &filter, false)
            }
            Some(EffectAction::Resurrect) => {
                return Self::card_targets(state, controller, CardLocation::Graveyard, &filter, true)
            }
            _ => {}
        }

        let source_id = source.unit_id();
        let candidates: Vec<&Unit> = match effect.target {
            TargetSelector::SelfUnit => source_id
                .and_then(|id| state.unit(id))
                .into_iter()
                .collect(),
            TargetSelector::Ally => state
                .get_player(controller)
                .map(|player| {
                    player
                        .units
                        .iter()
                        .filter(|unit| Some(unit.id) != source_id)
                        .collect()
                })
                .unwrap_or_default(),
            TargetSelector::Enemy => state
                .opponent_of(controller)
                .and_then(|enemy| state.get_player(enemy))
                .map(|player| player.units.iter().collect())
                .unwrap_or_default(),
            TargetSelector::All | TargetSelector::Any => state.all_units().collect(),
        };

        candidates
            .into_iter()
            .filter(|unit| !effect.yar || state.is_in_yar(unit.position, controller))
            .filter(|unit| Self::unit_matches(state, unit, &filter, controller))
            .map(|unit| EffectTarget::unit(unit.id))
            .collect()
    }

    fn card_targets(
        state: &GameState,
        controller: PlayerId,
        zone: CardLocation,
        filter: &TargetFilter,
        units_only: bool,
    ) -> Vec<EffectTarget> {
        let Some(player) = state.get_player(controller) else {
            return Vec::new();
        };
        if filter.location.is_some_and(|location| location != zone) {
            return Vec::new();
        }
        let cards = match zone {
            CardLocation::Hand => &player.hand,
            _ => &player.graveyard,
        };
        let mut targets: Vec<EffectTarget> = Vec::new();
        for card in cards {
            if units_only && card.card_type != CardType::Unit {
                continue;
            }
            if !Self::card_matches(card, filter) {
                continue;
            }
            let target = EffectTarget::card(card.id.clone());
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    fn unit_matches(state: &GameState, unit: &Unit, filter: &TargetFilter, acting: PlayerId) -> bool {
        if filter.card_type.is_some_and(|kind| kind != CardType::Unit) {
            return false;
        }
        if filter.archetype.as_ref().is_some_and(|archetype| *archetype != unit.archetype) {
            return false;
        }
        if !within(unit.cost, filter.min_cost, filter.max_cost)
            || !within(unit.attack, filter.min_attack, filter.max_attack)
            || !within(unit.health, filter.min_health, filter.max_health)
        {
            return false;
        }
        if filter.has_effect.is_some_and(|trigger| !unit.has_trigger(trigger)) {
            return false;
        }
        if filter.location.is_some_and(|location| location != CardLocation::Field) {
            return false;
        }
        match filter.controller {
            Some(ControllerFilter::Own) if unit.player_id != acting => return false,
            Some(ControllerFilter::Enemy) if unit.player_id == acting => return false,
            _ => {}
        }
        if filter.in_yar && !state.is_in_yar(unit.position, acting) {
            return false;
        }
        if filter.is_rooted.is_some_and(|rooted| rooted != unit.is_rooted) {
            return false;
        }
        true
    }

    fn card_matches(card: &Card, filter: &TargetFilter) -> bool {
        if filter.card_type.is_some_and(|kind| kind != card.card_type) {
            return false;
        }
        if filter.archetype.as_ref().is_some_and(|archetype| *archetype != card.archetype) {
            return false;
        }
        if !within(card.cost, filter.min_cost, filter.max_cost) {
            return false;
        }
        if let Some(attack) = card.attack {
            if !within(attack, filter.min_attack, filter.max_attack) {
                return false;
            }
        }
        if let Some(health) = card.health {
            if !within(health, filter.min_health, filter.max_health) {
                return false;
            }
        }
        if filter.has_effect.is_some_and(|trigger| !card.has_trigger(trigger)) {
            return false;
        }
        true
    }

    /// Picks targets for a non-interactive effect and runs it.
    ///
    /// `context` is the unit the trigger is about (the defender for STRIKE,
    /// the killer for DEATHBLOW, the victim for DEATHSTRIKE). It is used when
    /// it is itself a legal candidate; otherwise the effect falls back to its
    /// selector and area hint.
    fn apply_triggered(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        context: Option<&EffectTarget>,
    ) -> EffectResolution {
        let action = effect.resolved_action();
        if action.is_untargeted() {
            return self.execute_effect_action(state, source, effect, &[]);
        }

        if matches!(action, EffectAction::Discard | EffectAction::ReturnToHand | EffectAction::Resurrect) {
            let targets: Vec<EffectTarget> = match context {
                Some(target @ EffectTarget::Card { .. }) => vec![target.clone()],
                _ if action == EffectAction::Resurrect => {
                    vec![EffectTarget::card(source.card_id().to_string())]
                }
                _ => Vec::new(),
            };
            return self.execute_effect_action(state, source, effect, &targets);
        }

        let candidates = self.get_valid_targets(state, effect, source);
        if let Some(context) = context {
            if candidates.contains(context) && effect.area.map_or(true, |area| area == EffectArea::Single) {
                return self.execute_effect_action(state, source, effect, std::slice::from_ref(context));
            }
        }

        let origin = source.position(state);
        let scoped: Vec<EffectTarget> = candidates
            .into_iter()
            .filter(|target| match (effect.area, origin, target) {
                (Some(area), Some(origin), EffectTarget::Unit { unit_id }) => state
                    .unit(*unit_id)
                    .is_some_and(|unit| in_area(area, origin, unit.position)),
                _ => true,
            })
            .collect();

        if scoped.is_empty() {
            return EffectResolution::from_outcome(EffectOutcome::fail("No valid targets"));
        }
        if effect.area == Some(EffectArea::Single) {
            return self.execute_effect_action(state, source, effect, &scoped[..1]);
        }

        let mut resolution = EffectResolution::from_outcome(EffectOutcome::fail("No valid targets"));
        for target in &scoped {
            resolution.extend(self.execute_effect_action(
                state,
                source,
                effect,
                std::slice::from_ref(target),
            ));
        }
        resolution
    }

    // ---- actions --------------------------------------------------------

    /// Runs the effect's explicit or inferred action against `targets`.
    /// Single-target actions use the first target; RETURN_TO_HAND uses all.
    pub fn execute_effect_action(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        targets: &[EffectTarget],
    ) -> EffectResolution {
        state.effect_stack.push(EffectExecution {
            effect: effect.clone(),
            source: source.clone(),
            target: targets.first().cloned(),
            timestamp: now_ms(),
        });

        let action = effect.resolved_action();
        log::debug!("{} executes {:?}", source.name(), action);
        let mut resolution = EffectResolution::default();
        let target = targets.first();
        let outcome = match action {
            EffectAction::Damage => self.damage(state, source, effect, target, &mut resolution),
            EffectAction::Heal => self.heal(state, effect, target, &mut resolution),
            EffectAction::Buff => self.buff(state, source, effect, target, &mut resolution),
            EffectAction::Draw => self.draw(state, source, effect, &mut resolution),
            EffectAction::Root => self.root(state, source, effect, target, &mut resolution),
            EffectAction::ReduceCost => self.reduce_cost(state, source, effect, &mut resolution),
            EffectAction::Push => self.push(state, source, effect, target, &mut resolution),
            EffectAction::Pull => self.pull(state, source, effect, target, &mut resolution),
            EffectAction::Teleport => self.teleport(state, source, target, &mut resolution),
            EffectAction::Discard => self.discard(state, source, target, &mut resolution),
            EffectAction::ReturnToHand => self.return_to_hand(state, source, targets, &mut resolution),
            EffectAction::Resurrect => self.resurrect(state, source, target, &mut resolution),
            EffectAction::Stun | EffectAction::Summon => {
                log::warn!("unsupported effect action {:?}", action);
                EffectOutcome::fail("Unknown effect action")
            }
        };

        state.effect_stack.pop();
        if !outcome.success {
            log::debug!("{:?} from {} failed: {:?}", action, source.name(), outcome.message);
        }
        resolution.outcome = outcome;
        resolution
    }

    fn damage(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(amount) = effect.value.filter(|value| *value > 0) else {
            return EffectOutcome::fail("Damage needs a positive value");
        };
        match target {
            Some(EffectTarget::Unit { unit_id }) => {
                let Some(unit) = state.unit_mut(*unit_id) else {
                    return EffectOutcome::fail("Target unit is gone");
                };
                unit.health -= amount;
                let dead = unit.is_dead();
                out.events.push(GameEvent::DamageDealt {
                    target: EffectTarget::unit(*unit_id),
                    amount,
                });
                if dead {
                    out.casualties.push(Casualty {
                        unit_id: *unit_id,
                        killer: source.unit_id(),
                    });
                }
                EffectOutcome::ok()
            }
            Some(EffectTarget::Player { player_id }) => {
                let Some(player) = state.get_player_mut(*player_id) else {
                    return EffectOutcome::fail("Target player not found");
                };
                player.health -= amount;
                let defeated = player.health <= 0;
                out.events.push(GameEvent::DamageDealt {
                    target: EffectTarget::Player {
                        player_id: *player_id,
                    },
                    amount,
                });
                if defeated {
                    out.events.push(GameEvent::PlayerDefeated {
                        player_id: *player_id,
                    });
                }
                EffectOutcome::ok()
            }
            Some(_) => EffectOutcome::fail("Damage needs a unit or player target"),
            None => EffectOutcome::fail("Damage needs a target"),
        }
    }

    fn heal(
        &mut self,
        state: &mut GameState,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(value) = effect.value.filter(|value| *value > 0) else {
            return EffectOutcome::fail("Heal needs a positive value");
        };
        let (health, max_health) = match target {
            Some(EffectTarget::Unit { unit_id }) => match state.unit_mut(*unit_id) {
                Some(unit) => (&mut unit.health, unit.max_health),
                None => return EffectOutcome::fail("Target unit is gone"),
            },
            Some(EffectTarget::Player { player_id }) => match state.get_player_mut(*player_id) {
                Some(player) => (&mut player.health, player.max_health),
                None => return EffectOutcome::fail("Target player not found"),
            },
            Some(_) => return EffectOutcome::fail("Heal needs a unit or player target"),
            None => return EffectOutcome::fail("Heal needs a target"),
        };
        let amount = value.min(max_health - *health).max(0);
        *health += amount;
        if let Some(target) = target {
            out.events.push(GameEvent::HealingDone {
                target: target.clone(),
                amount,
            });
        }
        EffectOutcome::ok()
    }

    fn buff(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(value) = effect.value.filter(|value| *value != 0) else {
            return EffectOutcome::fail("Buff needs a value");
        };
        let Some(EffectTarget::Unit { unit_id }) = target else {
            return EffectOutcome::fail("Buff needs a unit target");
        };
        let buff_id = state.allocate_buff_id();
        let Some(unit) = state.unit_mut(*unit_id) else {
            return EffectOutcome::fail("Target unit is gone");
        };
        unit.attack += value;
        unit.health += value;
        unit.max_health += value;
        unit.buffs.push(Buff {
            id: buff_id,
            source: source.name().to_string(),
            attack: Some(value),
            health: Some(value),
            duration: Some(PERMANENT),
            kind: None,
        });
        out.events.push(GameEvent::BuffApplied {
            unit_id: *unit_id,
            amount: value,
        });
        EffectOutcome::ok()
    }

    fn draw(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let controller = source.controller();
        let Some(player) = state.get_player_mut(controller) else {
            return EffectOutcome::fail("Controller not found");
        };
        let count = effect.value.unwrap_or(1).max(1);
        for _ in 0..count {
            out.events.push(match player.draw_card() {
                DrawResult::Drawn(card) => GameEvent::CardDrawn {
                    player_id: controller,
                    card_id: card.id,
                },
                DrawResult::Burned(card) => GameEvent::CardBurned {
                    player_id: controller,
                    card_id: card.id,
                },
                DrawResult::Fatigue(damage) => GameEvent::FatigueDamage {
                    player_id: controller,
                    damage,
                },
            });
        }
        EffectOutcome::ok()
    }

    fn root(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(EffectTarget::Unit { unit_id }) = target else {
            return EffectOutcome::fail("Root needs a unit target");
        };
        let Some(position) = state.unit(*unit_id).map(|unit| unit.position) else {
            return EffectOutcome::fail("Target unit is gone");
        };
        if effect.requires_yar() && !state.is_in_yar(position, source.controller()) {
            return EffectOutcome::fail("Target not in YAR");
        }
        let duration = effect.value.unwrap_or(1).max(1);
        let buff_id = state.allocate_buff_id();
        if let Some(unit) = state.unit_mut(*unit_id) {
            unit.is_rooted = true;
            unit.root_duration = Some(duration);
            unit.buffs.push(Buff {
                id: buff_id,
                source: source.name().to_string(),
                attack: None,
                health: None,
                duration: Some(duration),
                kind: Some(ROOT_BUFF.to_string()),
            });
        }
        out.events.push(GameEvent::UnitRooted {
            unit_id: *unit_id,
            duration,
        });
        EffectOutcome::ok()
    }

    fn reduce_cost(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let archetype = match effect.filter.as_ref().and_then(|filter| filter.archetype.clone()) {
            Some(archetype) => archetype,
            None => {
                let fallback = state.config.fallback_reduction_archetype.clone();
                log::warn!("cost reduction names no archetype, using {fallback}");
                fallback
            }
        };
        let reduction = effect.value.unwrap_or(2).max(0) as u32;
        let controller = source.controller();
        let Some(player) = state.get_player_mut(controller) else {
            return EffectOutcome::fail("Controller not found");
        };
        player.add_cost_reduction(archetype.clone(), reduction);
        out.events.push(GameEvent::CostReductionApplied {
            player_id: controller,
            archetype,
            reduction,
        });
        EffectOutcome::ok()
    }

    /// Vertical direction a push from `source` moves `target_pos`: away from
    /// the source, or the caster's forward direction when they share a row.
    fn push_direction(state: &GameState, source_pos: Position, target_pos: Position, caster: PlayerId) -> i32 {
        match source_pos.row.cmp(&target_pos.row) {
            std::cmp::Ordering::Less => 1,
            std::cmp::Ordering::Greater => -1,
            std::cmp::Ordering::Equal => state.forward(caster),
        }
    }

    /// Moves `unit_id` up to `distance` single rows in `direction`, stopping
    /// at the first blocked tile. Returns the steps taken.
    fn step_unit(
        state: &mut GameState,
        unit_id: UnitId,
        direction: i32,
        distance: i32,
        out: &mut EffectResolution,
        report_moves: bool,
    ) -> i32 {
        let mut moved = 0;
        for _ in 0..distance {
            let Some(current) = state.unit(unit_id).map(|unit| unit.position) else {
                break;
            };
            let next = current.offset(direction, 0);
            if !state.board.is_empty(next) {
                break;
            }
            match state.move_unit_forced(unit_id, next) {
                Some(from) => {
                    moved += 1;
                    if report_moves {
                        out.events.push(GameEvent::UnitMoved {
                            unit_id,
                            from,
                            to: next,
                            forced: true,
                        });
                    }
                }
                None => break,
            }
        }
        moved
    }

    /// A unit forced onto its opponent's spawn row wins the match for its
    /// controller, exactly as if it had advanced there.
    fn check_forced_arrival(state: &mut GameState, unit_id: UnitId, out: &mut EffectResolution) {
        let Some(unit) = state.unit(unit_id) else {
            return;
        };
        let (owner, row) = (unit.player_id, unit.position.row);
        if row != state.enemy_spawn_row(owner) {
            return;
        }
        log::info!("unit {unit_id} was forced onto the enemy spawn row");
        let reason = VictoryReason::ReachedSpawn { unit_id };
        if state.declare_victory(owner, reason.clone()) {
            out.events.push(GameEvent::GameEnded {
                winner: owner,
                reason,
            });
        }
    }

    fn push(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let (Some(source_pos), Some(EffectTarget::Unit { unit_id })) = (source.position(state), target) else {
            return EffectOutcome::fail("Invalid push configuration");
        };
        let Some(target_pos) = state.unit(*unit_id).map(|unit| unit.position) else {
            return EffectOutcome::fail("Target unit is gone");
        };
        let direction = Self::push_direction(state, source_pos, target_pos, source.controller());
        let requested = effect.value.unwrap_or(1).max(1);
        let moved = Self::step_unit(state, *unit_id, direction, requested, out, false);
        if moved == 0 {
            return EffectOutcome::fail("Could not push unit").with_amount(0, "Could not push unit");
        }
        let to = target_pos.offset(direction * moved, 0);
        out.events.push(GameEvent::UnitPushed {
            unit_id: *unit_id,
            distance: moved,
            to,
        });
        Self::check_forced_arrival(state, *unit_id, out);
        EffectOutcome::ok().with_amount(moved, format!("Pushed {moved} spaces"))
    }

    fn pull(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        effect: &CardEffect,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(EffectTarget::Unit { unit_id }) = target else {
            return EffectOutcome::fail("Pull needs a unit target");
        };
        let Some(target_pos) = state.unit(*unit_id).map(|unit| unit.position) else {
            return EffectOutcome::fail("Target unit is gone");
        };
        let source_pos = source.position(state).unwrap_or(target_pos);
        let direction = -Self::push_direction(state, source_pos, target_pos, source.controller());
        let requested = effect.value.unwrap_or(1).max(1);
        let moved = Self::step_unit(state, *unit_id, direction, requested, out, true);
        if moved == 0 {
            return EffectOutcome::fail("Could not pull unit").with_amount(0, "Could not pull unit");
        }
        out.events.push(GameEvent::UnitPulled {
            unit_id: *unit_id,
            distance: moved,
            to: target_pos.offset(direction * moved, 0),
        });
        Self::check_forced_arrival(state, *unit_id, out);
        EffectOutcome::ok().with_amount(moved, format!("Pulled {moved} spaces"))
    }

    fn teleport(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let (Some(source_pos), Some(EffectTarget::Unit { unit_id })) = (source.position(state), target) else {
            return EffectOutcome::fail("Teleport needs a unit source and target");
        };
        let destination = source_pos.offset(state.forward(source.controller()), 0);
        if !state.board.is_empty(destination) {
            return EffectOutcome::fail("Invalid teleport destination");
        }
        let Some(from) = state.move_unit_forced(*unit_id, destination) else {
            return EffectOutcome::fail("Target unit is gone");
        };
        out.events.push(GameEvent::UnitTeleported {
            unit_id: *unit_id,
            from,
            to: destination,
        });
        Self::check_forced_arrival(state, *unit_id, out);
        EffectOutcome::ok()
    }

    fn discard(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(EffectTarget::Card { card_id }) = target else {
            return EffectOutcome::fail("Discard needs a card target");
        };
        let controller = source.controller();
        let Some(player) = state.get_player_mut(controller) else {
            return EffectOutcome::fail("Controller not found");
        };
        let Some(index) = player.find_card_in_hand_index(card_id) else {
            return EffectOutcome::fail("Card not in hand");
        };
        let card = player.hand.remove(index);
        player.graveyard.push(card);
        out.events.push(GameEvent::CardDiscarded {
            player_id: controller,
            card_id: card_id.clone(),
        });
        EffectOutcome::ok()
    }

    fn return_to_hand(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        targets: &[EffectTarget],
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let controller = source.controller();
        let Some(player) = state.get_player_mut(controller) else {
            return EffectOutcome::fail("Controller not found");
        };
        let mut returned = 0;
        for target in targets {
            if player.is_hand_full() {
                break;
            }
            let EffectTarget::Card { card_id } = target else {
                continue;
            };
            if let Some(index) = player.find_card_in_graveyard_index(card_id) {
                let card = player.graveyard.remove(index);
                player.hand.push(card);
                returned += 1;
                out.events.push(GameEvent::CardReturnedToHand {
                    player_id: controller,
                    card_id: card_id.clone(),
                });
            }
        }
        let message = format!("Returned {returned} cards to hand");
        let outcome = if returned > 0 {
            EffectOutcome::ok()
        } else {
            EffectOutcome::fail(message.clone())
        };
        outcome.with_amount(returned, message)
    }

    fn resurrect(
        &mut self,
        state: &mut GameState,
        source: &EffectSource,
        target: Option<&EffectTarget>,
        out: &mut EffectResolution,
    ) -> EffectOutcome {
        let Some(EffectTarget::Card { card_id }) = target else {
            return EffectOutcome::fail("Resurrect needs a card target");
        };
        let controller = source.controller();
        let spawn_positions = state.valid_spawn_positions(controller);
        if spawn_positions.is_empty() {
            return EffectOutcome::fail("No valid spawn positions");
        }
        let Some(player) = state.get_player_mut(controller) else {
            return EffectOutcome::fail("Controller not found");
        };
        let Some(index) = player
            .graveyard
            .iter()
            .position(|card| card.id == *card_id && card.card_type == CardType::Unit)
        else {
            return EffectOutcome::fail("Card not in graveyard");
        };
        let card = player.graveyard.remove(index);
        let position = spawn_positions[self.rng.gen_range(0..spawn_positions.len())];
        let Some(unit_id) = state.spawn_unit(&card, controller, position) else {
            return EffectOutcome::fail("Spawn tile unavailable");
        };
        out.events.push(GameEvent::UnitCreated {
            player_id: controller,
            unit_id,
            position,
        });
        out.events.push(GameEvent::UnitResurrected {
            player_id: controller,
            unit_id,
            card_id: card.id,
        });
        EffectOutcome::ok()
    }
}

fn within<T: PartialOrd>(value: T, min: Option<T>, max: Option<T>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

fn in_area(area: EffectArea, origin: Position, pos: Position) -> bool {
    match area {
        EffectArea::Single | EffectArea::All => true,
        EffectArea::Adjacent => {
            pos != origin && (pos.row - origin.row).abs() <= 1 && (pos.col - origin.col).abs() <= 1
        }
        EffectArea::Row => pos.row == origin.row,
        EffectArea::Column => pos.col == origin.col,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::cards::CardCatalog;
    use crate::game::config::GameConfig;
    use crate::game::player::Player;
    use rand::rngs::SmallRng;

    fn state() -> GameState {
        let config = GameConfig::seeded(3);
        let mut rng = SmallRng::seed_from_u64(3);
        let players = vec![
            Player::new(1, "Player 1", Vec::new(), &config, &mut rng),
            Player::new(2, "Player 2", Vec::new(), &config, &mut rng),
        ];
        GameState::new(config, players)
    }

    fn spawn(state: &mut GameState, card: &Card, owner: PlayerId, row: i32, col: i32) -> UnitId {
        state
            .spawn_unit(card, owner, Position::new(row, col))
            .expect("tile should be free")
    }

    fn unit_source(state: &GameState, unit_id: UnitId) -> EffectSource {
        EffectSource::Unit {
            unit: state.unit(unit_id).cloned().expect("source unit should exist"),
        }
    }

    fn effect(action: EffectAction, target: TargetSelector, value: i32) -> CardEffect {
        CardEffect::new(EffectTrigger::Warshout, target)
            .with_action(action)
            .with_value(value)
    }

    #[test]
    fn heal_never_exceeds_max_health() {
        let mut state = state();
        let healer = spawn(&mut state, &Card::unit("cleric", "Cleric", 2, 1, 2), 1, 4, 0);
        let hurt = spawn(&mut state, &Card::unit("guard", "Guard", 3, 2, 5), 1, 4, 1);
        state.unit_mut(hurt).expect("unit").health = 2;

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, healer);
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Heal, TargetSelector::Ally, 5),
            &[EffectTarget::unit(hurt)],
        );

        assert!(resolution.outcome.success);
        assert_eq!(state.unit(hurt).map(|unit| unit.health), Some(5));
        assert!(resolution.events.contains(&GameEvent::HealingDone {
            target: EffectTarget::unit(hurt),
            amount: 3,
        }));
    }

    #[test]
    fn push_stops_at_first_blocked_tile() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let pusher = spawn(&mut state, &kriper, 1, 3, 3);
        let pushed = spawn(&mut state, &kriper, 2, 2, 3);
        spawn(&mut state, &kriper, 2, 0, 3);

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, pusher);
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Push, TargetSelector::Enemy, 3),
            &[EffectTarget::unit(pushed)],
        );

        assert!(resolution.outcome.success);
        assert_eq!(resolution.outcome.amount, Some(1));
        assert_eq!(state.unit(pushed).map(|unit| unit.position), Some(Position::new(1, 3)));
        assert!(state.integrity_check().is_ok());
        assert!(!state.game_over);
    }

    #[test]
    fn push_onto_enemy_spawn_row_wins_for_the_moved_unit() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let pusher = spawn(&mut state, &kriper, 1, 2, 1);
        let pushed = spawn(&mut state, &kriper, 2, 3, 1);

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, pusher);
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Push, TargetSelector::Enemy, 1),
            &[EffectTarget::unit(pushed)],
        );

        assert!(resolution.outcome.success);
        assert_eq!(state.winner(), Some(2));
        assert!(resolution
            .events
            .iter()
            .any(|event| matches!(event, GameEvent::GameEnded { winner: 2, .. })));
    }

    #[test]
    fn pull_drags_target_toward_source_until_blocked() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let puller = spawn(&mut state, &kriper, 1, 3, 3);
        let pulled = spawn(&mut state, &kriper, 2, 0, 3);

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, puller);
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Pull, TargetSelector::Enemy, 3),
            &[EffectTarget::unit(pulled)],
        );

        assert!(resolution.outcome.success);
        assert_eq!(resolution.outcome.amount, Some(2));
        assert_eq!(
            resolution.events,
            vec![
                GameEvent::UnitMoved {
                    unit_id: pulled,
                    from: Position::new(0, 3),
                    to: Position::new(1, 3),
                    forced: true,
                },
                GameEvent::UnitMoved {
                    unit_id: pulled,
                    from: Position::new(1, 3),
                    to: Position::new(2, 3),
                    forced: true,
                },
                GameEvent::UnitPulled {
                    unit_id: pulled,
                    distance: 2,
                    to: Position::new(2, 3),
                },
            ]
        );
        assert_eq!(state.unit(pulled).map(|unit| unit.position), Some(Position::new(2, 3)));
        assert!(state.integrity_check().is_ok());

        let stuck = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Pull, TargetSelector::Enemy, 1),
            &[EffectTarget::unit(pulled)],
        );
        assert!(!stuck.outcome.success);
        assert_eq!(stuck.outcome.amount, Some(0));
    }

    #[test]
    fn teleport_lands_one_step_ahead_of_source() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let caster = spawn(&mut state, &kriper, 1, 3, 1);
        let target = spawn(&mut state, &kriper, 2, 0, 5);
        let teleport = effect(EffectAction::Teleport, TargetSelector::Enemy, 1);

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, caster);
        let resolution =
            engine.execute_effect_action(&mut state, &source, &teleport, &[EffectTarget::unit(target)]);

        assert!(resolution.outcome.success);
        assert_eq!(
            resolution.events,
            vec![GameEvent::UnitTeleported {
                unit_id: target,
                from: Position::new(0, 5),
                to: Position::new(2, 1),
            }]
        );
        assert!(state.board.is_empty(Position::new(0, 5)));

        let blocked =
            engine.execute_effect_action(&mut state, &source, &teleport, &[EffectTarget::unit(target)]);
        assert_eq!(blocked.outcome.message.as_deref(), Some("Invalid teleport destination"));

        let spell = EffectSource::Card {
            card: Card::spell("blink", "Blink", 1),
            controller: 1,
        };
        let no_origin =
            engine.execute_effect_action(&mut state, &spell, &teleport, &[EffectTarget::unit(target)]);
        assert!(!no_origin.outcome.success);
        assert_eq!(state.unit(target).map(|unit| unit.position), Some(Position::new(2, 1)));
    }

    #[test]
    fn return_to_hand_stops_once_the_hand_is_full() {
        let mut state = state();
        let player = &mut state.players[0];
        player.hand_limit = 2;
        player.hand = vec![Card::spell("held", "Held", 1)];
        player.graveyard = ["a", "b", "c"]
            .into_iter()
            .map(|id| Card::unit(id, id, 1, 1, 1))
            .collect();
        let source = EffectSource::Card {
            card: Card::spell("recall", "Recall", 2),
            controller: 1,
        };
        let recall = effect(EffectAction::ReturnToHand, TargetSelector::Ally, 3);
        let targets = [EffectTarget::card("a"), EffectTarget::card("b"), EffectTarget::card("c")];

        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.execute_effect_action(&mut state, &source, &recall, &targets);
        assert!(resolution.outcome.success);
        assert_eq!(resolution.outcome.amount, Some(1));
        assert_eq!(
            resolution.events,
            vec![GameEvent::CardReturnedToHand {
                player_id: 1,
                card_id: "a".into(),
            }]
        );
        let ids: Vec<&str> = state.players[0].graveyard.iter().map(|card| card.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        let full = engine.execute_effect_action(&mut state, &source, &recall, &targets[1..]);
        assert!(!full.outcome.success);
        assert_eq!(full.outcome.message.as_deref(), Some("Returned 0 cards to hand"));
        assert_eq!(state.players[0].graveyard.len(), 2);
    }

    #[test]
    fn draw_burns_on_full_hand_and_fatigues_on_empty_deck() {
        let mut state = state();
        let player = &mut state.players[0];
        player.hand_limit = 1;
        player.deck = vec![Card::unit("a", "A", 1, 1, 1), Card::unit("b", "B", 1, 1, 1)];
        let health = player.health;
        let source = EffectSource::Card {
            card: Card::spell("insight", "Insight", 1),
            controller: 1,
        };

        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Draw, TargetSelector::SelfUnit, 3),
            &[],
        );

        assert!(resolution.outcome.success);
        assert_eq!(
            resolution.events,
            vec![
                GameEvent::CardDrawn {
                    player_id: 1,
                    card_id: "a".into(),
                },
                GameEvent::CardBurned {
                    player_id: 1,
                    card_id: "b".into(),
                },
                GameEvent::FatigueDamage {
                    player_id: 1,
                    damage: 1,
                },
            ]
        );
        let player = &state.players[0];
        assert_eq!(player.hand.len(), 1);
        assert_eq!(player.graveyard.len(), 1);
        assert_eq!(player.health, health - 1);
        assert_eq!(player.fatigue_damage, 2);
    }

    #[test]
    fn discard_of_card_not_in_hand_fails_without_changes() {
        let mut state = state();
        let before = state.clone();
        let source = EffectSource::Card {
            card: Card::spell("purge", "Purge", 1),
            controller: 1,
        };
        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.execute_effect_action(
            &mut state,
            &source,
            &effect(EffectAction::Discard, TargetSelector::Any, 1),
            &[EffectTarget::card("titan")],
        );

        assert!(!resolution.outcome.success);
        assert_eq!(resolution.outcome.message.as_deref(), Some("Card not in hand"));
        assert!(resolution.events.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn root_requires_target_inside_yar() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let caster = spawn(&mut state, &kriper, 1, 4, 0);
        let far = spawn(&mut state, &kriper, 2, 1, 2);
        let near = spawn(&mut state, &kriper, 2, 3, 4);

        let mut engine = EffectEngine::new(Some(1));
        let source = unit_source(&state, caster);
        let root = effect(EffectAction::Root, TargetSelector::Enemy, 2).in_yar();

        let miss = engine.execute_effect_action(&mut state, &source, &root, &[EffectTarget::unit(far)]);
        assert!(!miss.outcome.success);
        assert_eq!(miss.outcome.message.as_deref(), Some("Target not in YAR"));

        let hit = engine.execute_effect_action(&mut state, &source, &root, &[EffectTarget::unit(near)]);
        assert!(hit.outcome.success);
        let rooted = state.unit(near).expect("unit");
        assert!(rooted.is_rooted);
        assert_eq!(rooted.root_duration, Some(2));
        assert!(rooted.buffs.iter().any(|buff| buff.kind.as_deref() == Some(ROOT_BUFF)));
    }

    #[test]
    fn roots_count_down_on_every_advance_phase() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let short = spawn(&mut state, &kriper, 2, 1, 1);
        let long = spawn(&mut state, &kriper, 1, 3, 1);
        for (id, turns) in [(short, 1), (long, 2)] {
            let unit = state.unit_mut(id).expect("unit");
            unit.is_rooted = true;
            unit.root_duration = Some(turns);
        }
        let mut engine = EffectEngine::new(Some(1));

        let first = engine.on_advance_phase(&mut state);
        assert_eq!(first.events, vec![GameEvent::RootExpired { unit_id: short }]);
        assert!(!state.unit(short).expect("unit").is_rooted);
        assert_eq!(state.unit(long).and_then(|unit| unit.root_duration), Some(1));

        let second = engine.on_advance_phase(&mut state);
        assert_eq!(second.events, vec![GameEvent::RootExpired { unit_id: long }]);
        let unit = state.unit(long).expect("unit");
        assert!(!unit.is_rooted);
        assert_eq!(unit.root_duration, None);
    }

    #[test]
    fn warshout_buff_with_all_area_hits_every_other_ally() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        let a = spawn(&mut state, &kriper, 1, 4, 0);
        let b = spawn(&mut state, &kriper, 1, 3, 5);
        let enemy = spawn(&mut state, &kriper, 2, 0, 0);
        let chief = spawn(&mut state, &base_card("warchief"), 1, 4, 3);

        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.on_unit_played(&mut state, chief);

        assert!(resolution.outcome.success);
        for ally in [a, b] {
            let unit = state.unit(ally).expect("ally");
            assert_eq!((unit.attack, unit.health, unit.max_health), (2, 2, 2));
        }
        assert_eq!(state.unit(chief).map(|unit| unit.attack), Some(3));
        assert_eq!(state.unit(enemy).map(|unit| unit.attack), Some(1));
    }

    fn base_card(id: &str) -> Card {
        CardCatalog::base().get(id).cloned().expect("base card should exist")
    }

    #[test]
    fn interactive_warshout_requests_targeting() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        spawn(&mut state, &kriper, 2, 0, 2);
        let sniper = Card::unit("sniper", "Sniper", 2, 1, 1).with_effect(
            effect(EffectAction::Damage, TargetSelector::Enemy, 2).interactive(),
        );
        let unit = spawn(&mut state, &sniper, 1, 4, 2);

        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.on_unit_played(&mut state, unit);
        assert_eq!(resolution.targeting_requests.len(), 1);
        assert!(resolution.events.is_empty(), "nothing resolves before a target is chosen");
    }

    #[test]
    fn strike_damage_reports_casualty_with_killer() {
        let mut state = state();
        let attacker = spawn(&mut state, &base_card("berserker"), 1, 3, 2);
        let defender = spawn(&mut state, &Card::unit("kriper", "Kriper", 1, 1, 1), 2, 2, 2);

        let mut engine = EffectEngine::new(Some(1));
        let resolution = engine.on_attack(&mut state, attacker, defender);
        assert_eq!(
            resolution.casualties,
            vec![Casualty {
                unit_id: defender,
                killer: Some(attacker),
            }]
        );
        assert!(state.unit(defender).is_some(), "removal is left to the caller");
    }

    #[test]
    fn valid_targets_apply_filter_and_selector() {
        let mut state = state();
        let small = spawn(&mut state, &Card::unit("kriper", "Kriper", 1, 1, 1), 2, 0, 0);
        spawn(&mut state, &Card::unit("titan", "Titan", 6, 6, 6), 2, 0, 1);
        spawn(&mut state, &Card::unit("kriper", "Kriper", 1, 1, 1), 1, 4, 0);

        let engine = EffectEngine::new(Some(1));
        let source = EffectSource::Card {
            card: Card::spell("zap", "Zap", 1),
            controller: 1,
        };
        let filtered = effect(EffectAction::Damage, TargetSelector::Enemy, 1).with_filter(TargetFilter {
            max_health: Some(3),
            ..TargetFilter::default()
        });
        assert_eq!(
            engine.get_valid_targets(&state, &filtered, &source),
            vec![EffectTarget::unit(small)]
        );
        let everything = effect(EffectAction::Damage, TargetSelector::All, 1);
        assert_eq!(engine.get_valid_targets(&state, &everything, &source).len(), 3);
    }

    #[test]
    fn reduce_cost_without_archetype_uses_fallback() {
        let mut state = state();
        let source = EffectSource::Card {
            card: Card::spell("pact", "Pact", 0),
            controller: 2,
        };
        let mut engine = EffectEngine::new(Some(1));
        let reduce = CardEffect::new(EffectTrigger::Warshout, TargetSelector::SelfUnit)
            .with_action(EffectAction::ReduceCost);
        let resolution = engine.execute_effect_action(&mut state, &source, &reduce, &[]);

        assert!(resolution.outcome.success);
        let player = state.get_player(2).expect("player 2");
        assert_eq!(player.cost_reduction("DEMON"), 2);
    }

    #[test]
    fn unsupported_actions_fail() {
        let mut state = state();
        let source = EffectSource::Card {
            card: Card::spell("freeze", "Freeze", 1),
            controller: 1,
        };
        let mut engine = EffectEngine::new(Some(1));
        let stun = effect(EffectAction::Stun, TargetSelector::Enemy, 1);
        let resolution = engine.execute_effect_action(&mut state, &source, &stun, &[]);
        assert!(!resolution.outcome.success);
        assert!(state.effect_stack.is_empty());
    }

    #[test]
    fn resurrect_needs_a_free_spawn_tile() {
        let mut state = state();
        let kriper = Card::unit("kriper", "Kriper", 1, 1, 1);
        state.players[0].graveyard.push(kriper.clone());
        let source = EffectSource::Card {
            card: Card::spell("raise", "Raise", 3),
            controller: 1,
        };
        let raise = effect(EffectAction::Resurrect, TargetSelector::Ally, 1);
        let mut engine = EffectEngine::new(Some(1));

        let resolution =
            engine.execute_effect_action(&mut state, &source, &raise, &[EffectTarget::card("kriper")]);
        assert!(resolution.outcome.success);
        assert!(state.players[0].graveyard.is_empty());
        let raised = &state.players[0].units[0];
        assert_eq!(raised.position.row, 4);

        for col in 0..7 {
            let pos = Position::new(4, col);
            if state.board.is_empty(pos) {
                state.spawn_unit(&kriper, 1, pos);
            }
        }
        state.players[0].graveyard.push(kriper);
        let blocked =
            engine.execute_effect_action(&mut state, &source, &raise, &[EffectTarget::card("kriper")]);
        assert_eq!(blocked.outcome.message.as_deref(), Some("No valid spawn positions"));
        assert_eq!(state.players[0].graveyard.len(), 1);
    }
}
