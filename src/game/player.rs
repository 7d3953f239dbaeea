use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cards::Card;
use super::config::GameConfig;
use super::state::Unit;

/// Player identifier. The first player is `1`, the second `2`.
pub type PlayerId = u8;

/// What happened when a player tried to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawResult {
    Drawn(Card),
    /// Hand was full; the card went straight to the graveyard.
    Burned(Card),
    /// Deck was empty; the player took this much damage.
    Fatigue(i32),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub deck_name: String,
    pub health: i32,
    pub max_health: i32,
    pub mana: u32,
    pub max_mana: u32,
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub graveyard: Vec<Card>,
    pub turn_count: u32,
    pub fatigue_damage: i32,
    pub hand_limit: usize,
    pub mana_cap: u32,
    #[serde(default)]
    pub cost_reductions: BTreeMap<String, u32>,
    #[serde(default)]
    pub status_effects: BTreeMap<String, Value>,
}

impl Player {
    /// Creates a player with `deck` shuffled by `rng`.
    pub fn new<R: Rng + ?Sized>(
        id: PlayerId,
        name: impl Into<String>,
        mut deck: Vec<Card>,
        config: &GameConfig,
        rng: &mut R,
    ) -> Self {
        deck.shuffle(rng);
        Self {
            id,
            name: name.into(),
            deck_name: String::new(),
            health: config.starting_health,
            max_health: config.starting_health,
            mana: 0,
            max_mana: 0,
            deck,
            hand: Vec::new(),
            units: Vec::new(),
            graveyard: Vec::new(),
            turn_count: 0,
            fatigue_damage: 1,
            hand_limit: config.max_hand_size,
            mana_cap: config.max_mana,
            cost_reductions: BTreeMap::new(),
            status_effects: BTreeMap::new(),
        }
    }

    pub fn with_deck_name(mut self, deck_name: impl Into<String>) -> Self {
        self.deck_name = deck_name.into();
        self
    }

    pub fn draw_card(&mut self) -> DrawResult {
        if self.deck.is_empty() {
            let damage = self.fatigue_damage;
            self.health -= damage;
            self.fatigue_damage += 1;
            return DrawResult::Fatigue(damage);
        }

        let card = self.deck.remove(0);
        if self.hand.len() >= self.hand_limit {
            self.graveyard.push(card.clone());
            DrawResult::Burned(card)
        } else {
            self.hand.push(card.clone());
            DrawResult::Drawn(card)
        }
    }

    /// Mana ramps with the player's own turn count, not the global turn.
    pub fn start_turn(&mut self) {
        self.turn_count += 1;
        self.max_mana = self.turn_count.min(self.mana_cap);
        self.mana = self.max_mana;
    }

    pub fn is_hand_full(&self) -> bool {
        self.hand.len() >= self.hand_limit
    }

    pub fn add_cost_reduction(&mut self, archetype: impl Into<String>, amount: u32) {
        *self.cost_reductions.entry(archetype.into()).or_insert(0) += amount;
    }

    pub fn cost_reduction(&self, archetype: &str) -> u32 {
        self.cost_reductions.get(archetype).copied().unwrap_or(0)
    }

    /// Drops the whole pending reduction, even when the card's cost floor
    /// at zero left part of it unused.
    pub fn use_cost_reduction(&mut self, archetype: &str) {
        self.cost_reductions.remove(archetype);
    }

    /// Cost of `card` after any pending reduction for its archetype.
    pub fn effective_cost(&self, card: &Card) -> u32 {
        card.cost.saturating_sub(self.cost_reduction(&card.archetype))
    }

    pub fn add_status_effect(&mut self, key: impl Into<String>, data: Value) {
        self.status_effects.insert(key.into(), data);
    }

    pub fn has_status_effect(&self, key: &str) -> bool {
        self.status_effects.contains_key(key)
    }

    pub fn status_effect(&self, key: &str) -> Option<&Value> {
        self.status_effects.get(key)
    }

    pub fn remove_status_effect(&mut self, key: &str) -> Option<Value> {
        self.status_effects.remove(key)
    }

    pub fn find_card_in_hand_index(&self, card_id: &str) -> Option<usize> {
        self.hand.iter().position(|card| card.id == card_id)
    }

    pub fn find_card_in_graveyard_index(&self, card_id: &str) -> Option<usize> {
        self.graveyard.iter().position(|card| card.id == card_id)
    }

    pub fn reset_attacks(&mut self) {
        for unit in &mut self.units {
            unit.has_attacked = false;
            unit.advances_this_turn = 0;
        }
    }
}
