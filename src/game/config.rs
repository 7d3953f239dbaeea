use serde::{Deserialize, Serialize};

/// Archetype credited by REDUCE_COST effects that name none. Carried over
/// from an older archetype set; hosts can override it per game.
pub const FALLBACK_REDUCTION_ARCHETYPE: &str = "DEMON";

/// Tunables for one match. Every field has a default so hosts can send a
/// partial JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub board_rows: i32,
    pub board_cols: i32,
    pub starting_health: i32,
    pub starting_hand_size: usize,
    pub max_hand_size: usize,
    pub max_mana: u32,
    /// Rows, counted from a player's own spawn edge, that form their area of
    /// ruling.
    pub yar_range: i32,
    pub history_limit: usize,
    pub min_deck_size: usize,
    pub max_deck_size: usize,
    /// Nested trigger depth after which further chained effects are dropped.
    pub max_effect_depth: usize,
    /// Card placed for free during each player's setup.
    pub starting_unit_card: String,
    pub fallback_reduction_archetype: String,
    pub draw_on_first_turn: bool,
    /// Drain DRAW/ADVANCE inside the command that schedules them. Animated
    /// hosts turn this off and step the phases themselves.
    pub auto_resolve_phases: bool,
    pub rng_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            board_rows: 5,
            board_cols: 7,
            starting_health: 30,
            starting_hand_size: 3,
            max_hand_size: 7,
            max_mana: 10,
            yar_range: 2,
            history_limit: 50,
            min_deck_size: 20,
            max_deck_size: 30,
            max_effect_depth: 10,
            starting_unit_card: "kriper".into(),
            fallback_reduction_archetype: FALLBACK_REDUCTION_ARCHETYPE.into(),
            draw_on_first_turn: true,
            auto_resolve_phases: true,
            rng_seed: None,
        }
    }
}

impl GameConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng_seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn manual_phases(mut self) -> Self {
        self.auto_resolve_phases = false;
        self
    }
}
