//! Match rules: board, cards, players, effects and the turn state machine.

pub mod board;
pub mod cards;
pub mod config;
pub mod deck;
pub mod effects;
pub mod events;
pub mod history;
pub mod player;
pub mod rules;
pub mod state;

pub use board::{Board, Position};
pub use cards::{
    Card, CardCatalog, CardEffect, CardId, CardLocation, CardType, ControllerFilter, EffectAction,
    EffectArea, EffectTrigger, Rarity, TargetFilter, TargetSelector,
};
pub use config::GameConfig;
pub use deck::{build_deck, validate_deck, CustomDeck, DeckEntry, DeckPreset, DeckSource};
pub use effects::{
    Casualty, EffectEngine, EffectOutcome, EffectResolution, EffectSource, EffectTarget,
};
pub use events::{EventBus, EventRecord, GameEvent, SubscriptionId};
pub use history::History;
pub use player::{DrawResult, Player, PlayerId};
pub use rules::{AttackTarget, AutoStep, RuleEngine, RuleError, RuleResolution};
pub use state::{
    Buff, EffectExecution, GamePhase, GameState, IntegrityError, PendingAction, TargetingMode,
    Unit, UnitId, VictoryReason, VictoryState,
};
