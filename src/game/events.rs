//! Typed event feed.
//!
//! Every state change the engine makes is announced as a [`GameEvent`]. Hosts
//! subscribe through [`EventBus`]; delivery is synchronous and in
//! subscription order.

use serde::{Deserialize, Serialize};

use super::board::Position;
use super::cards::CardId;
use super::effects::EffectTarget;
use super::player::PlayerId;
use super::state::{GamePhase, UnitId, VictoryReason};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    #[serde(rename_all = "camelCase")]
    GameStarted { first_player: PlayerId },
    PhaseChanged { phase: GamePhase },
    #[serde(rename_all = "camelCase")]
    SetupPhaseEntered {
        player_id: PlayerId,
        spawn_positions: Vec<Position>,
    },
    #[serde(rename_all = "camelCase")]
    StartingUnitPlaced {
        player_id: PlayerId,
        unit_id: UnitId,
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    UnitCreated {
        player_id: PlayerId,
        unit_id: UnitId,
        position: Position,
    },
    #[serde(rename_all = "camelCase")]
    UnitPlayed {
        player_id: PlayerId,
        unit_id: UnitId,
        card_id: CardId,
    },
    #[serde(rename_all = "camelCase")]
    SpellPlayed { player_id: PlayerId, card_id: CardId },
    #[serde(rename_all = "camelCase")]
    UnitAttacked {
        attacker_id: UnitId,
        target_id: UnitId,
        damage: i32,
    },
    #[serde(rename_all = "camelCase")]
    SpawnTileAttacked {
        attacker_id: UnitId,
        position: Position,
        target_player: PlayerId,
        damage: i32,
    },
    #[serde(rename_all = "camelCase")]
    UnitDied {
        unit_id: UnitId,
        player_id: PlayerId,
        card_id: CardId,
        #[serde(skip_serializing_if = "Option::is_none")]
        killer: Option<UnitId>,
    },
    #[serde(rename_all = "camelCase")]
    UnitAdvanced {
        unit_id: UnitId,
        from: Position,
        to: Position,
    },
    #[serde(rename_all = "camelCase")]
    UnitMoved {
        unit_id: UnitId,
        from: Position,
        to: Position,
        forced: bool,
    },
    #[serde(rename_all = "camelCase")]
    UnitPushed {
        unit_id: UnitId,
        distance: i32,
        to: Position,
    },
    #[serde(rename_all = "camelCase")]
    UnitPulled {
        unit_id: UnitId,
        distance: i32,
        to: Position,
    },
    #[serde(rename_all = "camelCase")]
    UnitTeleported {
        unit_id: UnitId,
        from: Position,
        to: Position,
    },
    #[serde(rename_all = "camelCase")]
    CardDrawn { player_id: PlayerId, card_id: CardId },
    #[serde(rename_all = "camelCase")]
    CardBurned { player_id: PlayerId, card_id: CardId },
    #[serde(rename_all = "camelCase")]
    FatigueDamage { player_id: PlayerId, damage: i32 },
    DamageDealt { target: EffectTarget, amount: i32 },
    HealingDone { target: EffectTarget, amount: i32 },
    #[serde(rename_all = "camelCase")]
    BuffApplied { unit_id: UnitId, amount: i32 },
    #[serde(rename_all = "camelCase")]
    UnitRooted { unit_id: UnitId, duration: i32 },
    #[serde(rename_all = "camelCase")]
    RootExpired { unit_id: UnitId },
    #[serde(rename_all = "camelCase")]
    CostReductionApplied {
        player_id: PlayerId,
        archetype: String,
        reduction: u32,
    },
    #[serde(rename_all = "camelCase")]
    CardDiscarded { player_id: PlayerId, card_id: CardId },
    #[serde(rename_all = "camelCase")]
    CardReturnedToHand { player_id: PlayerId, card_id: CardId },
    #[serde(rename_all = "camelCase")]
    UnitResurrected {
        player_id: PlayerId,
        unit_id: UnitId,
        card_id: CardId,
    },
    #[serde(rename_all = "camelCase")]
    PlayerDefeated { player_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    TargetingModeEntered {
        message: String,
        valid_targets: Vec<EffectTarget>,
    },
    TargetingModeExited,
    #[serde(rename_all = "camelCase")]
    TurnEnded { player_id: PlayerId, turn_number: u32 },
    GameEnded { winner: PlayerId, reason: VictoryReason },
}

impl GameEvent {
    /// Stable name of the variant, as used in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "gameStarted",
            GameEvent::PhaseChanged { .. } => "phaseChanged",
            GameEvent::SetupPhaseEntered { .. } => "setupPhaseEntered",
            GameEvent::StartingUnitPlaced { .. } => "startingUnitPlaced",
            GameEvent::UnitCreated { .. } => "unitCreated",
            GameEvent::UnitPlayed { .. } => "unitPlayed",
            GameEvent::SpellPlayed { .. } => "spellPlayed",
            GameEvent::UnitAttacked { .. } => "unitAttacked",
            GameEvent::SpawnTileAttacked { .. } => "spawnTileAttacked",
            GameEvent::UnitDied { .. } => "unitDied",
            GameEvent::UnitAdvanced { .. } => "unitAdvanced",
            GameEvent::UnitMoved { .. } => "unitMoved",
            GameEvent::UnitPushed { .. } => "unitPushed",
            GameEvent::UnitPulled { .. } => "unitPulled",
            GameEvent::UnitTeleported { .. } => "unitTeleported",
            GameEvent::CardDrawn { .. } => "cardDrawn",
            GameEvent::CardBurned { .. } => "cardBurned",
            GameEvent::FatigueDamage { .. } => "fatigueDamage",
            GameEvent::DamageDealt { .. } => "damageDealt",
            GameEvent::HealingDone { .. } => "healingDone",
            GameEvent::BuffApplied { .. } => "buffApplied",
            GameEvent::UnitRooted { .. } => "unitRooted",
            GameEvent::RootExpired { .. } => "rootExpired",
            GameEvent::CostReductionApplied { .. } => "costReductionApplied",
            GameEvent::CardDiscarded { .. } => "cardDiscarded",
            GameEvent::CardReturnedToHand { .. } => "cardReturnedToHand",
            GameEvent::UnitResurrected { .. } => "unitResurrected",
            GameEvent::PlayerDefeated { .. } => "playerDefeated",
            GameEvent::TargetingModeEntered { .. } => "targetingModeEntered",
            GameEvent::TargetingModeExited => "targetingModeExited",
            GameEvent::TurnEnded { .. } => "turnEnded",
            GameEvent::GameEnded { .. } => "gameEnded",
        }
    }
}

/// An event as delivered to subscribers: the acting player and a
/// millisecond timestamp wrapped around the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub acting_player: PlayerId,
    pub timestamp: f64,
    #[serde(flatten)]
    pub event: GameEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EventRecord)>;

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&EventRecord) + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn publish(&mut self, record: &EventRecord) {
        for (_, listener) in &mut self.listeners {
            listener(record);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
