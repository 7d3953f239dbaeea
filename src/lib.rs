pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::{Function, Promise};

pub use game::{
    AttackTarget, AutoStep, Board, Card, CardCatalog, CardEffect, CardId, CardType, DeckPreset,
    DeckSource, EffectAction, EffectEngine, EffectResolution, EffectSource, EffectTarget,
    EffectTrigger, EventBus, EventRecord, GameConfig, GameEvent, GamePhase, GameState,
    IntegrityError, Player, PlayerId, Position, RuleEngine, RuleError, RuleResolution,
    TargetSelector, Unit, UnitId, VictoryReason, VictoryState,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
    utils::init_logging(log::Level::Info);
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn to_js_error(error: RuleError) -> JsValue {
    to_js(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

/// `undefined` and `null` fall back to the default value.
fn from_optional<T: DeserializeOwned + Default>(value: JsValue) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    from_value(value).map_err(JsValue::from)
}

/// Collects engine events while a borrow is held and forwards them to JS
/// listeners once it is released, so listeners may call back into the engine.
#[derive(Clone, Default)]
struct EventRelay {
    outbox: Rc<RefCell<Vec<EventRecord>>>,
    listeners: Rc<RefCell<Vec<Function>>>,
}

impl EventRelay {
    fn attach(&self, engine: &mut RuleEngine) {
        let sink = Rc::clone(&self.outbox);
        engine.subscribe(move |record| sink.borrow_mut().push(record.clone()));
    }

    fn flush(&self) {
        let records: Vec<EventRecord> = self.outbox.borrow_mut().drain(..).collect();
        if records.is_empty() {
            return;
        }
        let listeners = self.listeners.borrow().clone();
        for record in &records {
            let value = match to_js(record) {
                Ok(value) => value,
                Err(error) => {
                    log::error!("failed to serialize {} event: {:?}", record.event.kind(), error);
                    continue;
                }
            };
            for listener in &listeners {
                if let Err(error) = listener.call1(&JsValue::NULL, &value) {
                    log::error!("event listener threw: {error:?}");
                }
            }
        }
    }
}

#[wasm_bindgen]
pub struct GameEngine {
    engine: Rc<RefCell<RuleEngine>>,
    relay: EventRelay,
}

#[wasm_bindgen]
impl GameEngine {
    /// `config`, `first_deck`, `second_deck` and `custom_cards` may all be
    /// omitted. Decks are `DeckSource` objects; custom cards join the base
    /// catalog.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        first_deck: JsValue,
        second_deck: JsValue,
        custom_cards: JsValue,
    ) -> Result<GameEngine, JsValue> {
        let config: GameConfig = from_optional(config)?;
        let first: DeckSource = from_optional(first_deck)?;
        let second: DeckSource = from_optional(second_deck)?;
        let custom: Vec<Card> = from_optional(custom_cards)?;
        let catalog = CardCatalog::with_custom(custom);

        let mut engine = RuleEngine::new(config, catalog, [first, second]);
        let relay = EventRelay::default();
        relay.attach(&mut engine);
        Ok(GameEngine {
            engine: Rc::new(RefCell::new(engine)),
            relay,
        })
    }

    /// Replaces the running match with a snapshot produced by `state_json`.
    pub fn load_state_json(&mut self, json: &str, custom_cards: JsValue) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        let custom: Vec<Card> = from_optional(custom_cards)?;
        let mut engine =
            RuleEngine::from_snapshot(state, CardCatalog::with_custom(custom)).map_err(to_js_error)?;
        self.relay.attach(&mut engine);
        *self.engine.borrow_mut() = engine;
        Ok(())
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.engine.borrow().state()).map_err(serde_to_js_error)
    }

    pub fn state(&self) -> Result<JsValue, JsValue> {
        to_js(self.engine.borrow().state())
    }

    pub fn current_player(&self) -> Result<JsValue, JsValue> {
        to_js(self.engine.borrow().current_player())
    }

    pub fn valid_spawn_positions(&self, player_id: PlayerId) -> Result<JsValue, JsValue> {
        to_js(&self.engine.borrow().valid_spawn_positions(player_id))
    }

    pub fn valid_attack_targets(&self, unit_id: UnitId) -> Result<JsValue, JsValue> {
        to_js(&self.engine.borrow().valid_attack_targets(unit_id))
    }

    pub fn history_len(&self) -> usize {
        self.engine.borrow().history().len()
    }

    pub fn has_pending_steps(&self) -> bool {
        self.engine.borrow().has_pending_steps()
    }

    /// Registers a listener called with every `EventRecord`.
    pub fn on_event(&self, listener: Function) {
        self.relay.listeners.borrow_mut().push(listener);
    }

    pub fn clear_event_listeners(&self) {
        self.relay.listeners.borrow_mut().clear();
    }

    pub fn start_game(&self) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.start_game())
    }

    pub fn place_starting_unit(&self, player_id: PlayerId, row: i32, col: i32) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.place_starting_unit(player_id, Position::new(row, col)))
    }

    pub fn play_card(&self, hand_index: usize, row: i32, col: i32) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.play_card(hand_index, Position::new(row, col)))
    }

    pub fn attack(&self, attacker_id: UnitId, target_id: UnitId) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.attack(attacker_id, target_id))
    }

    pub fn attack_spawn_tile(&self, attacker_id: UnitId, row: i32, col: i32) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.attack_spawn_tile(attacker_id, Position::new(row, col)))
    }

    pub fn advance_phase(&self) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.advance_phase())
    }

    pub fn move_unit(&self, unit_id: UnitId, row: i32, col: i32) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.move_unit(unit_id, Position::new(row, col)))
    }

    pub fn enter_targeting_mode(&self, source: JsValue, effect: JsValue) -> Result<JsValue, JsValue> {
        let source: EffectSource = from_value(source)?;
        let effect: CardEffect = from_value(effect)?;
        self.run(|engine| engine.enter_targeting_mode(source, effect))
    }

    pub fn resolve_targeting(&self, target: JsValue) -> Result<JsValue, JsValue> {
        let target: EffectTarget = from_value(target)?;
        self.run(|engine| engine.resolve_targeting(target))
    }

    pub fn exit_targeting_mode(&self) -> Result<JsValue, JsValue> {
        self.run(|engine| engine.exit_targeting_mode())
    }

    pub fn step_automatic(&self) -> Result<JsValue, JsValue> {
        self.run(|engine| Ok(engine.step_automatic()))
    }

    pub fn run_automatic_phases(&self) -> Result<JsValue, JsValue> {
        self.run(|engine| Ok(engine.run_automatic_phases()))
    }

    /// Runs pending DRAW/ADVANCE steps with a timer pause before each one.
    /// `speed` divides the default delays; 0 or less runs them back to back.
    pub fn animate_automatic_phases(&self, speed: Option<f64>) -> Promise {
        let engine = Rc::clone(&self.engine);
        let relay = self.relay.clone();
        let speed = speed.unwrap_or(1.0);

        future_to_promise(async move {
            let mut events = Vec::new();
            loop {
                let Some(step) = engine.borrow().pending_steps().next().copied() else {
                    break;
                };
                if speed > 0.0 {
                    let delay = (f64::from(step.default_delay_ms()) / speed) as u32;
                    if delay > 0 {
                        TimeoutFuture::new(delay).await;
                    }
                }
                let step_events = engine.borrow_mut().step_automatic();
                relay.flush();
                events.extend(step_events);
            }
            let resolution = RuleResolution::new(engine.borrow().state(), events);
            to_js(&resolution)
        })
    }

    fn run<F>(&self, command: F) -> Result<JsValue, JsValue>
    where
        F: FnOnce(&mut RuleEngine) -> Result<Vec<GameEvent>, RuleError>,
    {
        let result = {
            let mut engine = self.engine.borrow_mut();
            command(&mut *engine).map(|events| RuleResolution::new(engine.state(), events))
        };
        self.relay.flush();
        to_js(&result.map_err(to_js_error)?)
    }
}

#[wasm_bindgen(js_name = "baseCards")]
pub fn base_cards() -> Result<JsValue, JsValue> {
    let catalog = CardCatalog::base();
    to_js(&catalog.cards().collect::<Vec<_>>())
}

#[wasm_bindgen(js_name = "deckPresets")]
pub fn deck_presets() -> Result<JsValue, JsValue> {
    let presets: Vec<(&str, &str)> = DeckPreset::ALL
        .iter()
        .map(|preset| (preset.id(), preset.display_name()))
        .collect();
    to_js(&presets)
}

/// Deck-building legality check. Resolves to an array of messages, empty
/// when the deck is legal.
#[wasm_bindgen(js_name = "validateDeck")]
pub fn validate_deck(cards: JsValue, config: JsValue) -> Result<JsValue, JsValue> {
    let cards: Vec<Card> = from_value(cards)?;
    let config: GameConfig = from_optional(config)?;
    let errors = game::validate_deck(&cards, &config).err().unwrap_or_default();
    to_js(&errors)
}

#[wasm_bindgen(js_name = "validateCard")]
pub fn validate_card(card: JsValue) -> Result<JsValue, JsValue> {
    let card: Card = from_value(card)?;
    let errors = card.validate().err().unwrap_or_default();
    to_js(&errors)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))
}
