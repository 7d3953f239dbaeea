#![cfg(target_arch = "wasm32")]

use lane_battler::{GameEngine, GameState, GamePhase};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn new_engine() -> GameEngine {
    GameEngine::new(
        JsValue::UNDEFINED,
        JsValue::UNDEFINED,
        JsValue::NULL,
        JsValue::UNDEFINED,
    )
    .expect("defaults should build a match")
}

fn state_of(engine: &GameEngine) -> GameState {
    let json = engine.state_json().expect("state should serialize");
    serde_json::from_str(&json).expect("state json should parse")
}

#[wasm_bindgen_test]
fn facade_runs_setup_and_automatic_phases() {
    let engine = new_engine();
    engine.start_game().expect("game should start");
    assert_eq!(state_of(&engine).phase, GamePhase::Setup);

    engine
        .place_starting_unit(1, 4, 2)
        .expect("spawn row placement should succeed");
    let state = state_of(&engine);
    assert_eq!(state.phase, GamePhase::Play);
    assert_eq!(state.players[0].units[0].position.row, 3);
}

#[wasm_bindgen_test]
fn facade_rejects_illegal_commands_with_tagged_errors() {
    let engine = new_engine();
    engine.start_game().expect("game should start");
    let error = engine.advance_phase().expect_err("setup must come first");
    let error: serde_json::Value =
        serde_wasm_bindgen::from_value(error).expect("error should be a tagged object");
    assert_eq!(error["type"], "SetupPending");
}

#[wasm_bindgen_test]
fn snapshot_reload_keeps_the_match() {
    let mut engine = new_engine();
    engine.start_game().expect("game should start");
    engine.place_starting_unit(1, 4, 0).expect("placement");
    let json = engine.state_json().expect("state should serialize");

    engine
        .load_state_json(&json, JsValue::UNDEFINED)
        .expect("snapshot should load");
    assert_eq!(state_of(&engine).players[0].units.len(), 1);
}
