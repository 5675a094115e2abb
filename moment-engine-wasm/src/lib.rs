//! WASM bindings for moment-engine: drive a session orchestrator from a
//! browser renderer over JSON.

use wasm_bindgen::prelude::*;

use moment_engine::core::config::EngineConfig;
use moment_engine::core::orchestrator::SessionOrchestrator;
use moment_engine::core::phase::SessionTemplate;
use moment_engine::schema::outcome::{ChoiceCandidate, OutcomeEvent};
use moment_engine::schema::session::SessionContext;

// ---------------------------------------------------------------------------
// Embedded configuration, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const STANDARD_SESSION: &str = include_str!("../../data/standard_session.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct OutcomeInput {
    class: String,
    #[serde(default)]
    metric_delta: f64,
    character_id: String,
    #[serde(default)]
    context_flags: Vec<String>,
}

#[derive(serde::Deserialize)]
struct SessionInput {
    session_index: u32,
    #[serde(default)]
    returning_player: bool,
    #[serde(default = "default_average")]
    average_recent_metric: f64,
}

fn default_average() -> f64 {
    50.0
}

#[derive(serde::Serialize)]
struct StatusInfo {
    elapsed_ms: u64,
    phase: &'static str,
    arc_state: &'static str,
    active_arc: Option<u64>,
    combo: u32,
}

fn parse_template(s: &str) -> Option<SessionTemplate> {
    match s.to_lowercase().as_str() {
        "standard" => Some(SessionTemplate::Standard),
        "fitness_habit" => Some(SessionTemplate::FitnessHabit),
        "social_experience" => Some(SessionTemplate::SocialExperience),
        _ => None,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

#[wasm_bindgen]
pub struct SessionHandle {
    engine: SessionOrchestrator,
}

#[wasm_bindgen]
impl SessionHandle {
    /// Create a session for the given template and jackpot seed.
    #[wasm_bindgen(constructor)]
    pub fn new(template: &str, seed: u64) -> Result<SessionHandle, JsError> {
        let template = parse_template(template)
            .ok_or_else(|| JsError::new(&format!("Unknown template: {template}")))?;
        let config = EngineConfig::parse_ron(data::STANDARD_SESSION)
            .map_err(|e| JsError::new(&format!("Config parse error: {e}")))?;

        let engine = SessionOrchestrator::builder()
            .config(config)
            .template(template)
            .seed(seed)
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

        Ok(SessionHandle { engine })
    }

    /// Feed an outcome. Returns the orchestrator result as JSON.
    ///
    /// Expected JSON shape:
    /// ```json
    /// {
    ///   "class": "best",
    ///   "metric_delta": 20,
    ///   "character_id": "maya",
    ///   "context_flags": ["late_chapter"]
    /// }
    /// ```
    pub fn on_outcome(&mut self, outcome_json: &str) -> Result<String, JsError> {
        let input: OutcomeInput = serde_json::from_str(outcome_json)
            .map_err(|e| JsError::new(&format!("Invalid outcome JSON: {e}")))?;
        let mut outcome = OutcomeEvent::parse(&input.class, input.metric_delta, input.character_id)
            .map_err(|e| JsError::new(&e.to_string()))?;
        for flag in &input.context_flags {
            outcome = outcome.with_flag(flag);
        }
        let result = self
            .engine
            .on_outcome(&outcome)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&result)
    }

    /// Score candidate choices. Takes a JSON array of
    /// `{"tone_tag": .., "character_id": ..}`; returns a JSON array of profiles.
    pub fn on_choice_presented(&self, candidates_json: &str) -> Result<String, JsError> {
        let candidates: Vec<ChoiceCandidate> = serde_json::from_str(candidates_json)
            .map_err(|e| JsError::new(&format!("Invalid candidates JSON: {e}")))?;
        let profiles = self
            .engine
            .on_choice_presented(&candidates)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&profiles)
    }

    /// Advance to `now_ms`; returns the due instructions as a JSON array.
    pub fn tick(&mut self, now_ms: f64) -> Result<String, JsError> {
        let instructions = self
            .engine
            .tick(now_ms)
            .map_err(|e| JsError::new(&e.to_string()))?;
        to_json(&instructions)
    }

    /// Cancel the running arc. Returns false if none was running.
    pub fn cancel_active(&mut self) -> bool {
        self.engine.cancel_active().is_some()
    }

    /// Start a new session from a JSON session context.
    pub fn start_session(&mut self, session_json: &str) -> Result<(), JsError> {
        let input: SessionInput = serde_json::from_str(session_json)
            .map_err(|e| JsError::new(&format!("Invalid session JSON: {e}")))?;
        self.engine.start_session(SessionContext::new(
            input.session_index,
            input.returning_player,
            input.average_recent_metric,
        ));
        Ok(())
    }

    /// Current clock, phase and arc state as JSON.
    pub fn status(&self) -> Result<String, JsError> {
        let info = StatusInfo {
            elapsed_ms: self.engine.elapsed_ms(),
            phase: self.engine.current_phase().name(),
            arc_state: self.engine.arc_state().name(),
            active_arc: self.engine.active_arc().map(|arc| arc.id.0),
            combo: self.engine.combo(),
        };
        to_json(&info)
    }

    /// Return JSON array of template identifiers.
    pub fn templates() -> String {
        serde_json::to_string(&["standard", "fitness_habit", "social_experience"])
            .unwrap_or_else(|_| "[]".to_string())
    }
}
