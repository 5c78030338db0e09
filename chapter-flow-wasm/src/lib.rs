//! WASM bindings for chapter-flow: powers the browser demo of the story.

use wasm_bindgen::prelude::*;

use chapter_flow::core::flow::{Action, Position, Step};
use chapter_flow::core::player::{FrameInput, PlayerConfig, StoryPlayer};
use chapter_flow::core::sink::{Effect, EffectLog, ManualClock};
use chapter_flow::schema::container::{Chapter, Story};

// ---------------------------------------------------------------------------
// Embedded chapters: compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const CHAPTERS: &[&str] = &[
        include_str!("../../chapters/demo/chapter1.ron"),
        include_str!("../../chapters/demo/chapter2.ron"),
    ];
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct FrameOutput<'a> {
    steps: Vec<Step>,
    effects: Vec<Effect>,
    position: Position,
    chapter: u32,
    node: Option<&'a str>,
    ended: bool,
    penalty_clicks: u32,
}

#[derive(serde::Serialize)]
struct ChapterInfo {
    number: u32,
    main_nodes: usize,
    click_branches: usize,
    forced_branches: usize,
    terminal_branches: usize,
}

fn parse_action(s: &str) -> Result<Action, JsError> {
    match s.to_lowercase().as_str() {
        "hold" | "hold_advance" => Ok(Action::HoldAdvance),
        "click" => Ok(Action::Click),
        other => Err(JsError::new(&format!("Unknown action: {other}"))),
    }
}

fn load_story() -> Result<Story, JsError> {
    let chapters = data::CHAPTERS
        .iter()
        .map(|src| Chapter::parse_ron(src))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| JsError::new(&format!("Chapter parse error: {e}")))?;
    Story::new(chapters).map_err(|e| JsError::new(&format!("Story error: {e}")))
}

// ---------------------------------------------------------------------------
// StoryDemo: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryDemo {
    player: StoryPlayer<EffectLog, EffectLog, ManualClock>,
    log: EffectLog,
    clock: ManualClock,
}

#[wasm_bindgen]
impl StoryDemo {
    /// Create a demo over the embedded chapters. `config_json` may be empty
    /// for the default player configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64, config_json: &str) -> Result<StoryDemo, JsError> {
        let config: PlayerConfig = if config_json.trim().is_empty() {
            PlayerConfig::default()
        } else {
            serde_json::from_str(config_json)
                .map_err(|e| JsError::new(&format!("Invalid config JSON: {e}")))?
        };

        let log = EffectLog::new();
        let clock = ManualClock::new(0);
        let player = StoryPlayer::builder()
            .seed(seed)
            .with_story(load_story()?)
            .config(config)
            .build(log.clone(), log.clone(), clock.clone())
            .map_err(|e| JsError::new(&format!("Player build error: {e}")))?;

        Ok(StoryDemo { player, log, clock })
    }

    /// Show the first node. Returns the frame output as JSON.
    pub fn start(&mut self) -> Result<String, JsError> {
        self.player.init();
        self.output(Vec::new())
    }

    /// Run one frame at time `now_ms`.
    ///
    /// Expected JSON shape (every field optional):
    /// ```json
    /// {
    ///   "hold_pressed": false,
    ///   "hold_released": false,
    ///   "cancel_hold": false,
    ///   "click": true,
    ///   "pointer_dx": 0.0,
    ///   "pointer_dy": 0.0
    /// }
    /// ```
    pub fn tick(&mut self, now_ms: u64, input_json: &str) -> Result<String, JsError> {
        let input: FrameInput = if input_json.trim().is_empty() {
            FrameInput::default()
        } else {
            serde_json::from_str(input_json)
                .map_err(|e| JsError::new(&format!("Invalid input JSON: {e}")))?
        };
        self.clock.set(now_ms);
        let steps = self.player.tick(&input);
        self.output(steps)
    }

    /// Apply `"hold"` or `"click"` directly, skipping the gesture gate.
    pub fn advance(&mut self, action: &str) -> Result<String, JsError> {
        let step = self.player.advance(parse_action(action)?);
        self.output(vec![step])
    }

    /// Name of the node `action` would lead to, or an empty string.
    pub fn peek(&self, action: &str) -> Result<String, JsError> {
        Ok(self
            .player
            .peek(parse_action(action)?)
            .map(|node| node.name.clone())
            .unwrap_or_default())
    }

    /// Jump to the next chapter. Returns false at the last chapter.
    pub fn next_chapter(&mut self) -> bool {
        self.player.activate_next_chapter()
    }

    /// Return a JSON array describing the embedded chapters.
    pub fn chapters(&self) -> Result<String, JsError> {
        let info: Vec<ChapterInfo> = self
            .player
            .story()
            .chapters()
            .iter()
            .map(|c| ChapterInfo {
                number: c.number,
                main_nodes: c.main_sequence.len(),
                click_branches: c.click_branches.len(),
                forced_branches: c.forced_branches.len(),
                terminal_branches: c.terminal_branches.len(),
            })
            .collect();
        serde_json::to_string(&info)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Start over with a new seed.
    pub fn reset(&mut self, seed: u64) -> Result<String, JsError> {
        let config = serde_json::to_string(self.player.config())
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))?;
        *self = StoryDemo::new(seed, &config)?;
        self.start()
    }
}

// Private helpers
impl StoryDemo {
    fn output(&self, steps: Vec<Step>) -> Result<String, JsError> {
        let out = FrameOutput {
            steps,
            effects: self.log.take(),
            position: self.player.position(),
            chapter: self.player.chapter().number,
            node: self.player.current_node().map(|n| n.name.as_str()),
            ended: self.player.is_ended(),
            penalty_clicks: self.player.total_penalty_clicks(),
        };
        serde_json::to_string(&out)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }
}
