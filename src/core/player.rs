/// The story player: feeds frame input through the gesture gate into the
/// flow controller and turns every transition into display, audio and
/// activation calls.
///
/// Built via `StoryPlayer::builder()`. The host calls [`StoryPlayer::init`]
/// once and [`StoryPlayer::tick`] every frame.

use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::flow::{Action, FlowController, Mode, Position, Step};
use crate::core::gate::{GateConfig, GateEvent, ProgressionGate};
use crate::core::reveal::{RevealConfig, RevealTick, TextFrame, TextReveal};
use crate::core::sink::{ActivationSink, Clock, DisplaySink, EffectLog, Indicator, ManualClock};
use crate::schema::container::{Chapter, ChapterError, PenaltyMapping, Slot, Story};
use crate::schema::node::{ContentNode, TargetId};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("chapter error: {0}")]
    Chapter(#[from] ChapterError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("no chapters to play")]
    NoChapters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub reveal: RevealConfig,
    pub gate: GateConfig,
    /// How long the hold-success indicator stays up after latching.
    pub hold_success_feedback_ms: u64,
    pub click_feedback_ms: u64,
    /// Shown when a chapter has no start node.
    pub no_start_message: String,
    /// Shown when a terminal branch runs out. Empty shows nothing.
    pub story_end_message: String,
    /// First chapter whose counted clicks add to the penalty total.
    pub penalty_from_chapter: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            reveal: RevealConfig::default(),
            gate: GateConfig::default(),
            hold_success_feedback_ms: 1000,
            click_feedback_ms: 500,
            no_start_message: "No start node found in the main sequence!".to_string(),
            story_end_message: String::new(),
            penalty_from_chapter: 1,
        }
    }
}

impl PlayerConfig {
    pub fn load_from_ron(path: &Path) -> Result<PlayerConfig, PlayerError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&contents)?)
    }
}

/// Input sampled for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameInput {
    /// Hold key went down this frame.
    pub hold_pressed: bool,
    /// Hold key went up this frame.
    pub hold_released: bool,
    /// Abort the running hold without advancing.
    pub cancel_hold: bool,
    pub click: bool,
    pub pointer_dx: f32,
    pub pointer_dy: f32,
}

pub struct StoryPlayer<D: DisplaySink, A: ActivationSink, C: Clock> {
    story: Story,
    chapter_index: usize,
    flow: FlowController,
    gate: ProgressionGate,
    reveal: TextReveal,
    config: PlayerConfig,
    display: D,
    activation: A,
    clock: C,
    /// Last state forwarded per target.
    target_states: FxHashMap<TargetId, bool>,
    /// Physical hold key state, independent of the gate.
    hold_down: bool,
    /// Text waiting for the hold key to come up.
    pending_reveal: Option<String>,
    typing: bool,
    hold_sound: bool,
    hold_success_until: Option<u64>,
    click_feedback_until: Option<u64>,
    clicks_in_chapter: u32,
    total_penalty_clicks: u32,
    /// Last penalty mapping whose threshold was hit.
    penalty: Option<PenaltyMapping>,
}

/// Builder for constructing a `StoryPlayer`.
pub struct StoryPlayerBuilder {
    chapters_dir: Option<String>,
    config_path: Option<String>,
    seed: u64,
    /// Directly provided chapters (for testing without files).
    chapters: Vec<Chapter>,
    story: Option<Story>,
    config: Option<PlayerConfig>,
}

// The sink types are picked again by `build`; these only anchor the call.
impl StoryPlayer<EffectLog, EffectLog, ManualClock> {
    pub fn builder() -> StoryPlayerBuilder {
        StoryPlayerBuilder {
            chapters_dir: None,
            config_path: None,
            seed: 0,
            chapters: Vec::new(),
            story: None,
            config: None,
        }
    }
}

impl<D: DisplaySink, A: ActivationSink, C: Clock> StoryPlayer<D, A, C> {
    /// Start the first chapter from its first main-sequence node.
    pub fn init(&mut self) -> Option<Slot> {
        self.chapter_index = 0;
        self.total_penalty_clicks = 0;
        self.penalty = None;
        if let Some(chapter) = self.story.get(0) {
            self.flow = FlowController::new(chapter.clone());
        }
        self.start_chapter()
    }

    /// Process one frame of input and advance timers.
    pub fn tick(&mut self, input: &FrameInput) -> Vec<Step> {
        let now = self.clock.now_ms();
        let mut steps = Vec::new();

        if !self.flow.is_input_disabled() {
            self.handle_hold(input, now, &mut steps);
        }
        // After a chapter switch earlier in this frame the click lands on a
        // disabled flow and is ignored.
        if input.click {
            if self.gate.is_holding() {
                debug!("click while holding, hold dropped");
                self.gate.cancel();
                self.stop_hold_feedback();
            }
            steps.push(self.apply(Action::Click, now));
        }
        self.finish_switch();

        if !self.hold_down {
            if let Some(text) = self.pending_reveal.take() {
                self.begin_reveal(&text, now);
            }
        }

        self.tick_reveal(now);
        self.expire_feedback(now);
        steps
    }

    fn handle_hold(&mut self, input: &FrameInput, now: u64, steps: &mut Vec<Step>) {
        if input.cancel_hold && self.gate.is_holding() {
            debug!("hold cancelled");
            self.gate.cancel();
            self.stop_hold_feedback();
        }

        // Press before release: a tap within one frame still ends released.
        if input.hold_pressed && !self.gate.is_holding() {
            self.hold_down = true;
            self.gate.press();
            self.display.set_indicator(Indicator::HoldActive, true);
            self.hold_sound = true;
            self.display.set_hold_sound(true);
        }
        if input.hold_released {
            self.hold_down = false;
            if self.gate.is_holding() {
                self.stop_hold_feedback();
                if self.gate.release() {
                    steps.push(self.apply(Action::HoldAdvance, now));
                }
            }
        }

        if self.gate.is_holding() {
            match self.gate.sample(input.pointer_dx, input.pointer_dy) {
                GateEvent::Reached => {
                    debug!("hold distance reached, waiting for release");
                    self.stop_hold_sound();
                    self.display.set_indicator(Indicator::HoldSuccess, true);
                    self.hold_success_until = Some(now + self.config.hold_success_feedback_ms);
                }
                GateEvent::StreakBroken => debug!("hold streak broken"),
                GateEvent::None => {}
            }
        }
    }

    fn stop_hold_feedback(&mut self) {
        self.display.set_indicator(Indicator::HoldActive, false);
        self.stop_hold_sound();
    }

    fn stop_hold_sound(&mut self) {
        if self.hold_sound {
            self.hold_sound = false;
            self.display.set_hold_sound(false);
        }
    }

    /// Drive the flow controller directly, bypassing the gesture gate.
    pub fn advance(&mut self, action: Action) -> Step {
        let now = self.clock.now_ms();
        let step = self.apply(action, now);
        self.finish_switch();
        step
    }

    fn apply(&mut self, action: Action, now: u64) -> Step {
        // Forced branches swallow clicks without feedback.
        let accepts_click = !self.flow.is_input_disabled()
            && matches!(
                self.flow.position().mode,
                Mode::Main | Mode::Click { .. } | Mode::Terminal { .. }
            );
        if action == Action::Click && accepts_click {
            self.display.set_indicator(Indicator::ClickFeedback, true);
            self.click_feedback_until = Some(now + self.config.click_feedback_ms);
            self.count_click();
        }

        let step = self.flow.advance(action);
        match step {
            Step::Moved { from, to } => {
                self.leave(from);
                let trigger = self.chapter_trigger_hit(to);
                if trigger && self.has_next_chapter() {
                    self.switch_to_chapter(self.chapter_index + 1);
                } else {
                    if trigger {
                        warn!(
                            "chapter {}: next chapter trigger reached but no chapter follows",
                            self.flow.chapter().number
                        );
                    }
                    self.enter(to, now);
                }
            }
            Step::Ended { from } => {
                self.leave(from);
                info!("chapter {}: story ended", self.flow.chapter().number);
                if !self.config.story_end_message.is_empty() {
                    self.display.show_message(&self.config.story_end_message);
                }
                self.display.story_ended();
            }
            Step::Ignored(_) => {}
        }
        step
    }

    /// Counted against the node the click is made on, before it moves.
    fn count_click(&mut self) {
        if !self.flow.current_node().is_some_and(|n| n.counts_as_click) {
            return;
        }
        self.clicks_in_chapter += 1;
        let number = self.flow.chapter().number;
        if number < self.config.penalty_from_chapter {
            return;
        }
        self.total_penalty_clicks += 1;
        debug!(
            "chapter {}: {} clicks, {} penalty clicks",
            number, self.clicks_in_chapter, self.total_penalty_clicks
        );
        if let Some(mapping) = self.flow.chapter().penalty_mapping_at(self.total_penalty_clicks) {
            info!(
                "chapter {}: {} penalty clicks reached, penalty node {}",
                number, mapping.required_clicks, mapping.target.0
            );
            self.penalty = Some(mapping.clone());
        }
    }

    /// Hand over to the following chapter, if any. Returns false at the
    /// last chapter.
    pub fn activate_next_chapter(&mut self) -> bool {
        if !self.has_next_chapter() {
            warn!("no chapter after chapter {}", self.flow.chapter().number);
            return false;
        }
        if let Some(slot) = self.flow.current_slot() {
            self.leave(slot);
        }
        self.switch_to_chapter(self.chapter_index + 1);
        self.finish_switch();
        true
    }

    fn has_next_chapter(&self) -> bool {
        self.chapter_index + 1 < self.story.len()
    }

    fn chapter_trigger_hit(&self, slot: Slot) -> bool {
        match (self.flow.chapter().next_chapter_trigger, self.flow.node(slot)) {
            (Some(trigger), Some(node)) => node.id == trigger,
            _ => false,
        }
    }

    fn switch_to_chapter(&mut self, index: usize) {
        let Some(chapter) = self.story.get(index) else {
            return;
        };
        info!(
            "chapter {} -> chapter {}",
            self.flow.chapter().number,
            chapter.number
        );
        self.chapter_index = index;
        self.flow = FlowController::new(chapter.clone());
        self.start_chapter();
        // Cleared by `finish_switch` once the current call returns.
        self.flow.set_input_disabled(true);
    }

    fn finish_switch(&mut self) {
        if self.flow.is_input_disabled() {
            debug!("chapter {}: input enabled", self.flow.chapter().number);
            self.flow.set_input_disabled(false);
        }
    }

    fn start_chapter(&mut self) -> Option<Slot> {
        self.flow.restart();
        if self.gate.is_holding() {
            self.stop_hold_feedback();
        }
        self.gate.cancel();
        self.clicks_in_chapter = 0;
        self.pending_reveal = None;
        self.stop_typing();
        self.reveal.cancel();

        match self.flow.current_slot() {
            Some(slot) => {
                let now = self.clock.now_ms();
                self.enter(slot, now);
                Some(slot)
            }
            None => {
                self.display.show_message(&self.config.no_start_message);
                None
            }
        }
    }

    /// Outgoing node: drop its exit targets and finish its text at once.
    fn leave(&mut self, slot: Slot) {
        if let Some(node) = self.flow.node(slot) {
            let targets: Vec<TargetId> = node.deactivations().cloned().collect();
            for target in targets {
                self.set_target(target, false);
            }
        }
        self.pending_reveal = None;
        if let Some(frame) = self.reveal.cancel() {
            self.display.show_text(&frame);
        }
        self.stop_typing();
    }

    fn enter(&mut self, slot: Slot, now: u64) {
        let Some(node) = self.flow.node(slot).cloned() else {
            warn!("no node at {}", slot);
            return;
        };
        self.display.set_role_panel(node.role);
        for target in node.activations().cloned().collect::<Vec<_>>() {
            self.set_target(target, true);
        }
        self.show_node_text(&node, now);
        if let Some(background) = &node.background {
            self.display.set_background(background);
        }
        self.display.set_background_audio(node.sound.as_ref());
    }

    fn set_target(&mut self, target: TargetId, active: bool) {
        if self.target_states.get(&target) == Some(&active) {
            return;
        }
        self.activation.set_active(&target, active);
        self.target_states.insert(target, active);
    }

    fn show_node_text(&mut self, node: &ContentNode, now: u64) {
        self.display.show_text(&TextFrame::plain(""));
        if self.hold_down {
            debug!("hold key down, reveal of '{}' deferred", node.name);
            self.pending_reveal = Some(node.text.clone());
        } else {
            self.begin_reveal(&node.text, now);
        }
    }

    fn begin_reveal(&mut self, text: &str, now: u64) {
        if self.reveal.start(text, now) {
            if !self.typing {
                self.typing = true;
                self.display.set_typing_sound(true);
            }
        } else {
            self.stop_typing();
        }
    }

    fn stop_typing(&mut self) {
        if self.typing {
            self.typing = false;
            self.display.set_typing_sound(false);
        }
    }

    fn tick_reveal(&mut self, now: u64) {
        match self.reveal.tick(now) {
            RevealTick::Idle => {}
            RevealTick::Frame(frame) => self.display.show_text(&frame),
            RevealTick::Finished(frame) => {
                self.display.show_text(&frame);
                self.stop_typing();
            }
        }
    }

    fn expire_feedback(&mut self, now: u64) {
        if self.hold_success_until.is_some_and(|until| now >= until) {
            self.hold_success_until = None;
            self.display.set_indicator(Indicator::HoldSuccess, false);
        }
        if self.click_feedback_until.is_some_and(|until| now >= until) {
            self.click_feedback_until = None;
            self.display.set_indicator(Indicator::ClickFeedback, false);
        }
    }

    /// Where `action` would lead from here.
    pub fn peek(&self, action: Action) -> Option<&ContentNode> {
        self.flow.peek(action).and_then(|slot| self.flow.node(slot))
    }

    pub fn position(&self) -> Position {
        self.flow.position()
    }

    pub fn current_node(&self) -> Option<&ContentNode> {
        self.flow.current_node()
    }

    pub fn chapter(&self) -> &Chapter {
        self.flow.chapter()
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn is_ended(&self) -> bool {
        self.flow.is_ended()
    }

    pub fn is_holding(&self) -> bool {
        self.gate.is_holding()
    }

    pub fn hold_distance(&self) -> f32 {
        self.gate.accumulated()
    }

    /// Counted clicks since the current chapter started.
    pub fn clicks_in_chapter(&self) -> u32 {
        self.clicks_in_chapter
    }

    /// Counted clicks across the story, from `penalty_from_chapter` on.
    pub fn total_penalty_clicks(&self) -> u32 {
        self.total_penalty_clicks
    }

    pub fn reached_penalty(&self) -> Option<&PenaltyMapping> {
        self.penalty.as_ref()
    }

    pub fn is_revealing(&self) -> bool {
        self.reveal.is_active() || self.pending_reveal.is_some()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn activation(&self) -> &A {
        &self.activation
    }
}

impl StoryPlayerBuilder {
    /// Load every `.ron` chapter file in a directory.
    pub fn chapters_dir(mut self, path: &str) -> Self {
        self.chapters_dir = Some(path.to_string());
        self
    }

    /// Provide a chapter directly (for testing without files).
    pub fn chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self
    }

    /// Provide a whole story directly.
    pub fn with_story(mut self, story: Story) -> Self {
        self.story = Some(story);
        self
    }

    pub fn config(mut self, config: PlayerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build<D: DisplaySink, A: ActivationSink, C: Clock>(
        self,
        display: D,
        activation: A,
        clock: C,
    ) -> Result<StoryPlayer<D, A, C>, PlayerError> {
        let mut chapters = match self.story {
            Some(story) => story.chapters().to_vec(),
            None => Vec::new(),
        };
        chapters.extend(self.chapters);

        if let Some(ref dir) = self.chapters_dir {
            if Path::new(dir).exists() {
                let loaded = Story::load_from_dir(Path::new(dir))?;
                chapters.extend(loaded.chapters().iter().cloned());
            } else {
                warn!("chapters directory '{}' does not exist", dir);
            }
        }

        let story = Story::new(chapters)?;
        let first = story.get(0).cloned().ok_or(PlayerError::NoChapters)?;

        // Explicit config wins over the file
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) if Path::new(&path).exists() => {
                PlayerConfig::load_from_ron(Path::new(&path))?
            }
            _ => PlayerConfig::default(),
        };

        Ok(StoryPlayer {
            story,
            chapter_index: 0,
            flow: FlowController::new(first),
            gate: ProgressionGate::new(config.gate),
            reveal: TextReveal::new(config.reveal, self.seed),
            config,
            display,
            activation,
            clock,
            target_states: FxHashMap::default(),
            hold_down: false,
            pending_reveal: None,
            typing: false,
            hold_sound: false,
            hold_success_until: None,
            click_feedback_until: None,
            clicks_in_chapter: 0,
            total_penalty_clicks: 0,
            penalty: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::IgnoreReason;
    use crate::core::sink::Effect;
    use crate::schema::container::{Container, ContainerKind, ContainerRef};
    use crate::schema::node::{ActivationDirective, AssetRef, NodeId, NodeRole};

    type TestPlayer = StoryPlayer<EffectLog, EffectLog, ManualClock>;

    fn node(id: u64, text: &str) -> ContentNode {
        ContentNode::new(NodeId(id), format!("n{}", id), text)
    }

    fn chapter(number: u32) -> Chapter {
        let base = number as u64 * 100;
        let mut ch = Chapter::new(number);
        ch.main_sequence.nodes = vec![node(base + 1, "Alpha."), node(base + 2, "Beta.")];
        let mut click = Container::new(ContainerKind::ClickBranch, format!("H{}.C0", number));
        click.nodes = vec![node(base + 10, "Side.")];
        ch.click_branches.push(click);
        ch
    }

    fn instant_config() -> PlayerConfig {
        PlayerConfig {
            reveal: RevealConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                highlight_ms: 0,
            },
            ..PlayerConfig::default()
        }
    }

    fn player_with(chapters: Vec<Chapter>, config: PlayerConfig) -> (TestPlayer, EffectLog, ManualClock) {
        let log = EffectLog::new();
        let clock = ManualClock::new(0);
        let mut builder = StoryPlayer::builder().config(config).seed(1);
        for ch in chapters {
            builder = builder.chapter(ch);
        }
        let player = builder
            .build(log.clone(), log.clone(), clock.clone())
            .unwrap();
        (player, log, clock)
    }

    fn hold_gesture(player: &mut TestPlayer) -> Vec<Step> {
        player.tick(&FrameInput {
            hold_pressed: true,
            ..FrameInput::default()
        });
        for _ in 0..5 {
            player.tick(&FrameInput {
                pointer_dy: 1.0,
                ..FrameInput::default()
            });
        }
        player.tick(&FrameInput {
            hold_released: true,
            ..FrameInput::default()
        })
    }

    #[test]
    fn build_without_chapters_fails() {
        let result = StoryPlayer::builder().build(EffectLog::new(), EffectLog::new(), ManualClock::new(0));
        assert!(matches!(result, Err(PlayerError::NoChapters)));
    }

    #[test]
    fn init_shows_first_node() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        let slot = player.init();
        assert_eq!(slot, Some(Slot::new(ContainerRef::Main, 0)));
        player.tick(&FrameInput::default());
        assert_eq!(log.last_text().as_deref(), Some("Alpha."));
        assert!(log.snapshot().contains(&Effect::RolePanel(NodeRole::User)));
    }

    #[test]
    fn empty_chapter_shows_fallback_message() {
        let (mut player, log, _) = player_with(vec![Chapter::new(1)], PlayerConfig::default());
        assert_eq!(player.init(), None);
        assert_eq!(
            log.last_text().as_deref(),
            Some("No start node found in the main sequence!")
        );
        assert!(player.tick(&FrameInput { click: true, ..FrameInput::default() })
            .iter()
            .all(|s| matches!(s, Step::Ignored(_))));
    }

    #[test]
    fn hold_gesture_advances_on_release() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        let steps = hold_gesture(&mut player);
        assert_eq!(steps.len(), 1);
        assert_eq!(player.position().sequence_index, 1);
        assert_eq!(log.last_text().as_deref(), Some("Beta."));
        let effects = log.snapshot();
        assert!(effects.contains(&Effect::Indicator {
            indicator: Indicator::HoldSuccess,
            visible: true
        }));
    }

    #[test]
    fn short_hold_does_not_advance() {
        let (mut player, _, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        let steps = player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        assert!(steps.is_empty());
        assert_eq!(player.position().sequence_index, 0);
    }

    #[test]
    fn cancel_hold_discards_gesture() {
        let (mut player, _, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        for _ in 0..6 {
            player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        }
        player.tick(&FrameInput { cancel_hold: true, ..FrameInput::default() });
        assert!(!player.is_holding());
        let steps = player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        assert!(steps.is_empty());
        assert_eq!(player.position().sequence_index, 0);
    }

    #[test]
    fn tap_within_one_frame_releases_hold() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput::default());

        let steps = player.tick(&FrameInput {
            hold_pressed: true,
            hold_released: true,
            ..FrameInput::default()
        });
        assert!(steps.is_empty());
        assert!(!player.is_holding());

        // the reveal of the next node is not held back
        player.advance(Action::Click);
        player.tick(&FrameInput::default());
        assert_eq!(log.last_text().as_deref(), Some("Side."));
        assert!(!player.is_revealing());

        // later drags do not feed a leftover gesture
        for _ in 0..6 {
            player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        }
        assert_eq!(player.hold_distance(), 0.0);
        let steps = player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        assert!(steps.is_empty());
        assert_eq!(player.position().mode, Mode::Click { branch: 0, entry: 0 });
    }

    #[test]
    fn hold_sound_stops_once_distance_reached() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        log.take();

        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        let effects = log.take();
        assert!(effects.contains(&Effect::HoldSound(true)));
        assert!(effects.contains(&Effect::Indicator {
            indicator: Indicator::HoldActive,
            visible: true
        }));

        for _ in 0..5 {
            player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        }
        let effects = log.take();
        assert!(player.is_holding());
        assert!(effects.contains(&Effect::HoldSound(false)));
        assert!(!effects.contains(&Effect::Indicator {
            indicator: Indicator::HoldActive,
            visible: false
        }));

        player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        let effects = log.take();
        assert!(effects.contains(&Effect::Indicator {
            indicator: Indicator::HoldActive,
            visible: false
        }));
        assert!(!effects.contains(&Effect::HoldSound(false)));
        assert_eq!(player.position().sequence_index, 1);
    }

    #[test]
    fn short_hold_release_stops_hold_sound() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        log.take();
        player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        assert!(log.take().contains(&Effect::HoldSound(false)));
    }

    #[test]
    fn click_while_holding_drops_hold_and_defers_reveal() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput::default());
        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        log.take();

        let steps = player.tick(&FrameInput { click: true, ..FrameInput::default() });
        assert!(matches!(steps[0], Step::Moved { .. }));
        assert!(!player.is_holding());
        assert_eq!(player.position().mode, Mode::Click { branch: 0, entry: 0 });
        // key still down: text stays blank until release
        assert_eq!(log.last_text().as_deref(), Some(""));
        assert!(player.is_revealing());

        player.tick(&FrameInput { hold_released: true, ..FrameInput::default() });
        assert_eq!(log.last_text().as_deref(), Some("Side."));
    }

    #[test]
    fn click_feedback_expires() {
        let (mut player, log, clock) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.tick(&FrameInput { click: true, ..FrameInput::default() });
        assert!(log.snapshot().contains(&Effect::Indicator {
            indicator: Indicator::ClickFeedback,
            visible: true
        }));
        log.take();
        clock.advance(499);
        player.tick(&FrameInput::default());
        assert!(log.is_empty());
        clock.advance(1);
        player.tick(&FrameInput::default());
        assert_eq!(
            log.take(),
            vec![Effect::Indicator {
                indicator: Indicator::ClickFeedback,
                visible: false
            }]
        );
    }

    #[test]
    fn transition_side_effects() {
        let mut ch = chapter(1);
        ch.main_sequence.nodes[0].directives = vec![ActivationDirective {
            target: TargetId("lamp".to_string()),
            activate_on_entry: true,
            deactivate_on_exit: true,
        }];
        ch.main_sequence.nodes[1].role = NodeRole::Machine;
        ch.main_sequence.nodes[1].background = Some(AssetRef("room.png".to_string()));
        ch.main_sequence.nodes[1].sound = Some(AssetRef("hum.ogg".to_string()));
        let (mut player, log, _) = player_with(vec![ch], instant_config());
        player.init();
        assert!(log.snapshot().contains(&Effect::SetActive {
            target: "lamp".to_string(),
            active: true
        }));
        log.take();

        player.advance(Action::HoldAdvance);
        let effects = log.take();
        let pos = |e: &Effect| effects.iter().position(|x| x == e);
        let off = pos(&Effect::SetActive {
            target: "lamp".to_string(),
            active: false,
        });
        let role = pos(&Effect::RolePanel(NodeRole::Machine));
        assert!(off.is_some() && role.is_some() && off < role);
        assert!(effects.contains(&Effect::Background("room.png".to_string())));
        assert!(effects.contains(&Effect::BackgroundAudio(Some("hum.ogg".to_string()))));
    }

    #[test]
    fn activation_is_idempotent() {
        let mut ch = chapter(1);
        let directive = ActivationDirective {
            target: TargetId("door".to_string()),
            activate_on_entry: true,
            deactivate_on_exit: false,
        };
        ch.main_sequence.nodes[0].directives = vec![directive.clone()];
        ch.main_sequence.nodes[1].directives = vec![directive];
        let (mut player, log, _) = player_with(vec![ch], instant_config());
        player.init();
        player.advance(Action::HoldAdvance);
        let activations = log
            .snapshot()
            .iter()
            .filter(|e| matches!(e, Effect::SetActive { .. }))
            .count();
        assert_eq!(activations, 1);
    }

    #[test]
    fn advance_cancels_running_reveal() {
        let (mut player, log, _) = player_with(vec![chapter(1)], PlayerConfig::default());
        player.init();
        player.tick(&FrameInput::default());
        assert_eq!(log.last_text().as_deref(), Some("A"));
        log.take();
        player.advance(Action::HoldAdvance);
        let effects = log.take();
        assert_eq!(
            effects.first(),
            Some(&Effect::Text {
                text: "Alpha.".to_string(),
                highlight_from: 6
            })
        );
    }

    #[test]
    fn ignored_action_leaves_display_alone() {
        let (mut player, log, _) = player_with(vec![chapter(1)], instant_config());
        player.init();
        player.advance(Action::HoldAdvance);
        player.tick(&FrameInput::default());
        log.take();
        let step = player.advance(Action::HoldAdvance);
        assert!(matches!(step, Step::Ignored(_)));
        assert!(log.is_empty());
    }

    #[test]
    fn chapter_trigger_switches_chapter() {
        let mut first = chapter(1);
        first.next_chapter_trigger = Some(NodeId(102));
        let (mut player, log, _) = player_with(vec![first, chapter(2)], instant_config());
        player.init();
        player.advance(Action::HoldAdvance);
        assert_eq!(player.chapter().number, 2);
        assert_eq!(player.position().sequence_index, 0);
        assert!(!player.position().in_click_branch());
        player.tick(&FrameInput::default());
        assert_eq!(log.last_text().as_deref(), Some("Alpha."));
        assert_eq!(player.current_node().map(|n| n.id), Some(NodeId(201)));
    }

    #[test]
    fn trigger_without_next_chapter_shows_node() {
        let mut only = chapter(1);
        only.next_chapter_trigger = Some(NodeId(102));
        let (mut player, _, _) = player_with(vec![only], instant_config());
        player.init();
        player.advance(Action::HoldAdvance);
        assert_eq!(player.chapter().number, 1);
        assert_eq!(player.current_node().map(|n| n.id), Some(NodeId(102)));
    }

    #[test]
    fn manual_next_chapter() {
        let (mut player, _, _) = player_with(vec![chapter(1), chapter(2)], instant_config());
        player.init();
        assert!(player.activate_next_chapter());
        assert_eq!(player.chapter().number, 2);
        assert!(!player.activate_next_chapter());
        assert!(matches!(player.advance(Action::Click), Step::Moved { .. }));
    }

    #[test]
    fn chapter_switch_ignores_rest_of_frame() {
        let mut first = chapter(1);
        first.next_chapter_trigger = Some(NodeId(102));
        let (mut player, _, _) = player_with(vec![first, chapter(2)], instant_config());
        player.init();
        player.tick(&FrameInput { hold_pressed: true, ..FrameInput::default() });
        for _ in 0..5 {
            player.tick(&FrameInput { pointer_dy: 1.0, ..FrameInput::default() });
        }

        let steps = player.tick(&FrameInput {
            hold_released: true,
            click: true,
            ..FrameInput::default()
        });
        assert_eq!(steps.len(), 2);
        assert!(matches!(steps[0], Step::Moved { .. }));
        assert_eq!(steps[1], Step::Ignored(IgnoreReason::InputDisabled));
        assert_eq!(player.chapter().number, 2);
        assert_eq!(player.position().mode, Mode::Main);
        assert_eq!(player.clicks_in_chapter(), 0);

        let steps = player.tick(&FrameInput { click: true, ..FrameInput::default() });
        assert!(matches!(steps.as_slice(), [Step::Moved { .. }]));
        assert_eq!(player.position().mode, Mode::Click { branch: 0, entry: 0 });
    }

    #[test]
    fn counted_clicks_feed_penalty_total() {
        let mut first = chapter(1);
        first.click_branches[0].nodes[0].counts_as_click = false;
        let mut second = chapter(2);
        second.penalty_mappings = vec![PenaltyMapping {
            required_clicks: 2,
            target: NodeId(202),
            advance_after_return: true,
        }];
        let config = PlayerConfig {
            penalty_from_chapter: 2,
            ..instant_config()
        };
        let (mut player, _, _) = player_with(vec![first, second], config);
        player.init();

        // chapter 1 counts per chapter only
        player.advance(Action::Click);
        player.advance(Action::Click);
        assert_eq!(player.clicks_in_chapter(), 1);
        assert_eq!(player.total_penalty_clicks(), 0);

        player.activate_next_chapter();
        assert_eq!(player.clicks_in_chapter(), 0);
        player.advance(Action::Click);
        assert_eq!(player.total_penalty_clicks(), 1);
        assert_eq!(player.reached_penalty(), None);
        player.advance(Action::HoldAdvance);
        player.advance(Action::Click);
        assert_eq!(player.clicks_in_chapter(), 2);
        assert_eq!(player.total_penalty_clicks(), 2);
        let penalty = player.reached_penalty().cloned();
        assert_eq!(penalty.map(|m| m.target), Some(NodeId(202)));

        // holds never count
        player.advance(Action::HoldAdvance);
        assert_eq!(player.total_penalty_clicks(), 2);

        player.init();
        assert_eq!(player.total_penalty_clicks(), 0);
        assert_eq!(player.reached_penalty(), None);
    }

    #[test]
    fn ignored_forced_clicks_are_not_counted() {
        let mut ch = chapter(1);
        let mut forced = Container::new(ContainerKind::ForcedBranch, "F0 [H1.C0 0-0]");
        forced.nodes = vec![node(120, "Forced.")];
        ch.forced_branches.push(forced);
        ch.resolve_linkages();
        let (mut player, _, _) = player_with(vec![ch], instant_config());
        player.init();
        player.advance(Action::Click);
        player.advance(Action::HoldAdvance);
        assert_eq!(player.position().mode, Mode::Forced { branch: 0, entry: 0 });
        assert_eq!(player.total_penalty_clicks(), 1);

        player.advance(Action::Click);
        assert_eq!(player.clicks_in_chapter(), 1);
        assert_eq!(player.total_penalty_clicks(), 1);
    }

    #[test]
    fn story_end_reports_to_display() {
        let mut ch = chapter(1);
        let mut terminal = Container::new(ContainerKind::TerminalBranch, "E0 [H1.C0 0-0]");
        terminal.nodes = vec![node(150, "Goodbye.")];
        ch.terminal_branches.push(terminal);
        ch.resolve_linkages();
        let config = PlayerConfig {
            story_end_message: "The end.".to_string(),
            ..instant_config()
        };
        let (mut player, log, _) = player_with(vec![ch], config);
        player.init();
        player.advance(Action::Click);
        player.advance(Action::Click);
        assert!(player.position().terminal_mode());
        let step = player.advance(Action::HoldAdvance);
        assert!(matches!(step, Step::Ended { .. }));
        assert!(player.is_ended());
        let effects = log.snapshot();
        assert_eq!(effects.last(), Some(&Effect::StoryEnded));
        assert!(effects.contains(&Effect::Message("The end.".to_string())));
    }

    #[test]
    fn config_from_ron_fills_defaults() {
        let config: PlayerConfig = ron::from_str("(click_feedback_ms: 250)").unwrap();
        assert_eq!(config.click_feedback_ms, 250);
        assert_eq!(config.hold_success_feedback_ms, 1000);
        assert_eq!(config.penalty_from_chapter, 1);
        assert_eq!(config.reveal, RevealConfig::default());
    }
}
