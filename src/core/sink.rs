/// Collaborators the player drives: display, object activation, clock.
///
/// The runtime never touches a scene graph. Everything visible goes out
/// through these traits; [`EffectLog`] records it as plain data for tests,
/// tools and the wasm bindings.

use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use crate::core::reveal::TextFrame;
use crate::schema::node::{AssetRef, NodeRole, TargetId};

/// Transient UI feedback elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Indicator {
    /// Shown while the hold input is down.
    HoldActive,
    /// Shown briefly once the gesture distance is reached.
    HoldSuccess,
    /// Shown briefly after a click.
    ClickFeedback,
}

/// Renders node content.
pub trait DisplaySink {
    fn show_text(&mut self, frame: &TextFrame);
    fn set_background(&mut self, background: &AssetRef);
    /// Stop whatever background audio plays, then start `sound` if any.
    fn set_background_audio(&mut self, sound: Option<&AssetRef>);
    fn set_role_panel(&mut self, role: NodeRole);
    fn set_indicator(&mut self, indicator: Indicator, visible: bool);
    fn set_typing_sound(&mut self, playing: bool);
    /// Hold sound: starts with the hold, stops once the distance is reached.
    fn set_hold_sound(&mut self, playing: bool);
    /// Plain fallback text, e.g. when a chapter has no start node.
    fn show_message(&mut self, message: &str);
    fn story_ended(&mut self);
}

/// Switches external scene objects on and off.
pub trait ActivationSink {
    fn set_active(&mut self, target: &TargetId, active: bool);
}

/// Millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Effect {
    Text { text: String, highlight_from: usize },
    Background(String),
    BackgroundAudio(Option<String>),
    RolePanel(NodeRole),
    Indicator { indicator: Indicator, visible: bool },
    TypingSound(bool),
    HoldSound(bool),
    Message(String),
    StoryEnded,
    SetActive { target: String, active: bool },
}

/// Records every call as an [`Effect`]. Clones share one log, so a test can
/// keep a handle while the player owns another.
#[derive(Debug, Clone, Default)]
pub struct EffectLog {
    effects: Rc<RefCell<Vec<Effect>>>,
}

impl EffectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, effect: Effect) {
        self.effects.borrow_mut().push(effect);
    }

    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.borrow_mut())
    }

    pub fn snapshot(&self) -> Vec<Effect> {
        self.effects.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.borrow().is_empty()
    }

    /// Most recent text shown, if any.
    pub fn last_text(&self) -> Option<String> {
        self.effects.borrow().iter().rev().find_map(|e| match e {
            Effect::Text { text, .. } => Some(text.clone()),
            Effect::Message(text) => Some(text.clone()),
            _ => None,
        })
    }
}

impl DisplaySink for EffectLog {
    fn show_text(&mut self, frame: &TextFrame) {
        self.push(Effect::Text {
            text: frame.text.clone(),
            highlight_from: frame.highlight_from,
        });
    }

    fn set_background(&mut self, background: &AssetRef) {
        self.push(Effect::Background(background.0.clone()));
    }

    fn set_background_audio(&mut self, sound: Option<&AssetRef>) {
        self.push(Effect::BackgroundAudio(sound.map(|s| s.0.clone())));
    }

    fn set_role_panel(&mut self, role: NodeRole) {
        self.push(Effect::RolePanel(role));
    }

    fn set_indicator(&mut self, indicator: Indicator, visible: bool) {
        self.push(Effect::Indicator { indicator, visible });
    }

    fn set_typing_sound(&mut self, playing: bool) {
        self.push(Effect::TypingSound(playing));
    }

    fn set_hold_sound(&mut self, playing: bool) {
        self.push(Effect::HoldSound(playing));
    }

    fn show_message(&mut self, message: &str) {
        self.push(Effect::Message(message.to_string()));
    }

    fn story_ended(&mut self) {
        self.push(Effect::StoryEnded);
    }
}

impl ActivationSink for EffectLog {
    fn set_active(&mut self, target: &TargetId, active: bool) {
        self.push(Effect::SetActive {
            target: target.0.clone(),
            active,
        });
    }
}

/// Clock driven by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Wall-clock time since construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_log_clones_share_entries() {
        let log = EffectLog::new();
        let mut handle = log.clone();
        handle.set_role_panel(NodeRole::Machine);
        handle.set_active(&TargetId("lamp".to_string()), true);
        assert_eq!(
            log.snapshot(),
            vec![
                Effect::RolePanel(NodeRole::Machine),
                Effect::SetActive {
                    target: "lamp".to_string(),
                    active: true
                },
            ]
        );
        assert_eq!(log.take().len(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn last_text_prefers_latest() {
        let mut log = EffectLog::new();
        log.show_message("first");
        log.show_text(&TextFrame {
            text: "second".to_string(),
            highlight_from: 6,
        });
        log.set_typing_sound(false);
        assert_eq!(log.last_text().as_deref(), Some("second"));
    }

    #[test]
    fn manual_clock_is_shared() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        other.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(5);
        assert_eq!(other.now_ms(), 5);
    }
}
