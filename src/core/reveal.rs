/// Character-by-character text reveal, driven by the frame tick.
///
/// State is plain data: how many characters are visible, when each one
/// appeared and when the next one is due. Starting a new reveal always
/// replaces the running one.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Timing of the reveal. Delays are drawn uniformly from
/// `[min_delay_ms, max_delay_ms]` after every visible character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevealConfig {
    pub min_delay_ms: u32,
    pub max_delay_ms: u32,
    /// How long a freshly revealed character stays highlighted.
    pub highlight_ms: u32,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 20,
            max_delay_ms: 100,
            highlight_ms: 1000,
        }
    }
}

/// What the display should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub text: String,
    /// Char index from which visible non-whitespace characters are still
    /// highlighted. Equal to the char count when nothing is highlighted.
    pub highlight_from: usize,
}

impl TextFrame {
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            highlight_from: text.chars().count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealTick {
    /// Nothing changed since the last tick.
    Idle,
    Frame(TextFrame),
    /// The reveal completed; the frame holds the full plain text.
    Finished(TextFrame),
}

#[derive(Debug, Clone)]
struct RevealTask {
    chars: Vec<char>,
    shown_at: Vec<u64>,
    next_at: u64,
    last_highlight_from: usize,
}

impl RevealTask {
    fn full_text(&self) -> String {
        self.chars.iter().collect()
    }

    fn highlight_from(&self, now_ms: u64, highlight_ms: u32) -> usize {
        self.shown_at
            .iter()
            .zip(&self.chars)
            .position(|(at, c)| !c.is_whitespace() && now_ms < at + highlight_ms as u64)
            .unwrap_or(self.shown_at.len())
    }
}

#[derive(Debug, Clone)]
pub struct TextReveal {
    config: RevealConfig,
    rng: StdRng,
    task: Option<RevealTask>,
}

impl TextReveal {
    pub fn new(config: RevealConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            task: None,
        }
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Begin revealing `text`, dropping any reveal in progress.
    /// Returns false for empty text, which has nothing to reveal.
    pub fn start(&mut self, text: &str, now_ms: u64) -> bool {
        if text.is_empty() {
            self.task = None;
            return false;
        }
        self.task = Some(RevealTask {
            chars: text.chars().collect(),
            shown_at: Vec::new(),
            next_at: now_ms,
            last_highlight_from: 0,
        });
        true
    }

    /// Stop the running reveal. Returns the full text so the display can
    /// jump straight to it.
    pub fn cancel(&mut self) -> Option<TextFrame> {
        self.task
            .take()
            .map(|task| TextFrame::plain(&task.full_text()))
    }

    pub fn tick(&mut self, now_ms: u64) -> RevealTick {
        let Self { config, rng, task } = self;
        let Some(current) = task.as_mut() else {
            return RevealTick::Idle;
        };

        let mut changed = false;
        while current.shown_at.len() < current.chars.len() && now_ms >= current.next_at {
            let c = current.chars[current.shown_at.len()];
            let at = current.next_at;
            current.shown_at.push(at);
            current.next_at = at + delay_after(c, config, rng);
            changed = true;
        }

        let highlight_from = current.highlight_from(now_ms, config.highlight_ms);
        let all_visible = current.shown_at.len() == current.chars.len();
        if all_visible && highlight_from == current.shown_at.len() {
            let full = current.full_text();
            *task = None;
            return RevealTick::Finished(TextFrame::plain(&full));
        }

        if !changed && highlight_from == current.last_highlight_from {
            return RevealTick::Idle;
        }
        current.last_highlight_from = highlight_from;
        RevealTick::Frame(TextFrame {
            text: current.chars[..current.shown_at.len()].iter().collect(),
            highlight_from,
        })
    }
}

/// Pause after showing `c`: spaces and carriage returns are free,
/// newlines take twice as long as a regular character.
fn delay_after(c: char, config: &RevealConfig, rng: &mut StdRng) -> u64 {
    match c {
        ' ' | '\r' => 0,
        '\n' => 2 * draw_delay(config, rng),
        _ => draw_delay(config, rng),
    }
}

fn draw_delay(config: &RevealConfig, rng: &mut StdRng) -> u64 {
    let lo = config.min_delay_ms.min(config.max_delay_ms);
    let hi = config.min_delay_ms.max(config.max_delay_ms);
    rng.gen_range(lo..=hi) as u64
}
