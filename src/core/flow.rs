/// The chapter flow controller: tracks where the player is and decides,
/// per action, which node comes next.
///
/// Transitions are computed as a plan first and committed second, so the
/// same rules answer both `advance` and the side-effect free `peek`.

use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

use crate::schema::container::{Chapter, Container, ContainerRef, Slot};
use crate::schema::node::ContentNode;

/// A player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    /// Completed hold gesture.
    HoldAdvance,
    Click,
}

/// Which container the player is in. Branch modes are mutually exclusive
/// by construction; the main sequence index is kept alongside as the
/// return address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Mode {
    Main,
    Click { branch: usize, entry: usize },
    Forced { branch: usize, entry: usize },
    Terminal { branch: usize, entry: usize },
    /// A terminal branch ran out. Nothing follows for this session.
    Ended,
    /// The chapter has no start node.
    Inert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub sequence_index: usize,
    /// Last click branch entered from the main sequence. Only moves on entry.
    pub branch_progression: Option<usize>,
    pub mode: Mode,
}

impl Position {
    fn start(chapter: &Chapter) -> Self {
        Self {
            sequence_index: 0,
            branch_progression: None,
            mode: if chapter.main_sequence.is_empty() {
                Mode::Inert
            } else {
                Mode::Main
            },
        }
    }

    pub fn in_click_branch(&self) -> bool {
        matches!(self.mode, Mode::Click { .. })
    }

    pub fn forced_mode(&self) -> bool {
        matches!(self.mode, Mode::Forced { .. })
    }

    pub fn terminal_mode(&self) -> bool {
        matches!(self.mode, Mode::Terminal { .. })
    }

    pub fn click_branch_index(&self) -> Option<usize> {
        match self.mode {
            Mode::Click { branch, .. } => Some(branch),
            _ => None,
        }
    }

    pub fn click_entry_index(&self) -> Option<usize> {
        match self.mode {
            Mode::Click { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// The node currently on screen.
    pub fn slot(&self) -> Option<Slot> {
        match self.mode {
            Mode::Main => Some(Slot::new(ContainerRef::Main, self.sequence_index)),
            Mode::Click { branch, entry } => Some(Slot::new(ContainerRef::Click(branch), entry)),
            Mode::Forced { branch, entry } => Some(Slot::new(ContainerRef::Forced(branch), entry)),
            Mode::Terminal { branch, entry } => {
                Some(Slot::new(ContainerRef::Terminal(branch), entry))
            }
            Mode::Ended | Mode::Inert => None,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let progression = self
            .branch_progression
            .map(|p| p as i64)
            .unwrap_or(-1);
        write!(
            f,
            "sequence_index={}, branch_progression={}, ",
            self.sequence_index, progression
        )?;
        match self.mode {
            Mode::Main => write!(f, "mode=main"),
            Mode::Click { branch, entry } => {
                write!(f, "mode=click, click_branch={}, click_entry={}", branch, entry)
            }
            Mode::Forced { branch, entry } => {
                write!(f, "mode=forced, forced_branch={}, forced_entry={}", branch, entry)
            }
            Mode::Terminal { branch, entry } => write!(
                f,
                "mode=terminal, terminal_branch={}, terminal_entry={}",
                branch, entry
            ),
            Mode::Ended => write!(f, "mode=ended"),
            Mode::Inert => write!(f, "mode=inert"),
        }
    }
}

/// Why an action changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IgnoreReason {
    InputDisabled,
    /// The chapter has no start node.
    Inert,
    StoryEnded,
    ClickDisabled,
    HoldDisabled,
    /// Forced branches only accept hold.
    ClickInForcedBranch,
    /// Main-sequence node does not open click branches.
    NotAClickNode,
    NoClickBranch,
    EmptyClickBranch,
    /// Parked on the last main-sequence node.
    EndOfSequence,
}

/// Outcome of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Step {
    Moved { from: Slot, to: Slot },
    /// A terminal branch was exhausted.
    Ended { from: Slot },
    Ignored(IgnoreReason),
}

impl Step {
    pub fn target(&self) -> Option<Slot> {
        match self {
            Step::Moved { to, .. } => Some(*to),
            _ => None,
        }
    }
}

struct Plan {
    position: Position,
    step: Step,
    /// More than one linked branch claimed the current entry.
    ambiguous: bool,
}

impl Plan {
    fn ignore(position: Position, reason: IgnoreReason) -> Self {
        Self {
            position,
            step: Step::Ignored(reason),
            ambiguous: false,
        }
    }
}

/// First linked, non-empty branch whose range holds `(branch, entry)`,
/// plus whether any other branch in `list` also matched.
fn linked_match(list: &[Container], branch: usize, entry: usize) -> (Option<usize>, bool) {
    let mut hits = list.iter().enumerate().filter(|(_, c)| {
        !c.is_empty()
            && c.linkage
                .map(|link| link.contains(branch, entry))
                .unwrap_or(false)
    });
    let first = hits.next().map(|(i, _)| i);
    (first, hits.next().is_some())
}

#[derive(Debug, Clone)]
pub struct FlowController {
    chapter: Chapter,
    position: Position,
    input_disabled: bool,
}

impl FlowController {
    pub fn new(chapter: Chapter) -> Self {
        let position = Position::start(&chapter);
        if position.mode == Mode::Inert {
            warn!("chapter {}: main sequence is empty, no start node", chapter.number);
        }
        Self {
            chapter,
            position,
            input_disabled: false,
        }
    }

    /// Back to the first main-sequence node with all counters cleared.
    pub fn restart(&mut self) {
        self.position = Position::start(&self.chapter);
        self.input_disabled = false;
        info!("chapter {}: started", self.chapter.number);
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn current_slot(&self) -> Option<Slot> {
        self.position.slot()
    }

    pub fn current_node(&self) -> Option<&ContentNode> {
        self.current_slot().and_then(|slot| self.chapter.node(slot))
    }

    pub fn node(&self, slot: Slot) -> Option<&ContentNode> {
        self.chapter.node(slot)
    }

    pub fn is_inert(&self) -> bool {
        self.position.mode == Mode::Inert
    }

    pub fn is_ended(&self) -> bool {
        self.position.mode == Mode::Ended
    }

    /// Transient external block, e.g. while switching chapters.
    pub fn set_input_disabled(&mut self, disabled: bool) {
        self.input_disabled = disabled;
    }

    pub fn is_input_disabled(&self) -> bool {
        self.input_disabled
    }

    /// Apply an action and return what happened.
    pub fn advance(&mut self, action: Action) -> Step {
        let plan = self.plan(action);
        if plan.ambiguous {
            warn!(
                "chapter {}: overlapping linked ranges at {}, using the first match",
                self.chapter.number,
                self.position
                    .slot()
                    .map(|s| s.to_string())
                    .unwrap_or_default()
            );
        }
        match plan.step {
            Step::Moved { from, to } => debug!("{:?}: {} -> {}", action, from, to),
            Step::Ended { from } => info!("{:?}: {} -> story ended", action, from),
            Step::Ignored(reason) => debug!("{:?} ignored: {:?}", action, reason),
        }
        self.position = plan.position;
        plan.step
    }

    /// Where `action` would lead, without changing anything.
    pub fn peek(&self, action: Action) -> Option<Slot> {
        self.plan(action).step.target()
    }

    fn plan(&self, action: Action) -> Plan {
        let pos = self.position;
        if self.input_disabled {
            return Plan::ignore(pos, IgnoreReason::InputDisabled);
        }

        match (pos.mode, action) {
            (Mode::Inert, _) => Plan::ignore(pos, IgnoreReason::Inert),
            (Mode::Ended, _) => Plan::ignore(pos, IgnoreReason::StoryEnded),
            (Mode::Terminal { branch, entry }, _) => self.plan_terminal(pos, branch, entry),
            (Mode::Forced { .. }, Action::Click) => {
                Plan::ignore(pos, IgnoreReason::ClickInForcedBranch)
            }
            (Mode::Forced { branch, entry }, Action::HoldAdvance) => {
                self.plan_forced(pos, branch, entry)
            }
            (Mode::Main, Action::Click) => self.plan_enter_click_branch(pos),
            (Mode::Click { branch, entry }, Action::Click) => {
                self.plan_click_in_branch(pos, branch, entry)
            }
            (Mode::Click { branch, entry }, Action::HoldAdvance) => {
                self.plan_hold_in_branch(pos, branch, entry)
            }
            (Mode::Main, Action::HoldAdvance) => self.plan_hold_in_main(pos),
        }
    }

    fn from_slot(pos: &Position) -> Slot {
        // Only called for modes that have a slot.
        pos.slot()
            .unwrap_or_else(|| Slot::new(ContainerRef::Main, pos.sequence_index))
    }

    fn moved(pos: Position, next: Position) -> Plan {
        Plan {
            step: Step::Moved {
                from: Self::from_slot(&pos),
                to: Self::from_slot(&next),
            },
            position: next,
            ambiguous: false,
        }
    }

    /// Return to the main sequence one step further, clamped to the end.
    fn back_to_main(&self, pos: Position) -> Plan {
        let last = self.chapter.main_sequence.len().saturating_sub(1);
        let next = Position {
            sequence_index: (pos.sequence_index + 1).min(last),
            mode: Mode::Main,
            ..pos
        };
        Self::moved(pos, next)
    }

    fn plan_terminal(&self, pos: Position, branch: usize, entry: usize) -> Plan {
        let len = self
            .chapter
            .terminal_branches
            .get(branch)
            .map(|c| c.len())
            .unwrap_or(0);
        let next_entry = entry + 1;
        if next_entry < len {
            let next = Position {
                mode: Mode::Terminal {
                    branch,
                    entry: next_entry,
                },
                ..pos
            };
            Self::moved(pos, next)
        } else {
            Plan {
                step: Step::Ended {
                    from: Self::from_slot(&pos),
                },
                position: Position {
                    mode: Mode::Ended,
                    ..pos
                },
                ambiguous: false,
            }
        }
    }

    fn plan_forced(&self, pos: Position, branch: usize, entry: usize) -> Plan {
        let len = self
            .chapter
            .forced_branches
            .get(branch)
            .map(|c| c.len())
            .unwrap_or(0);
        let next_entry = entry + 1;
        if next_entry < len {
            let next = Position {
                mode: Mode::Forced {
                    branch,
                    entry: next_entry,
                },
                ..pos
            };
            Self::moved(pos, next)
        } else {
            self.back_to_main(pos)
        }
    }

    fn plan_enter_click_branch(&self, pos: Position) -> Plan {
        let Some(node) = self.chapter.main_sequence.get(pos.sequence_index) else {
            return Plan::ignore(pos, IgnoreReason::EndOfSequence);
        };
        if node.disable_advance_by_click {
            return Plan::ignore(pos, IgnoreReason::ClickDisabled);
        }
        if !node.counts_as_click {
            return Plan::ignore(pos, IgnoreReason::NotAClickNode);
        }
        let count = self.chapter.click_branches.len();
        if count == 0 {
            return Plan::ignore(pos, IgnoreReason::NoClickBranch);
        }
        let target = pos
            .branch_progression
            .map(|p| p + 1)
            .unwrap_or(0)
            .min(count - 1);
        if self.chapter.click_branches[target].is_empty() {
            return Plan::ignore(pos, IgnoreReason::EmptyClickBranch);
        }
        let next = Position {
            branch_progression: Some(target),
            mode: Mode::Click {
                branch: target,
                entry: 0,
            },
            ..pos
        };
        Self::moved(pos, next)
    }

    fn plan_click_in_branch(&self, pos: Position, branch: usize, entry: usize) -> Plan {
        let Some(container) = self.chapter.click_branches.get(branch) else {
            return Plan::ignore(pos, IgnoreReason::NoClickBranch);
        };
        if container
            .get(entry)
            .map(|n| n.disable_advance_by_click)
            .unwrap_or(false)
        {
            return Plan::ignore(pos, IgnoreReason::ClickDisabled);
        }

        let (terminal, ambiguous) = linked_match(&self.chapter.terminal_branches, branch, entry);
        if let Some(t) = terminal {
            let next = Position {
                mode: Mode::Terminal {
                    branch: t,
                    entry: 0,
                },
                ..pos
            };
            return Plan {
                ambiguous,
                ..Self::moved(pos, next)
            };
        }

        if container.is_empty() {
            return Plan::ignore(pos, IgnoreReason::EmptyClickBranch);
        }
        let mut next_entry = entry + 1;
        if next_entry >= container.len() {
            next_entry = 0;
        }
        let next = Position {
            mode: Mode::Click {
                branch,
                entry: next_entry,
            },
            ..pos
        };
        Self::moved(pos, next)
    }

    fn plan_hold_in_branch(&self, pos: Position, branch: usize, entry: usize) -> Plan {
        let (forced, forced_ambiguous) =
            linked_match(&self.chapter.forced_branches, branch, entry);
        let (terminal, terminal_ambiguous) =
            linked_match(&self.chapter.terminal_branches, branch, entry);
        // Forced wins over terminal on a shared entry; validation reports it.
        let ambiguous = forced_ambiguous
            || terminal_ambiguous
            || (forced.is_some() && terminal.is_some());

        if let Some(f) = forced {
            let next = Position {
                mode: Mode::Forced {
                    branch: f,
                    entry: 0,
                },
                ..pos
            };
            return Plan {
                ambiguous,
                ..Self::moved(pos, next)
            };
        }
        if let Some(t) = terminal {
            let next = Position {
                mode: Mode::Terminal {
                    branch: t,
                    entry: 0,
                },
                ..pos
            };
            return Plan {
                ambiguous,
                ..Self::moved(pos, next)
            };
        }

        let hold_disabled = self
            .chapter
            .click_branches
            .get(branch)
            .and_then(|c| c.get(entry))
            .map(|n| n.disable_advance_by_hold)
            .unwrap_or(false);
        if hold_disabled {
            return Plan::ignore(pos, IgnoreReason::HoldDisabled);
        }
        self.back_to_main(pos)
    }

    fn plan_hold_in_main(&self, pos: Position) -> Plan {
        let len = self.chapter.main_sequence.len();
        let hold_disabled = self
            .chapter
            .main_sequence
            .get(pos.sequence_index)
            .map(|n| n.disable_advance_by_hold)
            .unwrap_or(false);
        if hold_disabled {
            return Plan::ignore(pos, IgnoreReason::HoldDisabled);
        }
        if pos.sequence_index + 1 >= len {
            return Plan::ignore(pos, IgnoreReason::EndOfSequence);
        }
        let next = Position {
            sequence_index: pos.sequence_index + 1,
            ..pos
        };
        Self::moved(pos, next)
    }
}
