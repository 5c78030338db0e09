/// Content containers, chapters and the story they form: types, RON
/// loading and saving.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

use super::linkage::{try_resolve_linkage, Linkage};
use super::node::{ContentNode, NodeId};

#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonWrite(#[from] ron::Error),
    #[error("chapter {0} is defined more than once")]
    DuplicateChapter(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    MainSequence,
    ClickBranch,
    ForcedBranch,
    TerminalBranch,
}

impl ContainerKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MainSequence => "main sequence",
            Self::ClickBranch => "click branch",
            Self::ForcedBranch => "forced branch",
            Self::TerminalBranch => "terminal branch",
        }
    }

    /// Forced and terminal branches carry a linkage to a click branch.
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::ForcedBranch | Self::TerminalBranch)
    }
}

/// An ordered list of nodes. Order is significant.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub kind: ContainerKind,
    /// Authored name; for linked kinds this includes the bracketed suffix.
    pub name: String,
    /// Resolved from `name`. `None` leaves a forced/terminal branch inert.
    pub linkage: Option<Linkage>,
    pub nodes: Vec<ContentNode>,
}

impl Container {
    pub fn new(kind: ContainerKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            linkage: None,
            nodes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ContentNode> {
        self.nodes.get(index)
    }
}

/// Which container of a chapter a position refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerRef {
    Main,
    Click(usize),
    Forced(usize),
    Terminal(usize),
}

/// A node address inside a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub container: ContainerRef,
    pub index: usize,
}

impl Slot {
    pub fn new(container: ContainerRef, index: usize) -> Self {
        Self { container, index }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container {
            ContainerRef::Main => write!(f, "main[{}]", self.index),
            ContainerRef::Click(b) => write!(f, "click{}[{}]", b, self.index),
            ContainerRef::Forced(b) => write!(f, "forced{}[{}]", b, self.index),
            ContainerRef::Terminal(b) => write!(f, "terminal{}[{}]", b, self.index),
        }
    }
}

/// All content of one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub number: u32,
    pub main_sequence: Container,
    pub click_branches: Vec<Container>,
    pub forced_branches: Vec<Container>,
    pub terminal_branches: Vec<Container>,
    /// Reaching this node hands over to the next chapter.
    pub next_chapter_trigger: Option<NodeId>,
    /// Sorted by `required_clicks` once loaded.
    pub penalty_mappings: Vec<PenaltyMapping>,
}

/// Penalty node reached once the story-wide penalty click count hits
/// `required_clicks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyMapping {
    pub required_clicks: u32,
    pub target: NodeId,
    /// Move one main-sequence node further on return from the penalty node.
    #[serde(default)]
    pub advance_after_return: bool,
}

// RON shape: containers are written by name only; linkage is recovered
// from the names at load time.

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Container")]
struct RonContainer {
    name: String,
    #[serde(default)]
    nodes: Vec<ContentNode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Chapter")]
struct RonChapter {
    number: u32,
    #[serde(default)]
    next_chapter_trigger: Option<NodeId>,
    #[serde(default)]
    main_sequence: Vec<ContentNode>,
    #[serde(default)]
    click_branches: Vec<RonContainer>,
    #[serde(default)]
    forced_branches: Vec<RonContainer>,
    #[serde(default)]
    terminal_branches: Vec<RonContainer>,
    #[serde(default)]
    penalty_mappings: Vec<PenaltyMapping>,
}

pub const MAIN_SEQUENCE_NAME: &str = "MainSequence";

impl Chapter {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            main_sequence: Container::new(ContainerKind::MainSequence, MAIN_SEQUENCE_NAME),
            click_branches: Vec::new(),
            forced_branches: Vec::new(),
            terminal_branches: Vec::new(),
            next_chapter_trigger: None,
            penalty_mappings: Vec::new(),
        }
    }

    /// Load a chapter from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Chapter, ChapterError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a chapter from a RON string.
    pub fn parse_ron(input: &str) -> Result<Chapter, ChapterError> {
        let raw: RonChapter = ron::from_str(input)?;

        let convert = |kind: ContainerKind, list: Vec<RonContainer>| -> Vec<Container> {
            list.into_iter()
                .map(|c| Container {
                    kind,
                    name: c.name,
                    linkage: None,
                    nodes: c.nodes,
                })
                .collect()
        };

        let mut chapter = Chapter {
            number: raw.number,
            main_sequence: Container {
                kind: ContainerKind::MainSequence,
                name: MAIN_SEQUENCE_NAME.to_string(),
                linkage: None,
                nodes: raw.main_sequence,
            },
            click_branches: convert(ContainerKind::ClickBranch, raw.click_branches),
            forced_branches: convert(ContainerKind::ForcedBranch, raw.forced_branches),
            terminal_branches: convert(ContainerKind::TerminalBranch, raw.terminal_branches),
            next_chapter_trigger: raw.next_chapter_trigger,
            penalty_mappings: raw.penalty_mappings,
        };
        chapter.sort_penalty_mappings();
        chapter.resolve_linkages();
        Ok(chapter)
    }

    /// Serialize back to the RON shape accepted by [`Chapter::parse_ron`].
    pub fn to_ron(&self) -> Result<String, ChapterError> {
        let convert = |list: &[Container]| -> Vec<RonContainer> {
            list.iter()
                .map(|c| RonContainer {
                    name: c.name.clone(),
                    nodes: c.nodes.clone(),
                })
                .collect()
        };
        let raw = RonChapter {
            number: self.number,
            next_chapter_trigger: self.next_chapter_trigger,
            main_sequence: self.main_sequence.nodes.clone(),
            click_branches: convert(&self.click_branches),
            forced_branches: convert(&self.forced_branches),
            terminal_branches: convert(&self.terminal_branches),
            penalty_mappings: self.penalty_mappings.clone(),
        };
        let pretty = ron::ser::PrettyConfig::new().struct_names(true);
        Ok(ron::ser::to_string_pretty(&raw, pretty)?)
    }

    /// Recompute every forced/terminal linkage from the container names.
    /// Unparsable or dangling names leave the branch inert.
    pub fn resolve_linkages(&mut self) {
        let names: Vec<String> = self.click_branches.iter().map(|c| c.name.clone()).collect();
        let number = self.number;
        for container in self
            .forced_branches
            .iter_mut()
            .chain(self.terminal_branches.iter_mut())
        {
            container.linkage = match try_resolve_linkage(&container.name, &names) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!(
                        "chapter {}: {} '{}' is inert: {}",
                        number,
                        container.kind.label(),
                        container.name,
                        e
                    );
                    None
                }
            };
        }
    }

    /// Order mappings by required click count. Equal counts keep their
    /// authored order, so the first one wins.
    pub fn sort_penalty_mappings(&mut self) {
        self.penalty_mappings.sort_by_key(|m| m.required_clicks);
    }

    /// The mapping whose threshold is exactly `total` penalty clicks.
    pub fn penalty_mapping_at(&self, total: u32) -> Option<&PenaltyMapping> {
        self.penalty_mappings
            .iter()
            .find(|m| m.required_clicks == total)
    }

    pub fn container(&self, container: ContainerRef) -> Option<&Container> {
        match container {
            ContainerRef::Main => Some(&self.main_sequence),
            ContainerRef::Click(i) => self.click_branches.get(i),
            ContainerRef::Forced(i) => self.forced_branches.get(i),
            ContainerRef::Terminal(i) => self.terminal_branches.get(i),
        }
    }

    pub fn container_mut(&mut self, container: ContainerRef) -> Option<&mut Container> {
        match container {
            ContainerRef::Main => Some(&mut self.main_sequence),
            ContainerRef::Click(i) => self.click_branches.get_mut(i),
            ContainerRef::Forced(i) => self.forced_branches.get_mut(i),
            ContainerRef::Terminal(i) => self.terminal_branches.get_mut(i),
        }
    }

    pub fn node(&self, slot: Slot) -> Option<&ContentNode> {
        self.container(slot.container)?.get(slot.index)
    }

    /// Every container with its address, main sequence first.
    pub fn containers(&self) -> impl Iterator<Item = (ContainerRef, &Container)> {
        std::iter::once((ContainerRef::Main, &self.main_sequence))
            .chain(
                self.click_branches
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (ContainerRef::Click(i), c)),
            )
            .chain(
                self.forced_branches
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (ContainerRef::Forced(i), c)),
            )
            .chain(
                self.terminal_branches
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (ContainerRef::Terminal(i), c)),
            )
    }

    /// Every node with its slot.
    pub fn nodes(&self) -> impl Iterator<Item = (Slot, &ContentNode)> {
        self.containers().flat_map(|(cref, c)| {
            c.nodes
                .iter()
                .enumerate()
                .map(move |(i, n)| (Slot::new(cref, i), n))
        })
    }

    pub fn find_node(&self, id: NodeId) -> Option<Slot> {
        self.nodes().find(|(_, n)| n.id == id).map(|(slot, _)| slot)
    }

    /// Next free node id: one past the largest in use.
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.nodes().map(|(_, n)| n.id.0 + 1).max().unwrap_or(0))
    }
}

/// The ordered chapters of a story.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Story {
    chapters: Vec<Chapter>,
}

impl Story {
    /// Build a story; chapters are ordered by number.
    pub fn new(mut chapters: Vec<Chapter>) -> Result<Story, ChapterError> {
        chapters.sort_by_key(|c| c.number);
        for pair in chapters.windows(2) {
            if pair[0].number == pair[1].number {
                return Err(ChapterError::DuplicateChapter(pair[0].number));
            }
        }
        Ok(Story { chapters })
    }

    /// Load every `.ron` file in a directory as one chapter.
    pub fn load_from_dir(dir: &Path) -> Result<Story, ChapterError> {
        let mut chapters = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                chapters.push(Chapter::load_from_ron(&path)?);
            }
        }
        Self::new(chapters)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn get(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}
