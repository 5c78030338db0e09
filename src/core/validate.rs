/// Content checks for authored chapters: everything that would strand the
/// player or make branch selection ambiguous at runtime.

use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;

use crate::schema::container::{Chapter, ContainerRef, Story};
use crate::schema::linkage::{try_resolve_linkage, Linkage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub chapter: u32,
    /// Container or node the issue is about, if any.
    pub location: Option<String>,
    pub message: String,
}

impl Issue {
    fn new(severity: Severity, chapter: u32, location: Option<String>, message: String) -> Self {
        Self {
            severity,
            chapter,
            location,
            message,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        match &self.location {
            Some(location) => write!(
                f,
                "{}: chapter {}, {}: {}",
                label, self.chapter, location, self.message
            ),
            None => write!(f, "{}: chapter {}: {}", label, self.chapter, self.message),
        }
    }
}

fn container_location(cref: ContainerRef, name: &str) -> String {
    let kind = match cref {
        ContainerRef::Main => return "main sequence".to_string(),
        ContainerRef::Click(i) => format!("click branch {}", i),
        ContainerRef::Forced(i) => format!("forced branch {}", i),
        ContainerRef::Terminal(i) => format!("terminal branch {}", i),
    };
    format!("{} '{}'", kind, name)
}

/// Check one chapter in isolation.
pub fn validate(chapter: &Chapter) -> Vec<Issue> {
    let mut issues = Vec::new();
    let number = chapter.number;

    if chapter.main_sequence.is_empty() {
        issues.push(Issue::new(
            Severity::Error,
            number,
            None,
            "main sequence is empty, the chapter has no start node".to_string(),
        ));
    }

    // Dead ends
    for (slot, node) in chapter.nodes() {
        if node.is_dead_end() {
            issues.push(Issue::new(
                Severity::Warning,
                number,
                Some(format!("{} '{}'", slot, node.name)),
                "both hold and click advance are disabled, the player is stranded here"
                    .to_string(),
            ));
        }
    }

    // Empty branches
    for (cref, container) in chapter.containers().skip(1) {
        if container.is_empty() {
            issues.push(Issue::new(
                Severity::Warning,
                number,
                Some(container_location(cref, &container.name)),
                "branch has no entries and will never be shown".to_string(),
            ));
        }
    }

    check_linkages(chapter, &mut issues);
    check_overlaps(chapter, &mut issues);

    // Duplicate ids
    let mut seen: FxHashMap<u64, String> = FxHashMap::default();
    for (slot, node) in chapter.nodes() {
        if let Some(first) = seen.insert(node.id.0, slot.to_string()) {
            issues.push(Issue::new(
                Severity::Error,
                number,
                Some(format!("{} '{}'", slot, node.name)),
                format!("node id {} is already used at {}", node.id.0, first),
            ));
        }
    }

    if let Some(trigger) = chapter.next_chapter_trigger {
        if chapter.find_node(trigger).is_none() {
            issues.push(Issue::new(
                Severity::Error,
                number,
                None,
                format!("next chapter trigger refers to unknown node id {}", trigger.0),
            ));
        }
    }

    check_penalty_mappings(chapter, &mut issues);

    issues
}

fn check_penalty_mappings(chapter: &Chapter, issues: &mut Vec<Issue>) {
    let mut previous: Option<u32> = None;
    for (i, mapping) in chapter.penalty_mappings.iter().enumerate() {
        let location = Some(format!("penalty mapping {}", i));
        let required = mapping.required_clicks;
        if required == 0 {
            issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location.clone(),
                "requires 0 penalty clicks and is never reached".to_string(),
            ));
        }
        match previous {
            Some(prev) if prev == required => issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location.clone(),
                format!(
                    "duplicate threshold of {} penalty clicks, only the first mapping is used",
                    required
                ),
            )),
            Some(prev) if prev > required => issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location.clone(),
                format!(
                    "threshold {} follows {}, mappings are not sorted",
                    required, prev
                ),
            )),
            _ => {}
        }
        previous = Some(previous.map_or(required, |prev| prev.max(required)));
        if chapter.find_node(mapping.target).is_none() {
            issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location,
                format!("penalty target refers to unknown node id {}", mapping.target.0),
            ));
        }
    }
}

fn check_linkages(chapter: &Chapter, issues: &mut Vec<Issue>) {
    let names: Vec<&str> = chapter
        .click_branches
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    for (cref, container) in chapter.containers() {
        if !container.kind.is_linked() {
            continue;
        }
        let location = Some(container_location(cref, &container.name));
        let link = match try_resolve_linkage(&container.name, &names) {
            Ok(link) => link,
            Err(e) => {
                issues.push(Issue::new(
                    Severity::Warning,
                    chapter.number,
                    location,
                    format!("branch is inert: {}", e),
                ));
                continue;
            }
        };

        let branch_len = chapter
            .click_branches
            .get(link.click_branch)
            .map(|c| c.len())
            .unwrap_or(0);
        if link.from >= branch_len {
            issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location,
                format!(
                    "range {}-{} starts past the end of '{}' ({} entries), branch never triggers",
                    link.from, link.to, names[link.click_branch], branch_len
                ),
            ));
        } else if link.to >= branch_len {
            issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                location,
                format!(
                    "range {}-{} reaches past the end of '{}' ({} entries)",
                    link.from, link.to, names[link.click_branch], branch_len
                ),
            ));
        }
    }
}

/// Two linked branches claiming one click-branch entry are ambiguous.
fn check_overlaps(chapter: &Chapter, issues: &mut Vec<Issue>) {
    let linked: Vec<(ContainerRef, &str, Linkage)> = chapter
        .containers()
        .filter_map(|(cref, c)| c.linkage.map(|link| (cref, c.name.as_str(), link)))
        .collect();

    for (i, (a_ref, a_name, a_link)) in linked.iter().enumerate() {
        for (b_ref, b_name, b_link) in &linked[i + 1..] {
            if a_link.overlaps(b_link) {
                issues.push(Issue::new(
                    Severity::Error,
                    chapter.number,
                    Some(container_location(*a_ref, a_name)),
                    format!(
                        "range overlaps {}, selection between them is ambiguous",
                        container_location(*b_ref, b_name)
                    ),
                ));
            }
        }
    }
}

/// Check every chapter plus the links between them.
pub fn validate_story(story: &Story) -> Vec<Issue> {
    let mut issues = Vec::new();
    let chapters = story.chapters();
    for (i, chapter) in chapters.iter().enumerate() {
        issues.extend(validate(chapter));
        if chapter.next_chapter_trigger.is_some() && i + 1 == chapters.len() {
            issues.push(Issue::new(
                Severity::Warning,
                chapter.number,
                None,
                "next chapter trigger is set but no chapter follows".to_string(),
            ));
        }
    }
    issues
}

/// Count issues by severity: `(errors, warnings)`.
pub fn tally(issues: &[Issue]) -> (usize, usize) {
    let errors = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count();
    (errors, issues.len() - errors)
}
