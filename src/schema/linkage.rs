/// Linkage between forced/terminal branches and click-branch index ranges,
/// plus the container naming conventions that carry it on disk.
///
/// Authored names look like `F0 [H1.C0 1-2]`: base name, then the
/// referenced click branch and an inclusive entry range in brackets.
/// At load time the text is resolved into a typed [`Linkage`]; the textual
/// form only exists for import/export.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkageError {
    #[error("no bracketed linkage in '{0}'")]
    MissingBrackets(String),
    #[error("malformed linkage body '{0}': expected '<branch> <from>-<to>'")]
    MalformedBody(String),
    #[error("invalid range '{0}'")]
    BadRange(String),
    #[error("linkage references unknown click branch '{0}'")]
    UnknownBranch(String),
}

/// Typed link from a forced/terminal branch to an inclusive entry range
/// of one click branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Linkage {
    /// Index into the chapter's click branches.
    pub click_branch: usize,
    pub from: usize,
    pub to: usize,
}

impl Linkage {
    /// Returns true if `(branch, entry)` falls inside this range.
    pub fn contains(&self, branch: usize, entry: usize) -> bool {
        self.click_branch == branch && entry >= self.from && entry <= self.to
    }

    /// Returns true if both ranges share at least one entry of the same branch.
    pub fn overlaps(&self, other: &Linkage) -> bool {
        self.click_branch == other.click_branch && self.from <= other.to && other.from <= self.to
    }
}

/// The syntactic pieces of a linked container name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkageText<'a> {
    pub base: &'a str,
    pub branch_name: &'a str,
    pub from: usize,
    pub to: usize,
}

/// Split `<Name> [<ClickBranchName> <from>-<to>]` into its parts.
pub fn parse_linkage(name: &str) -> Result<LinkageText<'_>, LinkageError> {
    let open = name.find('[');
    let close = name.find(']');
    let (open, close) = match (open, close) {
        (Some(o), Some(c)) if c > o => (o, c),
        _ => return Err(LinkageError::MissingBrackets(name.to_string())),
    };

    let inside = name[open + 1..close].trim();
    let parts: Vec<&str> = inside.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(LinkageError::MalformedBody(inside.to_string()));
    }

    let bounds: Vec<&str> = parts[1].split('-').collect();
    if bounds.len() != 2 {
        return Err(LinkageError::BadRange(parts[1].to_string()));
    }
    let from: usize = bounds[0]
        .parse()
        .map_err(|_| LinkageError::BadRange(parts[1].to_string()))?;
    let to: usize = bounds[1]
        .parse()
        .map_err(|_| LinkageError::BadRange(parts[1].to_string()))?;
    if from > to {
        return Err(LinkageError::BadRange(parts[1].to_string()));
    }

    Ok(LinkageText {
        base: base_name(name),
        branch_name: parts[0],
        from,
        to,
    })
}

/// Parse a container name and resolve its branch reference against the
/// chapter's click branch names.
pub fn try_resolve_linkage<S: AsRef<str>>(
    name: &str,
    click_branch_names: &[S],
) -> Result<Linkage, LinkageError> {
    let text = parse_linkage(name)?;
    let click_branch = click_branch_names
        .iter()
        .position(|n| n.as_ref() == text.branch_name)
        .ok_or_else(|| LinkageError::UnknownBranch(text.branch_name.to_string()))?;
    Ok(Linkage {
        click_branch,
        from: text.from,
        to: text.to,
    })
}

/// Like [`try_resolve_linkage`], but any failure just means "unlinked".
pub fn resolve_linkage<S: AsRef<str>>(name: &str, click_branch_names: &[S]) -> Option<Linkage> {
    try_resolve_linkage(name, click_branch_names).ok()
}

/// The name without any bracketed suffix: `F0 [H1.C0 1-2]` → `F0`.
pub fn base_name(name: &str) -> &str {
    name.split_whitespace().next().unwrap_or("")
}

/// Write the linked form of a container name.
pub fn format_linkage(base: &str, branch_name: &str, from: usize, to: usize) -> String {
    format!("{} [{} {}-{}]", base, branch_name, from, to)
}

/// Smallest non-negative integer `n` such that no sibling is named
/// `prefix` + `n` (optionally followed by a non-word suffix such as a
/// linkage bracket). Gaps are reused: `{F0, F2}` yields 1.
pub fn find_first_unused_ordinal<'a, I>(existing_names: I, prefix: &str) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let used: rustc_hash::FxHashSet<usize> = existing_names
        .into_iter()
        .filter_map(|name| ordinal_of(name, prefix))
        .collect();

    let mut ordinal = 0;
    while used.contains(&ordinal) {
        ordinal += 1;
    }
    ordinal
}

fn ordinal_of(name: &str, prefix: &str) -> Option<usize> {
    let rest = name.strip_prefix(prefix)?;
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    // Digits must end at a word boundary: `F1x` is not ordinal 1.
    if let Some(next) = rest[digits_end..].chars().next() {
        if next.is_alphanumeric() || next == '_' {
            return None;
        }
    }
    rest[..digits_end].parse().ok()
}

pub const FORCED_PREFIX: &str = "F";
pub const TERMINAL_PREFIX: &str = "E";

/// Prefix shared by a chapter's click branches: `H<chapter>.C`.
pub fn click_branch_prefix(chapter: u32) -> String {
    format!("H{}.C", chapter)
}

pub fn click_branch_name(chapter: u32, ordinal: usize) -> String {
    format!("{}{}", click_branch_prefix(chapter), ordinal)
}

pub fn main_node_name(chapter: u32, index: usize) -> String {
    format!("h{}.s{}", chapter, index)
}

pub fn entry_name(container_name: &str, index: usize) -> String {
    format!("{}.{}", container_name, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRANCHES: [&str; 2] = ["H1.C0", "H1.C1"];

    #[test]
    fn parse_well_formed() {
        let text = parse_linkage("F0 [H1.C0 1-2]").unwrap();
        assert_eq!(text.base, "F0");
        assert_eq!(text.branch_name, "H1.C0");
        assert_eq!(text.from, 1);
        assert_eq!(text.to, 2);
    }

    #[test]
    fn resolve_against_known_branches() {
        let link = resolve_linkage("E3 [H1.C1 0-4]", &BRANCHES).unwrap();
        assert_eq!(
            link,
            Linkage {
                click_branch: 1,
                from: 0,
                to: 4
            }
        );
    }

    #[test]
    fn resolve_unknown_branch_is_none() {
        assert!(resolve_linkage("F0 [H2.C0 0-1]", &BRANCHES).is_none());
        assert_eq!(
            try_resolve_linkage("F0 [H2.C0 0-1]", &BRANCHES),
            Err(LinkageError::UnknownBranch("H2.C0".to_string()))
        );
    }

    #[test]
    fn malformed_names_are_none() {
        assert!(resolve_linkage("F0", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 ]H1.C0 0-1[", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 [H1.C0]", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 [H1.C0 a-1]", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 [H1.C0 1-2-3]", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 [H1.C0 3-1]", &BRANCHES).is_none());
        assert!(resolve_linkage("F0 [H1.C0 0-1 extra]", &BRANCHES).is_none());
    }

    #[test]
    fn linkage_error_kinds() {
        assert!(matches!(
            parse_linkage("F0"),
            Err(LinkageError::MissingBrackets(_))
        ));
        assert!(matches!(
            parse_linkage("F0 [H1.C0]"),
            Err(LinkageError::MalformedBody(_))
        ));
        assert!(matches!(
            parse_linkage("F0 [H1.C0 x-1]"),
            Err(LinkageError::BadRange(_))
        ));
    }

    #[test]
    fn contains_and_overlaps() {
        let a = Linkage {
            click_branch: 0,
            from: 1,
            to: 3,
        };
        assert!(a.contains(0, 1));
        assert!(a.contains(0, 3));
        assert!(!a.contains(0, 4));
        assert!(!a.contains(1, 2));

        let b = Linkage {
            click_branch: 0,
            from: 3,
            to: 5,
        };
        let c = Linkage {
            click_branch: 0,
            from: 4,
            to: 5,
        };
        let d = Linkage {
            click_branch: 1,
            from: 1,
            to: 3,
        };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn first_unused_ordinal_fills_gaps() {
        assert_eq!(find_first_unused_ordinal(["F0", "F1", "F3"], "F"), 2);
        assert_eq!(find_first_unused_ordinal(["F0", "F2"], "F"), 1);
        assert_eq!(find_first_unused_ordinal(Vec::<&str>::new(), "F"), 0);
    }

    #[test]
    fn first_unused_ordinal_reads_linked_names() {
        let names = ["F0 [H1.C0 1-2]", "F1 [H1.C1 0-0]", "E0"];
        assert_eq!(find_first_unused_ordinal(names, FORCED_PREFIX), 2);
        assert_eq!(find_first_unused_ordinal(names, TERMINAL_PREFIX), 1);
    }

    #[test]
    fn first_unused_ordinal_ignores_non_matching() {
        let names = ["H1.C0", "H1.C1", "H2.C2", "H1.Cx", "H1.C3b"];
        assert_eq!(find_first_unused_ordinal(names, &click_branch_prefix(1)), 2);
    }

    #[test]
    fn naming_conventions() {
        assert_eq!(click_branch_name(1, 0), "H1.C0");
        assert_eq!(main_node_name(2, 5), "h2.s5");
        assert_eq!(entry_name("F0 [H1.C0 1-2]", 3), "F0 [H1.C0 1-2].3");
        assert_eq!(format_linkage("E1", "H1.C0", 2, 2), "E1 [H1.C0 2-2]");
        assert_eq!(base_name("E1 [H1.C0 2-2]"), "E1");
    }

    #[test]
    fn formatted_linkage_parses_back() {
        let name = format_linkage("F4", "H1.C1", 0, 3);
        let link = resolve_linkage(&name, &BRANCHES).unwrap();
        assert_eq!((link.click_branch, link.from, link.to), (1, 0, 3));
    }
}
