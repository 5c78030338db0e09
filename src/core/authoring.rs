/// Authoring operations on chapter content.
///
/// These keep the naming convention intact: main nodes are `h<ch>.s<i>`,
/// click branches `H<ch>.C<n>`, forced and terminal branches `F<n>` and
/// `E<n>` (plus a `[<branch> <from>-<to>]` suffix once linked), and every
/// branch entry is `<container name>.<i>`.

use log::info;
use thiserror::Error;

use crate::schema::container::{Chapter, Container, ContainerKind, ContainerRef, Slot};
use crate::schema::linkage::{
    base_name, click_branch_name, click_branch_prefix, entry_name, find_first_unused_ordinal,
    format_linkage, main_node_name, Linkage, FORCED_PREFIX, TERMINAL_PREFIX,
};
use crate::schema::node::{ContentNode, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthoringError {
    #[error("no container at {0:?}")]
    UnknownContainer(ContainerRef),
    #[error("click branch {0} does not exist")]
    UnknownClickBranch(usize),
    #[error("invalid entry range {from}-{to}")]
    InvalidRange { from: usize, to: usize },
}

/// Append a node to the main sequence.
pub fn add_main_node(chapter: &mut Chapter) -> Slot {
    let index = chapter.main_sequence.len();
    let node = ContentNode::new(
        chapter.next_node_id(),
        main_node_name(chapter.number, index),
        "",
    );
    chapter.main_sequence.nodes.push(node);
    Slot::new(ContainerRef::Main, index)
}

/// Create `H<ch>.C<n>` with the first free `n` and one entry.
pub fn add_click_branch(chapter: &mut Chapter) -> usize {
    let prefix = click_branch_prefix(chapter.number);
    let ordinal = find_first_unused_ordinal(
        chapter.click_branches.iter().map(|c| c.name.as_str()),
        &prefix,
    );
    let name = click_branch_name(chapter.number, ordinal);
    let first = ContentNode::new(chapter.next_node_id(), entry_name(&name, 0), "");
    let mut container = Container::new(ContainerKind::ClickBranch, name);
    container.nodes.push(first);
    chapter.click_branches.push(container);

    // Linkage indexes point into the click branch list
    chapter.resolve_linkages();
    chapter.click_branches.len() - 1
}

/// Create an unlinked `F<n>` with one entry.
pub fn add_forced_branch(chapter: &mut Chapter) -> usize {
    let id = chapter.next_node_id();
    add_linked_kind(&mut chapter.forced_branches, ContainerKind::ForcedBranch, FORCED_PREFIX, id)
}

/// Create an unlinked `E<n>` with one entry.
pub fn add_terminal_branch(chapter: &mut Chapter) -> usize {
    let id = chapter.next_node_id();
    add_linked_kind(
        &mut chapter.terminal_branches,
        ContainerKind::TerminalBranch,
        TERMINAL_PREFIX,
        id,
    )
}

fn add_linked_kind(
    list: &mut Vec<Container>,
    kind: ContainerKind,
    prefix: &str,
    id: NodeId,
) -> usize {
    let ordinal = find_first_unused_ordinal(list.iter().map(|c| c.name.as_str()), prefix);
    let name = format!("{}{}", prefix, ordinal);
    let mut container = Container::new(kind, name.as_str());
    container.nodes.push(ContentNode::new(id, entry_name(&name, 0), ""));
    list.push(container);
    list.len() - 1
}

/// Append an entry to any container. Branch entries are named after their
/// container and do not open click branches.
pub fn add_entry(chapter: &mut Chapter, container: ContainerRef) -> Result<Slot, AuthoringError> {
    if container == ContainerRef::Main {
        return Ok(add_main_node(chapter));
    }
    let id = chapter.next_node_id();
    let target = chapter
        .container_mut(container)
        .ok_or(AuthoringError::UnknownContainer(container))?;

    let index = target.len();
    let name = entry_name(&target.name, index);
    let mut node = ContentNode::new(id, name.as_str(), "");
    node.counts_as_click = false;
    if target.kind == ContainerKind::ClickBranch {
        node.text = name;
    }
    target.nodes.push(node);
    Ok(Slot::new(container, index))
}

/// Point forced branch `index` at an entry range of a click branch.
pub fn link_forced_branch(
    chapter: &mut Chapter,
    index: usize,
    click_branch: usize,
    from: usize,
    to: usize,
) -> Result<(), AuthoringError> {
    link_branch(chapter, ContainerRef::Forced(index), click_branch, from, to)
}

/// Point terminal branch `index` at an entry range of a click branch.
pub fn link_terminal_branch(
    chapter: &mut Chapter,
    index: usize,
    click_branch: usize,
    from: usize,
    to: usize,
) -> Result<(), AuthoringError> {
    link_branch(chapter, ContainerRef::Terminal(index), click_branch, from, to)
}

/// Write `<base> [<branch> <from>-<to>]` into the container name and
/// rename every child to match.
fn link_branch(
    chapter: &mut Chapter,
    container: ContainerRef,
    click_branch: usize,
    from: usize,
    to: usize,
) -> Result<(), AuthoringError> {
    if from > to {
        return Err(AuthoringError::InvalidRange { from, to });
    }
    let branch_name = chapter
        .click_branches
        .get(click_branch)
        .map(|c| c.name.clone())
        .ok_or(AuthoringError::UnknownClickBranch(click_branch))?;
    let target = chapter
        .container_mut(container)
        .ok_or(AuthoringError::UnknownContainer(container))?;

    let name = format_linkage(base_name(&target.name), &branch_name, from, to);
    for (i, node) in target.nodes.iter_mut().enumerate() {
        node.name = entry_name(&name, i);
    }
    info!("{} '{}' renamed to '{}'", target.kind.label(), target.name, name);
    target.name = name;
    target.linkage = Some(Linkage {
        click_branch,
        from,
        to,
    });
    Ok(())
}

/// Give every node with blank text its own name as text. Returns how many
/// nodes changed.
pub fn fill_empty_text_from_names(chapter: &mut Chapter) -> usize {
    let mut count = 0;
    let lists = std::iter::once(&mut chapter.main_sequence)
        .chain(chapter.click_branches.iter_mut())
        .chain(chapter.forced_branches.iter_mut())
        .chain(chapter.terminal_branches.iter_mut());
    for container in lists {
        for node in container.nodes.iter_mut() {
            if node.text.trim().is_empty() {
                node.text = node.name.clone();
                count += 1;
            }
        }
    }
    info!("chapter {}: filled text for {} empty nodes", chapter.number, count);
    count
}
