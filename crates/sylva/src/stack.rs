//! The graph-structured parse stack.
//!
//! Frames live in an arena (`Vec` + free list) and are reference-counted;
//! links point from a frame toward the bottom of the stack and carry the
//! tree pushed on that edge. A *version* is an index into the table of live
//! frontier frames. Versions fork when a pop follows multiple paths through
//! shared frames and merge again when two frontiers agree on state and
//! position; a merged frame keeps one link per distinct edge, which is what
//! defers ambiguity resolution to tree selection at the next reduce.
//!
//! An edge whose tree is `None` is an error frame: pops that count trees
//! stop there and report it, and recovery machinery walks the content below
//! it separately.

use std::io;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::language::{Language, StateId};
use crate::syntax::Length;
use crate::tree::Tree;

pub type StackVersion = usize;

const MAX_LINK_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeId(u32);

#[derive(Clone)]
struct StackLink {
    prev: NodeId,
    tree: Option<Arc<Tree>>,
    is_pending: bool,
}

struct StackNode {
    state: StateId,
    position: Length,
    links: SmallVec<[StackLink; 2]>,
    ref_count: u32,
}

/// One path through the stack materialized by a pop. Trees are in
/// left-to-right order and ownership transfers to the caller.
#[derive(Debug)]
pub struct StackSlice {
    pub version: StackVersion,
    pub trees: Vec<Arc<Tree>>,
}

#[derive(Debug)]
pub enum PopResult {
    Slices(Vec<StackSlice>),
    /// The walk crossed an error frame before reaching its goal. The
    /// slice's (new) version sits below the error frame and its trees are
    /// the frames traversed above it.
    StoppedAtError(StackSlice),
}

/// Callback verdict for [`Stack::iterate`]: materialize this path as a
/// slice, halt this path, neither, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterateAction {
    pub pop: bool,
    pub stop: bool,
}

impl IterateAction {
    pub const NONE: Self = Self {
        pop: false,
        stop: false,
    };
}

#[derive(Clone)]
struct StackIterator {
    node: NodeId,
    /// Trees collected walking down from the head: index 0 is the topmost.
    trees: Vec<Arc<Tree>>,
    /// Non-extra trees collected (error frames count too).
    tree_count: usize,
    is_pending: bool,
}

pub struct Stack {
    nodes: Vec<StackNode>,
    free: Vec<NodeId>,
    heads: Vec<NodeId>,
    base: NodeId,
    max_iterators: usize,
}

impl Stack {
    /// `max_iterators` bounds concurrent pop paths; excess forks are
    /// silently dropped.
    #[must_use]
    pub fn new(start_state: StateId, max_iterators: usize) -> Self {
        let base = NodeId(0);
        let mut stack = Self {
            nodes: vec![StackNode {
                state: start_state,
                position: Length::ZERO,
                links: SmallVec::new(),
                ref_count: 1,
            }],
            free: Vec::new(),
            heads: Vec::new(),
            base,
            max_iterators: max_iterators.max(1),
        };
        stack.retain(base);
        stack.heads.push(base);
        stack
    }

    /// Drop every version and start over with one frontier at the base.
    pub fn clear(&mut self) {
        let heads = std::mem::take(&mut self.heads);
        for head in heads {
            self.release(head);
        }
        self.retain(self.base);
        self.heads.push(self.base);
    }

    #[must_use]
    pub fn version_count(&self) -> usize {
        self.heads.len()
    }

    #[must_use]
    pub fn top_state(&self, version: StackVersion) -> StateId {
        self.node(self.heads[version]).state
    }

    #[must_use]
    pub fn top_position(&self, version: StackVersion) -> Length {
        self.node(self.heads[version]).position
    }

    /// Append a frame. A `None` tree makes an error frame and leaves the
    /// position unchanged.
    pub fn push(
        &mut self,
        version: StackVersion,
        tree: Option<Arc<Tree>>,
        is_pending: bool,
        state: StateId,
    ) {
        let head = self.heads[version];
        let position = self.node(head).position
            + tree.as_ref().map_or(Length::ZERO, |tree| tree.total_size());
        let node = self.alloc(StackNode {
            state,
            position,
            links: SmallVec::from_iter([StackLink {
                prev: head,
                tree,
                is_pending,
            }]),
            ref_count: 1,
        });
        // The head slot's reference to the previous frame moves into the
        // new frame's link.
        self.heads[version] = node;
    }

    pub fn duplicate_version(&mut self, version: StackVersion) -> StackVersion {
        let head = self.heads[version];
        self.retain(head);
        self.heads.push(head);
        self.heads.len() - 1
    }

    /// Replace `to` with `from`'s frontier and erase `from`'s slot.
    /// Requires `to < from`; version indices above `from` shift down.
    pub fn renumber_version(&mut self, from: StackVersion, to: StackVersion) {
        if from == to {
            return;
        }
        debug_assert!(to < from);
        let old = self.heads[to];
        self.heads[to] = self.heads[from];
        self.heads.remove(from);
        self.release(old);
    }

    pub fn remove_version(&mut self, version: StackVersion) {
        let head = self.heads.remove(version);
        self.release(head);
    }

    #[must_use]
    pub fn can_merge(&self, left: StackVersion, right: StackVersion) -> bool {
        let a = self.node(self.heads[left]);
        let b = self.node(self.heads[right]);
        a.state == b.state && a.position == b.position
    }

    /// Fold `right` into `left` when both frontiers agree on state and
    /// position: `right`'s edges are unioned into `left`'s frame and
    /// `right`'s slot is removed.
    pub fn merge(&mut self, left: StackVersion, right: StackVersion) -> bool {
        if !self.can_merge(left, right) {
            return false;
        }
        let target = self.heads[left];
        let links: Vec<StackLink> = self.node(self.heads[right]).links.iter().cloned().collect();
        for link in links {
            self.add_link(target, link);
        }
        self.remove_version(right);
        true
    }

    /// Merge any matching version pairs with indices `>= start`.
    pub fn merge_from(&mut self, start: StackVersion) {
        let mut i = start.max(1);
        while i < self.heads.len() {
            let mut merged = false;
            for j in start..i {
                if self.merge(j, i) {
                    merged = true;
                    break;
                }
            }
            if !merged {
                i += 1;
            }
        }
    }

    /// Merge every compatible version pair, lowest index winning. Returns
    /// whether anything changed.
    pub fn condense(&mut self) -> bool {
        let mut changed = false;
        let mut i = 1;
        while i < self.heads.len() {
            let mut merged = false;
            for j in 0..i {
                if self.merge(j, i) {
                    merged = true;
                    changed = true;
                    break;
                }
            }
            if !merged {
                i += 1;
            }
        }
        changed
    }

    /// Detach the top `count` non-extra frames along `version`, one slice
    /// per distinct path. Crossing an error frame first aborts the pop.
    pub fn pop_count(&mut self, version: StackVersion, count: usize) -> PopResult {
        self.walk(version, true, |_, _, tree_count, _, _| IterateAction {
            pop: tree_count == count,
            stop: tree_count == count,
        })
    }

    /// Pop the top essential tree (and extras above it) while its edge is
    /// pending. The first slice is renumbered back onto `version`.
    pub fn pop_pending(&mut self, version: StackVersion) -> Vec<StackSlice> {
        let result = self.walk(version, false, |_, _, tree_count, _, is_pending| {
            if tree_count >= 1 {
                IterateAction {
                    pop: is_pending,
                    stop: true,
                }
            } else {
                IterateAction::NONE
            }
        });
        let PopResult::Slices(mut slices) = result else {
            return Vec::new();
        };
        if let Some(first) = slices.first() {
            let renumbered = first.version;
            self.renumber_version(renumbered, version);
            slices[0].version = version;
            for slice in &mut slices[1..] {
                if slice.version == renumbered {
                    slice.version = version;
                } else if slice.version > renumbered {
                    slice.version -= 1;
                }
            }
        }
        slices
    }

    /// Pop every frame down to the base.
    pub fn pop_all(&mut self, version: StackVersion) -> Vec<StackSlice> {
        match self.walk(version, false, |_, _, _, is_done, _| IterateAction {
            pop: is_done,
            stop: false,
        }) {
            PopResult::Slices(slices) => slices,
            PopResult::StoppedAtError(slice) => vec![slice],
        }
    }

    /// Walk paths from `version`, invoking the callback at each visited
    /// frame with `(state, trees-so-far (topmost first), non-extra tree
    /// count, is_done, is_pending)`, honoring its verdict.
    pub fn iterate<F>(&mut self, version: StackVersion, callback: F) -> Vec<StackSlice>
    where
        F: FnMut(StateId, &[Arc<Tree>], usize, bool, bool) -> IterateAction,
    {
        match self.walk(version, false, callback) {
            PopResult::Slices(slices) => slices,
            PopResult::StoppedAtError(slice) => vec![slice],
        }
    }

    fn walk<F>(&mut self, version: StackVersion, stop_at_error: bool, mut callback: F) -> PopResult
    where
        F: FnMut(StateId, &[Arc<Tree>], usize, bool, bool) -> IterateAction,
    {
        let initial_version_count = self.heads.len();
        let mut slices: Vec<StackSlice> = Vec::new();
        let mut iterators = vec![StackIterator {
            node: self.heads[version],
            trees: Vec::new(),
            tree_count: 0,
            is_pending: true,
        }];

        while !iterators.is_empty() {
            let mut survivors: Vec<StackIterator> = Vec::new();
            let mut forks: Vec<StackIterator> = Vec::new();

            for mut iterator in iterators {
                let node_id = iterator.node;
                let (state, is_root) = {
                    let node = self.node(node_id);
                    (node.state, node.links.is_empty())
                };

                let action = callback(
                    state,
                    &iterator.trees,
                    iterator.tree_count,
                    is_root,
                    iterator.is_pending,
                );
                let should_stop = action.stop || is_root;

                if action.pop {
                    let mut trees = if should_stop {
                        std::mem::take(&mut iterator.trees)
                    } else {
                        iterator.trees.clone()
                    };
                    trees.reverse();
                    self.add_slice(&mut slices, node_id, trees);
                }
                if should_stop {
                    continue;
                }

                let links: SmallVec<[StackLink; 2]> =
                    self.node(node_id).links.iter().cloned().collect();

                if stop_at_error
                    && let Some(link) = links.iter().find(|link| link.tree.is_none())
                {
                    // Abandon any paths already materialized: their trees
                    // drop here and their versions are retracted.
                    drop(slices);
                    while self.heads.len() > initial_version_count {
                        self.remove_version(self.heads.len() - 1);
                    }
                    let mut trees = std::mem::take(&mut iterator.trees);
                    trees.reverse();
                    let below = self.add_version(link.prev);
                    return PopResult::StoppedAtError(StackSlice {
                        version: below,
                        trees,
                    });
                }

                for link in links.iter().skip(1) {
                    if survivors.len() + forks.len() + 1 >= self.max_iterators {
                        break;
                    }
                    let mut fork = iterator.clone();
                    Self::follow_link(&mut fork, link);
                    forks.push(fork);
                }
                Self::follow_link(&mut iterator, &links[0]);
                survivors.push(iterator);
            }

            survivors.extend(forks);
            iterators = survivors;
        }

        PopResult::Slices(slices)
    }

    fn follow_link(iterator: &mut StackIterator, link: &StackLink) {
        iterator.node = link.prev;
        match &link.tree {
            Some(tree) => {
                iterator.trees.push(Arc::clone(tree));
                if !tree.extra {
                    iterator.tree_count += 1;
                    if !link.is_pending {
                        iterator.is_pending = false;
                    }
                }
            }
            None => {
                iterator.tree_count += 1;
                iterator.is_pending = false;
            }
        }
    }

    /// Paths ending at the same frame share one version; slices of one pop
    /// keep same-version entries adjacent.
    fn add_slice(&mut self, slices: &mut Vec<StackSlice>, node: NodeId, trees: Vec<Arc<Tree>>) {
        if let Some(pos) = slices
            .iter()
            .rposition(|slice| self.heads[slice.version] == node)
        {
            let version = slices[pos].version;
            slices.insert(pos + 1, StackSlice { version, trees });
        } else {
            let version = self.add_version(node);
            slices.push(StackSlice { version, trees });
        }
    }

    fn add_version(&mut self, node: NodeId) -> StackVersion {
        self.retain(node);
        self.heads.push(node);
        self.heads.len() - 1
    }

    /// Union a link into a frame: identical edges deduplicate, equivalent
    /// edges to matching frames fold their predecessors together, and
    /// frames keep at most [`MAX_LINK_COUNT`] links.
    fn add_link(&mut self, target: NodeId, link: StackLink) {
        if link.prev == target {
            return;
        }
        for index in 0..self.node(target).links.len() {
            let existing = self.node(target).links[index].clone();
            if !trees_equivalent(existing.tree.as_ref(), link.tree.as_ref()) {
                continue;
            }
            if existing.prev == link.prev {
                return;
            }
            let matches = {
                let a = self.node(existing.prev);
                let b = self.node(link.prev);
                a.state == b.state && a.position == b.position
            };
            if matches {
                let grand: Vec<StackLink> =
                    self.node(link.prev).links.iter().cloned().collect();
                for grand_link in grand {
                    self.add_link(existing.prev, grand_link);
                }
                return;
            }
        }
        if self.node(target).links.len() >= MAX_LINK_COUNT {
            return;
        }
        self.retain(link.prev);
        self.node_mut(target).links.push(link);
    }

    fn node(&self, id: NodeId) -> &StackNode {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut StackNode {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, node: StackNode) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id.0 as usize] = node;
            id
        } else {
            let id = NodeId(self.nodes.len() as u32);
            self.nodes.push(node);
            id
        }
    }

    fn retain(&mut self, id: NodeId) {
        self.node_mut(id).ref_count += 1;
    }

    fn release(&mut self, id: NodeId) {
        let mut work = vec![id];
        while let Some(id) = work.pop() {
            let node = self.node_mut(id);
            node.ref_count -= 1;
            if node.ref_count > 0 {
                continue;
            }
            let links = std::mem::take(&mut node.links);
            self.free.push(id);
            for link in links {
                work.push(link.prev);
            }
        }
    }

    /// Emit a Graphviz snapshot of the live graph, heads first.
    pub fn write_dot_graph(&self, language: &Language, out: &mut dyn io::Write) -> io::Result<()> {
        writeln!(out, "digraph stack {{")?;
        writeln!(out, "rankdir=\"RL\";")?;
        let mut visited = vec![false; self.nodes.len()];
        let mut work: Vec<NodeId> = Vec::new();
        for (version, &head) in self.heads.iter().enumerate() {
            writeln!(out, "head_{version} [shape=none, label=\"v{version}\"];")?;
            writeln!(out, "head_{version} -> node_{};", head.0)?;
            work.push(head);
        }
        while let Some(id) = work.pop() {
            if std::mem::replace(&mut visited[id.0 as usize], true) {
                continue;
            }
            let node = self.node(id);
            writeln!(
                out,
                "node_{} [label=\"{} {}\"];",
                id.0, node.state, node.position
            )?;
            for link in &node.links {
                let label = link
                    .tree
                    .as_ref()
                    .map_or("∅", |tree| language.symbol_name(tree.symbol));
                let style = if link.is_pending { "dashed" } else { "solid" };
                writeln!(
                    out,
                    "node_{} -> node_{} [label=\"{label}\", style=\"{style}\"];",
                    id.0, link.prev.0
                )?;
                work.push(link.prev);
            }
        }
        writeln!(out, "}}")
    }
}

fn trees_equivalent(left: Option<&Arc<Tree>>, right: Option<&Arc<Tree>>) -> bool {
    match (left, right) {
        (None, None) => true,
        (Some(left), Some(right)) => {
            if Arc::ptr_eq(left, right) {
                return true;
            }
            if left.symbol != right.symbol {
                return false;
            }
            if left.error_size() > 0 && right.error_size() > 0 {
                return true;
            }
            left.padding() == right.padding()
                && left.size() == right.size()
                && left.child_count() == right.child_count()
                && left.is_extra() == right.is_extra()
        }
        _ => false,
    }
}
