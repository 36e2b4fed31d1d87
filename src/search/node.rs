#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Open,
    Closed,
    Suspended,
}

// Search node slot. The parent reference is an arena id, never a pointer, so
// the whole back-pointer graph is torn down with the arena.
#[derive(Debug, Clone)]
pub(crate) struct SearchNode<N, A, V> {
    pub(crate) external: N,
    pub(crate) parent: Option<NodeId>,
    pub(crate) edge: Option<A>,
    pub(crate) score: V,
    pub(crate) seq: u64,
    pub(crate) location: Location,
}

#[derive(Debug)]
pub(crate) struct SearchArena<N, A, V> {
    nodes: Vec<SearchNode<N, A, V>>,
}

impl<N: Clone, A: Clone, V> SearchArena<N, A, V> {
    pub(crate) fn new() -> Self {
        SearchArena { nodes: Vec::new() }
    }

    pub(crate) fn insert(&mut self, node: SearchNode<N, A, V>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> &SearchNode<N, A, V> {
        &self.nodes[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut SearchNode<N, A, V> {
        &mut self.nodes[id.0]
    }

    /// Number of edges between the root and `id`, following the current
    /// parent chain. Kept dynamic: reparenting a node changes the level of
    /// its whole subtree.
    pub(crate) fn level(&self, id: NodeId) -> usize {
        let mut level = 0;
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            level += 1;
            current = self.get(parent).parent;
        }
        level
    }

    /// Reconstructs the root-to-`id` path. The node sequence is exactly
    /// what the path evaluator was given for `id`.
    pub(crate) fn path(&self, id: NodeId) -> (Vec<N>, Vec<A>) {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.get(node_id);
            nodes.push(node.external.clone());
            if let Some(edge) = &node.edge {
                edges.push(edge.clone());
            }
            current = node.parent;
        }
        nodes.reverse();
        edges.reverse();
        (nodes, edges)
    }
}
