use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use super::event::{GraphEvent, NodeClass, SearchObserver};
use super::node::{Location, NodeId, SearchArena, SearchNode};
use super::{
    CancellationToken, EvaluatedSearchPath, EvaluationError, GraphGenerator, PathEvaluator,
    SearchError, SolutionReporter, SuccessorDescription,
};
use crate::stat::Stats;

const SOLUTION_QUEUE_BOUND: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Active,
    Terminated,
}

/// The one observable event a `step` call returns.
#[derive(Debug, Clone)]
pub enum SearchEvent<N, A, V> {
    Initialized { root: N },
    SolutionFound(EvaluatedSearchPath<N, A, V>),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry<V> {
    score: V,
    seq: u64,
    id: NodeId,
}

/// Anytime window A* over an implicitly generated graph.
///
/// Nodes outside the current window (more than `window_size` levels above
/// the deepest expanded level) are suspended instead of expanded; once OPEN
/// runs dry the suspended nodes are revived and the window grows, so the
/// search keeps emitting solution candidates until the whole graph is
/// exhausted. The underlying f-values are not assumed admissible, which is
/// why closed nodes are reopened when a strictly cheaper path shows up.
pub struct AwaStarSearch<G, E>
where
    G: GraphGenerator,
    E: PathEvaluator<G::Node, G::Label>,
{
    generator: G,
    evaluator: E,
    arena: SearchArena<G::Node, G::Label, E::Score>,
    index: HashMap<G::Node, NodeId>,
    open: BTreeSet<QueueEntry<E::Score>>,
    closed: HashSet<NodeId>,
    suspended: BTreeSet<QueueEntry<E::Score>>,
    expansions: HashMap<NodeId, Vec<SuccessorDescription<G::Node, G::Label>>>,
    current_level: i64,
    window_size: usize,
    seq_counter: u64,
    state: EngineState,
    pending_solutions: VecDeque<EvaluatedSearchPath<G::Node, G::Label, E::Score>>,
    known_solutions: HashSet<Vec<G::Node>>,
    reported: Receiver<EvaluatedSearchPath<G::Node, G::Label, E::Score>>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    observers: Vec<Box<dyn SearchObserver<G::Node, G::Label>>>,
    stats: Stats,
}

impl<G, E> AwaStarSearch<G, E>
where
    G: GraphGenerator,
    E: PathEvaluator<G::Node, G::Label>,
{
    pub fn new(generator: G, mut evaluator: E) -> Self {
        let (sender, receiver) = sync_channel(SOLUTION_QUEUE_BOUND);
        evaluator.register_solution_reporter(SolutionReporter::new(sender));
        AwaStarSearch {
            generator,
            evaluator,
            arena: SearchArena::new(),
            index: HashMap::new(),
            open: BTreeSet::new(),
            closed: HashSet::new(),
            suspended: BTreeSet::new(),
            expansions: HashMap::new(),
            current_level: -1,
            window_size: 0,
            seq_counter: 0,
            state: EngineState::Created,
            pending_solutions: VecDeque::new(),
            known_solutions: HashSet::new(),
            reported: receiver,
            cancel: CancellationToken::new(),
            timeout: None,
            deadline: None,
            observers: Vec::new(),
            stats: Stats::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn register_observer(&mut self, observer: impl SearchObserver<G::Node, G::Label> + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn current_level(&self) -> i64 {
        self.current_level
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Advances the state machine and returns exactly one event.
    pub fn step(
        &mut self,
    ) -> Result<SearchEvent<G::Node, G::Label, E::Score>, SearchError> {
        match self.state {
            EngineState::Created => {
                self.deadline = self.timeout.map(|timeout| Instant::now() + timeout);
                self.check_termination()?;
                let root = self.generator.root();
                match self.evaluate(std::slice::from_ref(&root))? {
                    Some(score) => {
                        info!("initializing graph and OPEN with {root:?}");
                        let seq = self.next_seq();
                        let id = self.arena.insert(SearchNode {
                            external: root.clone(),
                            parent: None,
                            edge: None,
                            score: score.clone(),
                            seq,
                            location: Location::Open,
                        });
                        self.index.insert(root.clone(), id);
                        self.open.insert(QueueEntry { score, seq, id });
                    }
                    None => debug!("root node was pruned by the evaluator"),
                }
                self.emit(GraphEvent::Initialized { root: root.clone() });
                self.state = EngineState::Active;
                Ok(SearchEvent::Initialized { root })
            }
            EngineState::Active => loop {
                self.check_termination()?;
                self.drain_reported_solutions();

                // Return pending solutions first, oldest one wins.
                if let Some(solution) = self.pending_solutions.pop_front() {
                    return Ok(SearchEvent::SolutionFound(solution));
                }

                // If the current window has been exhausted, revive all
                // suspended nodes and widen the window.
                if self.open.is_empty() {
                    if self.suspended.is_empty() {
                        info!("the whole graph has been exhausted, no more solutions can be found");
                        self.shutdown();
                        return Ok(SearchEvent::Exhausted);
                    }
                    info!(
                        "search with window size {} is exhausted, reactivating {} suspended nodes",
                        self.window_size,
                        self.suspended.len()
                    );
                    let revived: Vec<_> = std::mem::take(&mut self.suspended).into_iter().collect();
                    for entry in revived {
                        self.arena.get_mut(entry.id).location = Location::Open;
                        self.open.insert(entry);
                    }
                    self.window_size += 1;
                    self.current_level = -1;
                    self.stats.window_growths += 1;
                }
                self.window_astar()?;
            },
            EngineState::Terminated => {
                panic!("step() must not be called on a terminated engine")
            }
        }
    }

    /// Drives the search until the next solution candidate; `None` means
    /// the graph is exhausted.
    pub fn next_solution(
        &mut self,
    ) -> Result<Option<EvaluatedSearchPath<G::Node, G::Label, E::Score>>, SearchError> {
        loop {
            match self.step()? {
                SearchEvent::Initialized { .. } => continue,
                SearchEvent::SolutionFound(solution) => return Ok(Some(solution)),
                SearchEvent::Exhausted => return Ok(None),
            }
        }
    }

    #[instrument(skip_all, level = "debug", fields(window_size = self.window_size, current_level = self.current_level))]
    fn window_astar(&mut self) -> Result<(), SearchError> {
        loop {
            self.check_termination()?;
            self.drain_reported_solutions();
            if !self.pending_solutions.is_empty() {
                debug!("interrupting expansion, there are unreturned solutions");
                return Ok(());
            }
            let Some(entry) = self.open.pop_first() else {
                return Ok(());
            };
            let id = entry.id;
            self.arena.get_mut(id).location = Location::Closed;
            self.closed.insert(id);
            let external = self.arena.get(id).external.clone();
            self.emit(GraphEvent::NodeTypeSwitch {
                node: external.clone(),
                class: NodeClass::Closed,
            });

            // Nodes that fell out of the window are deferred, not expanded.
            let level = self.arena.level(id) as i64;
            if level <= self.current_level - self.window_size as i64 {
                assert!(self.closed.remove(&id));
                self.arena.get_mut(id).location = Location::Suspended;
                self.suspended.insert(entry);
                debug!(
                    "suspending node at level {level}, which is not above {}",
                    self.current_level - self.window_size as i64
                );
                self.emit(GraphEvent::NodeTypeSwitch {
                    node: external,
                    class: NodeClass::Suspended,
                });
                continue;
            }

            if level > self.current_level {
                debug!("switching level from {} to {level}", self.current_level);
                self.current_level = level;
            }

            self.check_termination()?;
            self.expand(id)?;
        }
    }

    fn expand(&mut self, id: NodeId) -> Result<(), SearchError> {
        let external = self.arena.get(id).external.clone();
        let successors = if let Some(cached) = self.expansions.get(&id).cloned() {
            // A node reopened over a cheaper path is re-expanded from the
            // cached descriptions; the generator is never asked twice.
            debug!(
                "re-expanding reopened node from {} cached successor descriptions",
                cached.len()
            );
            cached
        } else {
            debug!("expanding {external:?}, starting successor generation");
            let generated = match self.generator.successors(&external, &self.cancel) {
                Ok(generated) => generated,
                Err(SearchError::Canceled) => {
                    self.shutdown();
                    return Err(SearchError::Canceled);
                }
                Err(error) => return Err(error),
            };
            debug!("successor generation finished, identified {} successors", generated.len());
            self.stats.expanded_nodes += 1;
            self.expansions.insert(id, generated.clone());
            generated
        };

        let (parent_nodes, parent_edges) = self.arena.path(id);
        for successor in successors {
            self.check_termination()?;
            let mut path = parent_nodes.clone();
            path.push(successor.node.clone());
            let score = match self.evaluate(&path)? {
                Some(score) => score,
                None => {
                    debug!(
                        "discarding successor {:?} for which no score could be computed",
                        successor.node
                    );
                    self.stats.pruned_nodes += 1;
                    continue;
                }
            };
            self.stats.generated_nodes += 1;

            // Goal nodes are reported immediately and never (re)opened.
            if self.generator.is_goal(&successor.node) {
                let mut edges = parent_edges.clone();
                edges.push(successor.label.clone());
                self.enqueue_solution(EvaluatedSearchPath { nodes: path, edges, score });
                self.emit(GraphEvent::NodeAdded {
                    parent: external.clone(),
                    node: successor.node.clone(),
                    label: successor.label.clone(),
                    kind: successor.kind,
                    class: NodeClass::Solution,
                });
                continue;
            }

            match self.index.get(&successor.node).copied() {
                None => {
                    let seq = self.next_seq();
                    let child = self.arena.insert(SearchNode {
                        external: successor.node.clone(),
                        parent: Some(id),
                        edge: Some(successor.label.clone()),
                        score: score.clone(),
                        seq,
                        location: Location::Open,
                    });
                    self.index.insert(successor.node.clone(), child);
                    self.open.insert(QueueEntry { score, seq, id: child });
                    self.emit(GraphEvent::NodeAdded {
                        parent: external.clone(),
                        node: successor.node,
                        label: successor.label,
                        kind: successor.kind,
                        class: NodeClass::Open,
                    });
                }
                Some(existing) => self.update_duplicate(existing, id, &successor, score),
            }
        }
        Ok(())
    }

    /// The successor already has a slot in OPEN, CLOSED or SUSPEND. The slot
    /// is rewritten in place if the new path is strictly cheaper; a closed
    /// slot additionally moves back to OPEN.
    fn update_duplicate(
        &mut self,
        existing: NodeId,
        parent: NodeId,
        successor: &SuccessorDescription<G::Node, G::Label>,
        score: E::Score,
    ) {
        let (location, old_key) = {
            let node = self.arena.get(existing);
            if node.score <= score {
                return;
            }
            (
                node.location,
                QueueEntry {
                    score: node.score.clone(),
                    seq: node.seq,
                    id: existing,
                },
            )
        };
        let seq = old_key.seq;
        {
            let node = self.arena.get_mut(existing);
            node.external = successor.node.clone();
            node.parent = Some(parent);
            node.edge = Some(successor.label.clone());
            node.score = score.clone();
        }
        match location {
            Location::Open => {
                assert!(self.open.remove(&old_key));
                self.open.insert(QueueEntry { score, seq, id: existing });
                debug!("found a cheaper path to an open node, slot updated in place");
            }
            Location::Suspended => {
                assert!(self.suspended.remove(&old_key));
                self.suspended.insert(QueueEntry { score, seq, id: existing });
                debug!("found a cheaper path to a suspended node, slot updated in place");
            }
            Location::Closed => {
                assert!(self.closed.remove(&existing));
                self.arena.get_mut(existing).location = Location::Open;
                self.open.insert(QueueEntry { score, seq, id: existing });
                debug!("reopening closed node over a cheaper path");
            }
        }
    }

    fn enqueue_solution(&mut self, solution: EvaluatedSearchPath<G::Node, G::Label, E::Score>) {
        // Engine-discovered and externally reported solutions share one
        // queue; duplicates (by path identity) are dropped.
        if !self.known_solutions.insert(solution.nodes.clone()) {
            debug!("ignoring solution candidate that was already registered");
            return;
        }
        info!("registering solution candidate with score {:?}", solution.score);
        self.stats.solutions_found += 1;
        self.pending_solutions.push_back(solution);
    }

    fn drain_reported_solutions(&mut self) {
        loop {
            match self.reported.try_recv() {
                Ok(solution) => {
                    debug!("received externally reported solution");
                    self.enqueue_solution(solution);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn evaluate(&mut self, path: &[G::Node]) -> Result<Option<E::Score>, SearchError> {
        match self.evaluator.evaluate(path, &self.cancel) {
            Ok(score) => Ok(score),
            Err(EvaluationError::Canceled) => {
                self.shutdown();
                Err(SearchError::Canceled)
            }
            Err(EvaluationError::Failed(error)) => Err(SearchError::Evaluation(error)),
        }
    }

    fn check_termination(&mut self) -> Result<(), SearchError> {
        if self.cancel.is_canceled() {
            info!("search was canceled, shutting down");
            self.shutdown();
            return Err(SearchError::Canceled);
        }
        if let (Some(deadline), Some(timeout)) = (self.deadline, self.timeout) {
            if Instant::now() >= deadline {
                return Err(SearchError::Timeout(timeout));
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.state == EngineState::Terminated {
            return;
        }
        debug!("invoking shutdown routine, canceling evaluator tasks");
        self.evaluator.cancel_active_tasks();
        self.state = EngineState::Terminated;
    }

    fn emit(&mut self, event: GraphEvent<G::Node, G::Label>) {
        for observer in &mut self.observers {
            observer.on_event(&event);
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq_counter;
        self.seq_counter += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::search::{DepthEvaluator, NodeKind};

    type Node = &'static str;

    struct TableGraph {
        root: Node,
        edges: BTreeMap<Node, Vec<Node>>,
        goals: Vec<Node>,
        calls: Rc<RefCell<HashMap<Node, usize>>>,
    }

    impl TableGraph {
        fn new(root: Node, edges: Vec<(Node, Vec<Node>)>, goals: Vec<Node>) -> TableGraph {
            TableGraph {
                root,
                edges: edges.into_iter().collect(),
                goals,
                calls: Rc::new(RefCell::new(HashMap::new())),
            }
        }
    }

    impl GraphGenerator for TableGraph {
        type Node = Node;
        type Label = String;

        fn root(&self) -> Node {
            self.root
        }

        fn successors(
            &mut self,
            node: &Node,
            cancel: &CancellationToken,
        ) -> Result<Vec<SuccessorDescription<Node, String>>, SearchError> {
            cancel.check()?;
            let count = *self
                .calls
                .borrow_mut()
                .entry(*node)
                .and_modify(|c| *c += 1)
                .or_insert(1);
            assert_eq!(count, 1, "successors of {node} have already been computed");
            Ok(self
                .edges
                .get(node)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|child| SuccessorDescription {
                    node: child,
                    label: format!("{node}->{child}"),
                    kind: NodeKind::Or,
                })
                .collect())
        }

        fn is_goal(&self, node: &Node) -> bool {
            self.goals.contains(node)
        }
    }

    struct TableEvaluator {
        scores: HashMap<Vec<Node>, Option<usize>>,
    }

    impl TableEvaluator {
        fn new(scores: Vec<(Vec<Node>, Option<usize>)>) -> TableEvaluator {
            TableEvaluator {
                scores: scores.into_iter().collect(),
            }
        }
    }

    impl PathEvaluator<Node, String> for TableEvaluator {
        type Score = usize;

        fn evaluate(
            &mut self,
            path: &[Node],
            _cancel: &CancellationToken,
        ) -> Result<Option<usize>, EvaluationError> {
            match self.scores.get(path) {
                Some(score) => Ok(*score),
                None => Ok(Some(path.len() - 1)),
            }
        }
    }

    // Score = negative depth, turning best-first into a depth dive that
    // leaves shallow siblings behind for suspension.
    struct NegativeDepthEvaluator;

    impl PathEvaluator<Node, String> for NegativeDepthEvaluator {
        type Score = i64;

        fn evaluate(
            &mut self,
            path: &[Node],
            _cancel: &CancellationToken,
        ) -> Result<Option<i64>, EvaluationError> {
            Ok(Some(-(path.len() as i64 - 1)))
        }
    }

    #[test]
    fn test_linear_graph_finds_goal() {
        let graph = TableGraph::new(
            "n0",
            vec![("n0", vec!["n1"]), ("n1", vec!["n2"]), ("n2", vec!["n3"])],
            vec!["n3"],
        );
        let mut search = AwaStarSearch::new(graph, DepthEvaluator);

        assert!(matches!(search.step().unwrap(), SearchEvent::Initialized { root: "n0" }));
        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["n0", "n1", "n2", "n3"]);
                assert_eq!(solution.edges, vec!["n0->n1", "n1->n2", "n2->n3"]);
                assert_eq!(solution.score, 3);
            }
            event => panic!("expected a solution, got {event:?}"),
        }
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));
        assert_eq!(search.state(), EngineState::Terminated);
        assert_eq!(search.stats().solutions_found, 1);
    }

    #[test]
    fn test_tie_breaking_prefers_insertion_order() {
        let graph = TableGraph::new("r", vec![("r", vec!["x", "y", "z"])], vec![]);
        let mut search = AwaStarSearch::new(graph, DepthEvaluator);

        let closed = Rc::new(RefCell::new(Vec::new()));
        let suspended = Rc::new(RefCell::new(Vec::new()));
        let closed_log = closed.clone();
        let suspended_log = suspended.clone();
        search.register_observer(move |event: &GraphEvent<Node, String>| {
            if let GraphEvent::NodeTypeSwitch { node, class } = event {
                match class {
                    NodeClass::Closed => closed_log.borrow_mut().push(*node),
                    NodeClass::Suspended => suspended_log.borrow_mut().push(*node),
                    _ => {}
                }
            }
        });

        search.step().unwrap();
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));

        // All three children share the same score; pop order must be
        // insertion order, through suspension and revival alike. y and z
        // are first popped into CLOSED, deferred, and popped again after
        // the window grew.
        assert_eq!(*closed.borrow(), vec!["r", "x", "y", "z", "y", "z"]);
        assert_eq!(*suspended.borrow(), vec!["y", "z"]);
    }

    #[test]
    fn test_no_duplicate_expansion_in_a_dag() {
        // n -> n + 1 and n + 2: every interior node is reachable twice.
        struct DagGraph {
            limit: u32,
            calls: Rc<RefCell<HashMap<u32, usize>>>,
        }

        impl GraphGenerator for DagGraph {
            type Node = u32;
            type Label = u32;

            fn root(&self) -> u32 {
                0
            }

            fn successors(
                &mut self,
                node: &u32,
                _cancel: &CancellationToken,
            ) -> Result<Vec<SuccessorDescription<u32, u32>>, SearchError> {
                *self.calls.borrow_mut().entry(*node).or_insert(0) += 1;
                Ok([node + 1, node + 2]
                    .into_iter()
                    .filter(|child| *child <= self.limit)
                    .map(|child| SuccessorDescription {
                        node: child,
                        label: child,
                        kind: NodeKind::Or,
                    })
                    .collect())
            }

            fn is_goal(&self, _node: &u32) -> bool {
                false
            }
        }

        let calls = Rc::new(RefCell::new(HashMap::new()));
        let graph = DagGraph {
            limit: 8,
            calls: calls.clone(),
        };
        let mut search = AwaStarSearch::new(graph, DepthEvaluator);
        search.step().unwrap();
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));

        for (node, count) in calls.borrow().iter() {
            assert_eq!(*count, 1, "node {node} was expanded {count} times");
        }
        assert_eq!(calls.borrow().len(), 9);
    }

    #[test]
    fn test_open_node_updated_in_place_on_cheaper_path() {
        // b is opened from the root with score 2, then found again through
        // the deeper d with score 1. The slot must be reparented so the
        // solution path runs through d.
        let graph = TableGraph::new(
            "r",
            vec![
                ("r", vec!["b", "a"]),
                ("a", vec!["d"]),
                ("d", vec!["b"]),
                ("b", vec!["g"]),
            ],
            vec!["g"],
        );
        let evaluator = TableEvaluator::new(vec![
            (vec!["r"], Some(0)),
            (vec!["r", "b"], Some(2)),
            (vec!["r", "a"], Some(1)),
            (vec!["r", "a", "d"], Some(1)),
            (vec!["r", "a", "d", "b"], Some(1)),
            (vec!["r", "a", "d", "b", "g"], Some(5)),
        ]);
        let mut search = AwaStarSearch::new(graph, evaluator);
        search.step().unwrap();
        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["r", "a", "d", "b", "g"]);
                assert_eq!(solution.score, 5);
            }
            event => panic!("expected a solution, got {event:?}"),
        }
    }

    #[test]
    fn test_closed_node_reopening_improves_solution() {
        // c is closed after being reached through b, then rediscovered
        // through a with a strictly better score; reopening it must produce
        // a second, improved solution through the cached successors.
        let graph = TableGraph::new(
            "r",
            vec![
                ("r", vec!["a", "b"]),
                ("a", vec!["c"]),
                ("b", vec!["c"]),
                ("c", vec!["g"]),
            ],
            vec!["g"],
        );
        let evaluator = TableEvaluator::new(vec![
            (vec!["r"], Some(0)),
            (vec!["r", "a"], Some(5)),
            (vec!["r", "b"], Some(1)),
            (vec!["r", "b", "c"], Some(4)),
            (vec!["r", "a", "c"], Some(2)),
            (vec!["r", "b", "c", "g"], Some(9)),
            (vec!["r", "a", "c", "g"], Some(3)),
        ]);
        let mut search = AwaStarSearch::new(graph, evaluator);
        search.step().unwrap();

        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["r", "b", "c", "g"]);
                assert_eq!(solution.score, 9);
            }
            event => panic!("expected the first solution, got {event:?}"),
        }
        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["r", "a", "c", "g"]);
                assert_eq!(solution.score, 3);
            }
            event => panic!("expected the improved solution, got {event:?}"),
        }
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));
        assert_eq!(search.stats().solutions_found, 2);
    }

    #[test]
    fn test_window_growth_revives_suspended_nodes() {
        let graph = TableGraph::new(
            "r",
            vec![
                ("r", vec!["l1", "s1"]),
                ("l1", vec!["l2"]),
                ("l2", vec!["l3"]),
                ("l3", vec!["l4"]),
                ("l4", vec!["l5"]),
                ("l5", vec!["l6"]),
                ("s1", vec!["s2"]),
            ],
            vec![],
        );
        let mut search = AwaStarSearch::new(graph, NegativeDepthEvaluator);

        let suspended = Rc::new(RefCell::new(Vec::new()));
        let suspended_log = suspended.clone();
        search.register_observer(move |event: &GraphEvent<Node, String>| {
            if let GraphEvent::NodeTypeSwitch {
                node,
                class: NodeClass::Suspended,
            } = event
            {
                suspended_log.borrow_mut().push(*node);
            }
        });

        search.step().unwrap();
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));

        // The dive down the long chain pushes the level out of reach of s1,
        // which must be suspended and only expanded after the window grew.
        assert_eq!(*suspended.borrow(), vec!["s1"]);
        assert_eq!(search.stats().window_growths, 1);
        assert_eq!(search.window_size(), 1);
        assert_eq!(search.stats().expanded_nodes, 9);
    }

    #[test]
    fn test_pruned_successors_block_their_subtree() {
        let graph = TableGraph::new(
            "r",
            vec![("r", vec!["p"]), ("p", vec!["g"])],
            vec!["g"],
        );
        let evaluator = TableEvaluator::new(vec![(vec!["r", "p"], None)]);
        let mut search = AwaStarSearch::new(graph, evaluator);

        search.step().unwrap();
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));
        assert_eq!(search.stats().pruned_nodes, 1);
        assert_eq!(search.stats().solutions_found, 0);
    }

    struct ReportingEvaluator {
        slot: Arc<Mutex<Option<SolutionReporter<Node, String, usize>>>>,
    }

    impl PathEvaluator<Node, String> for ReportingEvaluator {
        type Score = usize;

        fn evaluate(
            &mut self,
            path: &[Node],
            _cancel: &CancellationToken,
        ) -> Result<Option<usize>, EvaluationError> {
            Ok(Some(path.len() - 1))
        }

        fn register_solution_reporter(&mut self, reporter: SolutionReporter<Node, String, usize>) {
            *self.slot.lock().unwrap() = Some(reporter);
        }
    }

    #[test]
    fn test_reported_solutions_are_returned_fifo_and_deduplicated() {
        let graph = TableGraph::new("r", vec![], vec![]);
        let slot = Arc::new(Mutex::new(None));
        let evaluator = ReportingEvaluator { slot: slot.clone() };
        let mut search = AwaStarSearch::new(graph, evaluator);
        search.step().unwrap();

        let reporter = slot.lock().unwrap().clone().unwrap();
        let worker = std::thread::spawn(move || {
            let first = EvaluatedSearchPath {
                nodes: vec!["r", "u"],
                edges: vec!["r->u".to_string()],
                score: 7,
            };
            let second = EvaluatedSearchPath {
                nodes: vec!["r", "v"],
                edges: vec!["r->v".to_string()],
                score: 2,
            };
            reporter.report(first.clone());
            reporter.report(second);
            reporter.report(first);
        });
        worker.join().unwrap();

        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["r", "u"]);
                assert_eq!(solution.score, 7);
            }
            event => panic!("expected the first reported solution, got {event:?}"),
        }
        match search.step().unwrap() {
            SearchEvent::SolutionFound(solution) => {
                assert_eq!(solution.nodes, vec!["r", "v"]);
            }
            event => panic!("expected the second reported solution, got {event:?}"),
        }
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));
        assert_eq!(search.stats().solutions_found, 2);
    }

    struct FailingEvaluator;

    impl PathEvaluator<Node, String> for FailingEvaluator {
        type Score = usize;

        fn evaluate(
            &mut self,
            path: &[Node],
            _cancel: &CancellationToken,
        ) -> Result<Option<usize>, EvaluationError> {
            if path.len() > 1 {
                Err(EvaluationError::Failed(anyhow::anyhow!("broken oracle")))
            } else {
                Ok(Some(0))
            }
        }
    }

    #[test]
    fn test_evaluation_failure_surfaces_as_engine_error() {
        let graph = TableGraph::new("r", vec![("r", vec!["x"])], vec![]);
        let mut search = AwaStarSearch::new(graph, FailingEvaluator);
        search.step().unwrap();
        assert!(matches!(search.step(), Err(SearchError::Evaluation(_))));
        // An evaluation failure is not a termination; the state stays
        // inspectable.
        assert_eq!(search.state(), EngineState::Active);
    }

    struct CancelProbeEvaluator {
        canceled: Arc<AtomicBool>,
    }

    impl PathEvaluator<Node, String> for CancelProbeEvaluator {
        type Score = usize;

        fn evaluate(
            &mut self,
            path: &[Node],
            cancel: &CancellationToken,
        ) -> Result<Option<usize>, EvaluationError> {
            if cancel.is_canceled() {
                return Err(EvaluationError::Canceled);
            }
            Ok(Some(path.len() - 1))
        }

        fn cancel_active_tasks(&mut self) {
            self.canceled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_cancellation_terminates_engine_and_evaluator() {
        let graph = TableGraph::new("r", vec![("r", vec!["x"])], vec![]);
        let canceled = Arc::new(AtomicBool::new(false));
        let evaluator = CancelProbeEvaluator {
            canceled: canceled.clone(),
        };
        let mut search = AwaStarSearch::new(graph, evaluator);
        search.step().unwrap();

        search.cancellation_token().cancel();
        assert!(matches!(search.step(), Err(SearchError::Canceled)));
        assert_eq!(search.state(), EngineState::Terminated);
        assert!(canceled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_elapsed_deadline_raises_timeout() {
        let graph = TableGraph::new("r", vec![("r", vec!["x"])], vec![]);
        let mut search =
            AwaStarSearch::new(graph, DepthEvaluator).with_timeout(Duration::from_millis(0));
        assert!(matches!(search.step(), Err(SearchError::Timeout(_))));
    }

    #[test]
    #[should_panic(expected = "terminated engine")]
    fn test_stepping_a_terminated_engine_panics() {
        let graph = TableGraph::new("r", vec![], vec![]);
        let mut search = AwaStarSearch::new(graph, DepthEvaluator);
        search.step().unwrap();
        assert!(matches!(search.step().unwrap(), SearchEvent::Exhausted));
        let _ = search.step();
    }
}
