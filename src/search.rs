mod awastar;
mod event;
mod node;

pub use awastar::{AwaStarSearch, EngineState, SearchEvent};
pub use event::{GraphEvent, NodeClass, SearchObserver};

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search was canceled")]
    Canceled,
    #[error("search deadline elapsed after {0:?}")]
    Timeout(Duration),
    #[error("path evaluation failed: {0}")]
    Evaluation(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("path evaluation was canceled")]
    Canceled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Cooperative cancellation flag, handed into every potentially
/// long-running collaborator call.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), SearchError> {
        if self.is_canceled() {
            Err(SearchError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// OR successors are disjunctive alternatives; AND successors are emitted by
/// generators for parallel decompositions. The engine expands everything
/// disjunctively, so a generator emitting AND nodes must splice conjunctive
/// children into sequential expansions itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Or,
    And,
}

#[derive(Debug, Clone)]
pub struct SuccessorDescription<N, A> {
    pub node: N,
    pub label: A,
    pub kind: NodeKind,
}

pub trait GraphGenerator {
    type Node: Clone + Eq + Hash + Debug;
    type Label: Clone + Debug;

    /// Called exactly once per search.
    fn root(&self) -> Self::Node;

    /// Called at most once per node; a second call for a node that has been
    /// completely expanded is a programming error and must fail fast.
    fn successors(
        &mut self,
        node: &Self::Node,
        cancel: &CancellationToken,
    ) -> Result<Vec<SuccessorDescription<Self::Node, Self::Label>>, SearchError>;

    /// Pure and cheap; called once per generated successor.
    fn is_goal(&self, node: &Self::Node) -> bool;
}

/// A root-to-node path together with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedSearchPath<N, A, V> {
    pub nodes: Vec<N>,
    pub edges: Vec<A>,
    pub score: V,
}

impl<N, A, V> EvaluatedSearchPath<N, A, V> {
    pub fn head(&self) -> &N {
        self.nodes.last().expect("an evaluated path is never empty")
    }
}

/// Sending half of the engine's bounded solution queue. An evaluator that
/// discovers full solutions out-of-band (e.g. through a nested search on a
/// worker thread) pushes them through this handle; the engine drains the
/// queue in FIFO order alongside its own solutions.
#[derive(Debug)]
pub struct SolutionReporter<N, A, V> {
    sender: SyncSender<EvaluatedSearchPath<N, A, V>>,
}

impl<N, A, V> SolutionReporter<N, A, V> {
    pub(crate) fn new(sender: SyncSender<EvaluatedSearchPath<N, A, V>>) -> Self {
        SolutionReporter { sender }
    }

    pub fn report(&self, solution: EvaluatedSearchPath<N, A, V>) {
        // The engine being gone just means nobody is interested anymore.
        let _ = self.sender.send(solution);
    }
}

impl<N, A, V> Clone for SolutionReporter<N, A, V> {
    fn clone(&self) -> Self {
        SolutionReporter {
            sender: self.sender.clone(),
        }
    }
}

pub trait PathEvaluator<N, A> {
    type Score: Clone + Ord + Debug;

    /// Scores a root-to-node path. `Ok(None)` prunes the node silently.
    fn evaluate(
        &mut self,
        path: &[N],
        cancel: &CancellationToken,
    ) -> Result<Option<Self::Score>, EvaluationError>;

    /// Called once when the engine is constructed. Solution-reporting
    /// evaluators keep the reporter; everybody else ignores it.
    fn register_solution_reporter(&mut self, _reporter: SolutionReporter<N, A, Self::Score>) {}

    /// Called during engine shutdown so a concurrent evaluator can stop its
    /// workers.
    fn cancel_active_tasks(&mut self) {}
}

/// Uniform-cost evaluator: the score of a path is its depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthEvaluator;

impl<N, A> PathEvaluator<N, A> for DepthEvaluator {
    type Score = usize;

    fn evaluate(
        &mut self,
        path: &[N],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, EvaluationError> {
        if cancel.is_canceled() {
            return Err(EvaluationError::Canceled);
        }
        Ok(Some(path.len() - 1))
    }
}
