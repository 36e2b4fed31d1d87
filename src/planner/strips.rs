use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

use tracing::debug;

use super::grounding::applicable_actions;
use super::{Action, Plan, StripsProblem};
use crate::logic::Monom;
use crate::search::{
    CancellationToken, EvaluationError, GraphGenerator, NodeKind, PathEvaluator, SearchError,
    SuccessorDescription,
};

/// Forward search state, delta-encoded against the shared initial state:
/// only the literals added and deleted so far are stored, never the full
/// state. Two nodes are the same search state iff their deltas agree; the
/// producing action is path data and excluded from equality.
#[derive(Debug, Clone)]
pub struct StripsPlanningNode {
    add: Monom,
    del: Monom,
    action: Option<Action>,
}

impl StripsPlanningNode {
    fn root() -> StripsPlanningNode {
        StripsPlanningNode {
            add: Monom::new(),
            del: Monom::new(),
            action: None,
        }
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn add(&self) -> &Monom {
        &self.add
    }

    pub fn del(&self) -> &Monom {
        &self.del
    }

    /// Reconstructs the full state as `(init \ del) ∪ add`.
    pub fn state_relative_to(&self, init: &Monom) -> Monom {
        let mut state = init.clone();
        state.remove_all(&self.del);
        state.add_all(&self.add);
        state
    }
}

impl PartialEq for StripsPlanningNode {
    fn eq(&self, other: &Self) -> bool {
        self.add == other.add && self.del == other.del
    }
}

impl Eq for StripsPlanningNode {}

impl Hash for StripsPlanningNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.add.hash(state);
        self.del.hash(state);
    }
}

pub struct StripsGraphGenerator {
    problem: StripsProblem,
    constants: BTreeSet<String>,
    completely_expanded: HashSet<StripsPlanningNode>,
}

impl StripsGraphGenerator {
    pub fn new(problem: StripsProblem) -> StripsGraphGenerator {
        let mut constants = problem.init.constants();
        constants.extend(problem.goal.constants());
        StripsGraphGenerator {
            problem,
            constants,
            completely_expanded: HashSet::new(),
        }
    }
}

impl GraphGenerator for StripsGraphGenerator {
    type Node = StripsPlanningNode;
    type Label = String;

    fn root(&self) -> StripsPlanningNode {
        StripsPlanningNode::root()
    }

    fn successors(
        &mut self,
        node: &StripsPlanningNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<SuccessorDescription<StripsPlanningNode, String>>, SearchError> {
        assert!(
            self.completely_expanded.insert(node.clone()),
            "successors of {node:?} have already been computed"
        );
        cancel.check()?;
        let state = node.state_relative_to(&self.problem.init);
        let actions = applicable_actions(&state, &self.problem.operations, &self.constants);
        debug!("found {} applicable actions", actions.len());

        let mut successors = Vec::with_capacity(actions.len());
        for action in actions {
            cancel.check()?;
            assert!(
                action.is_applicable_in(&state),
                "generated action {} is not applicable in its source state",
                action.encoding()
            );
            let add_list = action.add_list();
            let delete_list = action.delete_list();

            let mut del = node.del.clone();
            del.add_all(&delete_list);
            del.remove_all(&add_list);
            let mut add = node.add.clone();
            add.remove_all(&delete_list);
            add.add_all(&add_list);
            assert!(
                add.is_disjoint(&del),
                "delta state corrupted: add and delete sets overlap"
            );

            let label = action.encoding();
            successors.push(SuccessorDescription {
                node: StripsPlanningNode {
                    add,
                    del,
                    action: Some(action),
                },
                label,
                kind: NodeKind::Or,
            });
        }
        Ok(successors)
    }

    fn is_goal(&self, node: &StripsPlanningNode) -> bool {
        node.state_relative_to(&self.problem.init).contains_all(&self.problem.goal)
    }
}

impl StripsProblem {
    pub fn graph_generator(&self) -> StripsGraphGenerator {
        StripsGraphGenerator::new(self.clone())
    }

    /// Nodes reached through an action contribute that action, in path
    /// order; the root contributes nothing.
    pub fn decode_solution(&self, path: &[StripsPlanningNode]) -> Plan {
        Plan {
            actions: path.iter().filter_map(|node| node.action().cloned()).collect(),
        }
    }
}

/// f = g + h with g the path depth and h the number of unsatisfied goal
/// literals. Not admissible; the engine does not require it to be.
pub struct GoalCountEvaluator {
    init: Monom,
    goal: Monom,
}

impl GoalCountEvaluator {
    pub fn new(problem: &StripsProblem) -> GoalCountEvaluator {
        GoalCountEvaluator {
            init: problem.init.clone(),
            goal: problem.goal.clone(),
        }
    }
}

impl PathEvaluator<StripsPlanningNode, String> for GoalCountEvaluator {
    type Score = usize;

    fn evaluate(
        &mut self,
        path: &[StripsPlanningNode],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, EvaluationError> {
        if cancel.is_canceled() {
            return Err(EvaluationError::Canceled);
        }
        let head = match path.last() {
            Some(head) => head,
            None => return Ok(None),
        };
        let state = head.state_relative_to(&self.init);
        let missing = self.goal.iter().filter(|literal| !state.contains(literal)).count();
        Ok(Some(path.len() - 1 + missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Literal;
    use crate::scenario;

    fn expand(
        generator: &mut StripsGraphGenerator,
        node: &StripsPlanningNode,
    ) -> Vec<SuccessorDescription<StripsPlanningNode, String>> {
        generator.successors(node, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_root_leaves_initial_state_unchanged() {
        let problem = scenario::blocksworld(3);
        let generator = problem.graph_generator();
        let root = generator.root();
        assert!(root.add().is_empty());
        assert!(root.del().is_empty());
        assert!(root.action().is_none());
        assert_eq!(root.state_relative_to(&problem.init), problem.init);
    }

    #[test]
    fn test_root_successors_are_pickups() {
        let problem = scenario::blocksworld(3);
        let mut generator = problem.graph_generator();
        let root = generator.root();

        let successors = expand(&mut generator, &root);
        // All three blocks are clear and on the table, the hand is empty.
        assert_eq!(successors.len(), 3);
        for successor in &successors {
            let action = successor.node.action().unwrap();
            assert_eq!(action.operation.name, "pick-up");
            assert!(successor.node.add().is_disjoint(successor.node.del()));
            assert_eq!(successor.kind, NodeKind::Or);
        }
    }

    #[test]
    fn test_delta_invariant_survives_inverse_actions() {
        let problem = scenario::blocksworld(2);
        let mut generator = problem.graph_generator();
        let root = generator.root();

        let pickup_a = expand(&mut generator, &root)
            .into_iter()
            .find(|s| s.label == "pick-up(a)")
            .unwrap();
        // put-down(a) re-adds literals that pick-up(a) deleted; the deltas
        // must not accumulate contradictions.
        let putdown_a = expand(&mut generator, &pickup_a.node)
            .into_iter()
            .find(|s| s.label == "put-down(a)")
            .unwrap();
        assert!(putdown_a.node.add().is_disjoint(putdown_a.node.del()));
        assert_eq!(
            putdown_a.node.state_relative_to(&problem.init),
            problem.init
        );
    }

    #[test]
    fn test_goal_detected_on_generated_successor() {
        let problem = scenario::blocksworld(2);
        let mut generator = problem.graph_generator();
        let root = generator.root();

        let pickup_b = expand(&mut generator, &root)
            .into_iter()
            .find(|s| s.label == "pick-up(b)")
            .unwrap();
        assert!(!generator.is_goal(&pickup_b.node));

        let stack_b_on_a = expand(&mut generator, &pickup_b.node)
            .into_iter()
            .find(|s| s.label == "stack(b, a)")
            .unwrap();
        assert!(generator.is_goal(&stack_b_on_a.node));
    }

    #[test]
    #[should_panic(expected = "already been computed")]
    fn test_re_expanding_a_node_panics() {
        let problem = scenario::blocksworld(2);
        let mut generator = problem.graph_generator();
        let root = generator.root();
        expand(&mut generator, &root);
        expand(&mut generator, &root);
    }

    #[test]
    fn test_goal_count_evaluator_scores_depth_plus_missing() {
        let problem = scenario::blocksworld(2);
        let mut evaluator = GoalCountEvaluator::new(&problem);
        let mut generator = problem.graph_generator();
        let root = generator.root();

        // Goal is on(b, a): one missing literal at depth zero.
        let score = evaluator
            .evaluate(std::slice::from_ref(&root), &CancellationToken::new())
            .unwrap();
        assert_eq!(score, Some(1));

        let decoded = problem.decode_solution(std::slice::from_ref(&root));
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_solution_keeps_action_order() {
        let problem = scenario::blocksworld(2);
        let mut generator = problem.graph_generator();
        let root = generator.root();
        let pickup_b = expand(&mut generator, &root)
            .into_iter()
            .find(|s| s.label == "pick-up(b)")
            .unwrap();
        let stack_b_on_a = expand(&mut generator, &pickup_b.node)
            .into_iter()
            .find(|s| s.label == "stack(b, a)")
            .unwrap();

        let path = vec![root, pickup_b.node, stack_b_on_a.node];
        let plan = problem.decode_solution(&path);
        assert_eq!(plan.encodings(), vec!["pick-up(b)", "stack(b, a)"]);

        let reached = plan.execute(&problem.init).unwrap();
        assert!(reached.contains(&Literal::fact("on", &["b", "a"])));
    }
}
