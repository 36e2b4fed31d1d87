use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};

use tracing::debug;

use super::grounding::{actions_for_primitive_task, method_instances_for_task};
use super::{Action, HtnProblem, MethodInstance, Operation, Plan};
use crate::logic::{Literal, Monom};
use crate::search::{
    CancellationToken, EvaluationError, GraphGenerator, NodeKind, PathEvaluator, SearchError,
    SuccessorDescription,
};

/// Forward-decomposition node: the state reached so far plus the agenda of
/// tasks still to be resolved. The applied method instance or action is
/// path data and excluded from equality.
#[derive(Debug, Clone)]
pub struct HtnNode {
    state: Monom,
    remaining_tasks: Vec<Literal>,
    method_instance: Option<MethodInstance>,
    action: Option<Action>,
}

impl HtnNode {
    pub fn state(&self) -> &Monom {
        &self.state
    }

    pub fn remaining_tasks(&self) -> &[Literal] {
        &self.remaining_tasks
    }

    pub fn method_instance(&self) -> Option<&MethodInstance> {
        self.method_instance.as_ref()
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
}

impl PartialEq for HtnNode {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.remaining_tasks == other.remaining_tasks
    }
}

impl Eq for HtnNode {}

impl Hash for HtnNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.remaining_tasks.hash(state);
    }
}

/// Strips a leading numeric chain tag (`"2-load"` -> `"load"`). Names
/// without such a tag pass through untouched, dashes included.
pub(crate) fn strip_ordering_tag(name: &str) -> &str {
    if let Some((tag, rest)) = name.split_once('-') {
        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_digit()) {
            return rest;
        }
    }
    name
}

/// A leading numeric priority prefix (`"3_taskname"`), if any. Unlike chain
/// tags these survive splicing and only affect agenda order.
fn priority_prefix(name: &str) -> Option<u64> {
    let (prefix, _) = name.split_once('_')?;
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok()
}

fn strip_network_tags(tasks: &[Literal]) -> Vec<Literal> {
    tasks
        .iter()
        .map(|task| {
            let mut task = task.clone();
            task.predicate = strip_ordering_tag(&task.predicate).to_string();
            task
        })
        .collect()
}

/// Prioritized tasks come first, sorted by prefix; everything else follows
/// in its original order. The sort is stable, so ties keep their order too.
pub(crate) fn order_tasks_by_priority(tasks: Vec<Literal>) -> Vec<Literal> {
    let mut prioritized = Vec::new();
    let mut unordered = Vec::new();
    for task in tasks {
        match priority_prefix(&task.predicate) {
            Some(priority) => prioritized.push((priority, task)),
            None => unordered.push(task),
        }
    }
    prioritized.sort_by_key(|(priority, _)| *priority);
    prioritized
        .into_iter()
        .map(|(_, task)| task)
        .chain(unordered)
        .collect()
}

pub struct HtnGraphGenerator {
    problem: HtnProblem,
    primitive_tasks: HashMap<String, Operation>,
    constants: BTreeSet<String>,
}

impl HtnGraphGenerator {
    pub fn new(problem: HtnProblem) -> HtnGraphGenerator {
        let primitive_tasks = problem
            .operations
            .iter()
            .map(|op| (op.name.clone(), op.clone()))
            .collect();
        let mut constants = problem.init.constants();
        constants.extend(problem.network.constants());
        HtnGraphGenerator {
            problem,
            primitive_tasks,
            constants,
        }
    }

    fn successors_for_primitive_task(
        &self,
        operation: &Operation,
        task: &Literal,
        state: &Monom,
        rest: &[Literal],
    ) -> Vec<HtnNode> {
        let mut successors = Vec::new();
        for action in actions_for_primitive_task(operation, task, state) {
            let mut state = state.clone();
            action.apply_to(&mut state);
            successors.push(HtnNode {
                state,
                remaining_tasks: rest.to_vec(),
                method_instance: None,
                action: Some(action),
            });
        }
        successors
    }

    fn successors_for_compound_task(
        &self,
        task: &Literal,
        state: &Monom,
        rest: &[Literal],
    ) -> Vec<HtnNode> {
        let instances =
            method_instances_for_task(&self.problem.methods, task, state, &self.constants);
        debug!("found {} applicable method instances for task {task}", instances.len());
        let mut successors = Vec::new();
        for instance in instances {
            let mut remaining = strip_network_tags(&instance.network_tasks());
            remaining.extend_from_slice(rest);
            successors.push(HtnNode {
                state: state.clone(),
                remaining_tasks: remaining,
                method_instance: Some(instance),
                action: None,
            });
        }
        successors
    }
}

impl GraphGenerator for HtnGraphGenerator {
    type Node = HtnNode;
    type Label = String;

    fn root(&self) -> HtnNode {
        HtnNode {
            state: self.problem.init.clone(),
            remaining_tasks: strip_network_tags(self.problem.network.chain()),
            method_instance: None,
            action: None,
        }
    }

    fn successors(
        &mut self,
        node: &HtnNode,
        cancel: &CancellationToken,
    ) -> Result<Vec<SuccessorDescription<HtnNode, String>>, SearchError> {
        let Some((next, rest)) = node.remaining_tasks.split_first() else {
            return Ok(Vec::new());
        };
        cancel.check()?;
        debug!("resolving task {next} against state {}", node.state);

        let successors = match self.primitive_tasks.get(next.predicate.as_str()) {
            Some(operation) => {
                self.successors_for_primitive_task(operation, next, &node.state, rest)
            }
            None => self.successors_for_compound_task(next, &node.state, rest),
        };
        cancel.check()?;

        Ok(successors
            .into_iter()
            .map(|successor| {
                let label = match (&successor.action, &successor.method_instance) {
                    (Some(action), _) => action.encoding(),
                    (None, Some(instance)) => instance.encoding(),
                    (None, None) => unreachable!("successor without an applied action or method"),
                };
                let HtnNode {
                    state,
                    remaining_tasks,
                    method_instance,
                    action,
                } = successor;
                SuccessorDescription {
                    node: HtnNode {
                        state,
                        remaining_tasks: order_tasks_by_priority(remaining_tasks),
                        method_instance,
                        action,
                    },
                    label,
                    kind: NodeKind::Or,
                }
            })
            .collect())
    }

    fn is_goal(&self, node: &HtnNode) -> bool {
        node.remaining_tasks.is_empty()
    }
}

impl HtnProblem {
    pub fn graph_generator(&self) -> HtnGraphGenerator {
        HtnGraphGenerator::new(self.clone())
    }

    /// Method-only nodes contribute no plan step; action nodes contribute
    /// their action in path order.
    pub fn decode_solution(&self, path: &[HtnNode]) -> Plan {
        Plan {
            actions: path.iter().filter_map(|node| node.action().cloned()).collect(),
        }
    }
}

/// f = g + h with g the path depth and h the number of unresolved tasks.
pub struct RemainingTasksEvaluator;

impl PathEvaluator<HtnNode, String> for RemainingTasksEvaluator {
    type Score = usize;

    fn evaluate(
        &mut self,
        path: &[HtnNode],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, EvaluationError> {
        if cancel.is_canceled() {
            return Err(EvaluationError::Canceled);
        }
        let head = match path.last() {
            Some(head) => head,
            None => return Ok(None),
        };
        Ok(Some(path.len() - 1 + head.remaining_tasks().len()))
    }
}
