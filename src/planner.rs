mod grounding;
mod htn;
mod strips;

pub use htn::{HtnGraphGenerator, HtnNode, RemainingTasksEvaluator};
pub use strips::{GoalCountEvaluator, StripsGraphGenerator, StripsPlanningNode};

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use thiserror::Error;
use tracing::info;

use crate::logic::{Literal, Monom, Substitution, Term};
use crate::search::{
    AwaStarSearch, CancellationToken, EvaluatedSearchPath, GraphGenerator, PathEvaluator,
    SearchError,
};
use crate::stat::Stats;

/// Configuration errors, raised eagerly before any search starts.
#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("literal {literal} in the {context} must be ground")]
    UngroundLiteral { literal: String, context: &'static str },
    #[error("literal {literal} in the {context} must be positive")]
    NegatedLiteral { literal: String, context: &'static str },
    #[error("{owner} references undeclared parameter {parameter}")]
    UndeclaredParameter { owner: String, parameter: String },
    #[error("duplicate operation name {0}")]
    DuplicateOperation(String),
    #[error("method {method} resolves primitive task {task}")]
    MethodForPrimitiveTask { method: String, task: String },
    #[error("task {task} cannot be resolved by any operation or method")]
    UnresolvableTask { task: String },
    #[error("task {task} has {found} arguments but its resolvers expect {expected}")]
    ArityMismatch { task: String, expected: usize, found: usize },
}

/// A lifted STRIPS operator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Operation {
    pub name: String,
    pub params: Vec<String>,
    pub precondition: Monom,
    pub add_list: Monom,
    pub delete_list: Monom,
}

impl Operation {
    pub fn new(
        name: &str,
        params: &[&str],
        precondition: Vec<Literal>,
        add_list: Vec<Literal>,
        delete_list: Vec<Literal>,
    ) -> Operation {
        Operation {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            precondition: precondition.into_iter().collect(),
            add_list: add_list.into_iter().collect(),
            delete_list: delete_list.into_iter().collect(),
        }
    }
}

/// A ground operator application.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Action {
    pub operation: Operation,
    pub grounding: Substitution,
}

impl Action {
    pub fn new(operation: Operation, grounding: Substitution) -> Action {
        Action { operation, grounding }
    }

    pub fn precondition(&self) -> Monom {
        self.operation.precondition.substitute(&self.grounding)
    }

    pub fn add_list(&self) -> Monom {
        self.operation.add_list.substitute(&self.grounding)
    }

    pub fn delete_list(&self) -> Monom {
        self.operation.delete_list.substitute(&self.grounding)
    }

    pub fn is_applicable_in(&self, state: &Monom) -> bool {
        self.precondition().satisfied_in(state)
    }

    pub fn apply_to(&self, state: &mut Monom) {
        state.remove_all(&self.delete_list());
        state.add_all(&self.add_list());
    }

    pub fn encoding(&self) -> String {
        let mut encoding = format!("{}(", self.operation.name);
        for (i, param) in self.operation.params.iter().enumerate() {
            if i > 0 {
                encoding.push_str(", ");
            }
            encoding.push_str(self.grounding.get(param).unwrap_or(param));
        }
        encoding.push(')');
        encoding
    }
}

/// A totally ordered chain of task literals.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskNetwork {
    chain: Vec<Literal>,
}

impl TaskNetwork {
    pub fn totally_ordered(chain: Vec<Literal>) -> TaskNetwork {
        TaskNetwork { chain }
    }

    pub fn chain(&self) -> &[Literal] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn constants(&self) -> BTreeSet<String> {
        let mut constants = BTreeSet::new();
        for task in &self.chain {
            for term in &task.terms {
                if let Term::Constant(name) = term {
                    constants.insert(name.clone());
                }
            }
        }
        constants
    }
}

/// A task-decomposition rule: resolves its head task into a network of
/// subtasks whenever its precondition holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Method {
    pub name: String,
    pub task: Literal,
    pub params: Vec<String>,
    pub precondition: Monom,
    pub network: TaskNetwork,
}

impl Method {
    pub fn new(
        name: &str,
        task: Literal,
        params: &[&str],
        precondition: Vec<Literal>,
        network: TaskNetwork,
    ) -> Method {
        Method {
            name: name.to_string(),
            task,
            params: params.iter().map(|p| p.to_string()).collect(),
            precondition: precondition.into_iter().collect(),
            network,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodInstance {
    pub method: Method,
    pub grounding: Substitution,
}

impl MethodInstance {
    pub fn new(method: Method, grounding: Substitution) -> MethodInstance {
        MethodInstance { method, grounding }
    }

    pub fn network_tasks(&self) -> Vec<Literal> {
        self.method
            .network
            .chain()
            .iter()
            .map(|task| task.substitute(&self.grounding))
            .collect()
    }

    pub fn encoding(&self) -> String {
        let mut encoding = format!("{}(", self.method.name);
        for (i, param) in self.method.params.iter().enumerate() {
            if i > 0 {
                encoding.push_str(", ");
            }
            encoding.push_str(self.grounding.get(param).unwrap_or(param));
        }
        encoding.push(')');
        encoding
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripsProblem {
    pub operations: Vec<Operation>,
    pub init: Monom,
    pub goal: Monom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtnProblem {
    pub operations: Vec<Operation>,
    pub methods: Vec<Method>,
    pub init: Monom,
    pub network: TaskNetwork,
}

/// The two supported planning-problem encodings. An explicit variant, not a
/// trait object: the generator factory is a plain match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningProblem {
    Strips(StripsProblem),
    Htn(HtnProblem),
}

impl StripsProblem {
    pub fn validate(&self) -> Result<(), ProblemError> {
        validate_operations(&self.operations)?;
        validate_state_literals(&self.init, "initial state")?;
        validate_state_literals(&self.goal, "goal")?;
        Ok(())
    }
}

impl HtnProblem {
    pub fn validate(&self) -> Result<(), ProblemError> {
        validate_operations(&self.operations)?;
        for method in &self.methods {
            if self.operations.iter().any(|op| op.name == method.task.predicate) {
                return Err(ProblemError::MethodForPrimitiveTask {
                    method: method.name.clone(),
                    task: method.task.predicate.clone(),
                });
            }
            validate_method(method)?;
            validate_network_tasks(method.network.chain(), &self.operations, &self.methods)?;
        }
        validate_state_literals(&self.init, "initial state")?;
        for task in self.network.chain() {
            if !task.positive {
                return Err(ProblemError::NegatedLiteral {
                    literal: task.to_string(),
                    context: "initial task network",
                });
            }
            if !task.is_ground() {
                return Err(ProblemError::UngroundLiteral {
                    literal: task.to_string(),
                    context: "initial task network",
                });
            }
        }
        validate_network_tasks(self.network.chain(), &self.operations, &self.methods)?;
        Ok(())
    }
}

impl PlanningProblem {
    pub fn validate(&self) -> Result<(), ProblemError> {
        match self {
            PlanningProblem::Strips(problem) => problem.validate(),
            PlanningProblem::Htn(problem) => problem.validate(),
        }
    }

    pub fn init(&self) -> &Monom {
        match self {
            PlanningProblem::Strips(problem) => &problem.init,
            PlanningProblem::Htn(problem) => &problem.init,
        }
    }

    /// Executes the plan from the initial state; for STRIPS problems the
    /// reached state must additionally cover the goal literals.
    pub fn is_valid_plan(&self, plan: &Plan) -> bool {
        match self {
            PlanningProblem::Strips(problem) => plan
                .execute(&problem.init)
                .map(|state| state.contains_all(&problem.goal))
                .unwrap_or(false),
            PlanningProblem::Htn(problem) => plan.execute(&problem.init).is_ok(),
        }
    }
}

fn validate_operations(operations: &[Operation]) -> Result<(), ProblemError> {
    let mut names = HashSet::new();
    for operation in operations {
        if !names.insert(operation.name.as_str()) {
            return Err(ProblemError::DuplicateOperation(operation.name.clone()));
        }
        validate_operation(operation)?;
    }
    Ok(())
}

fn validate_operation(operation: &Operation) -> Result<(), ProblemError> {
    let declared: BTreeSet<&str> = operation.params.iter().map(String::as_str).collect();
    for literal in operation.precondition.iter() {
        check_declared(&operation.name, literal, &declared)?;
    }
    for (literal, context) in operation
        .add_list
        .iter()
        .map(|l| (l, "add list"))
        .chain(operation.delete_list.iter().map(|l| (l, "delete list")))
    {
        if !literal.positive {
            return Err(ProblemError::NegatedLiteral {
                literal: literal.to_string(),
                context,
            });
        }
        check_declared(&operation.name, literal, &declared)?;
    }
    Ok(())
}

fn validate_method(method: &Method) -> Result<(), ProblemError> {
    let declared: BTreeSet<&str> = method.params.iter().map(String::as_str).collect();
    check_declared(&method.name, &method.task, &declared)?;
    for literal in method.precondition.iter() {
        check_declared(&method.name, literal, &declared)?;
    }
    for task in method.network.chain() {
        if !task.positive {
            return Err(ProblemError::NegatedLiteral {
                literal: task.to_string(),
                context: "task network",
            });
        }
        check_declared(&method.name, task, &declared)?;
    }
    Ok(())
}

fn check_declared(
    owner: &str,
    literal: &Literal,
    declared: &BTreeSet<&str>,
) -> Result<(), ProblemError> {
    for term in &literal.terms {
        if let Term::Variable(name) = term {
            if !declared.contains(name.as_str()) {
                return Err(ProblemError::UndeclaredParameter {
                    owner: owner.to_string(),
                    parameter: name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_state_literals(monom: &Monom, context: &'static str) -> Result<(), ProblemError> {
    for literal in monom.iter() {
        if !literal.positive {
            return Err(ProblemError::NegatedLiteral {
                literal: literal.to_string(),
                context,
            });
        }
        if !literal.is_ground() {
            return Err(ProblemError::UngroundLiteral {
                literal: literal.to_string(),
                context,
            });
        }
    }
    Ok(())
}

fn validate_network_tasks(
    tasks: &[Literal],
    operations: &[Operation],
    methods: &[Method],
) -> Result<(), ProblemError> {
    for task in tasks {
        let name = htn::strip_ordering_tag(&task.predicate);
        if let Some(operation) = operations.iter().find(|op| op.name == name) {
            if operation.params.len() != task.arity() {
                return Err(ProblemError::ArityMismatch {
                    task: task.to_string(),
                    expected: operation.params.len(),
                    found: task.arity(),
                });
            }
        } else {
            let resolvers: Vec<&Method> =
                methods.iter().filter(|m| m.task.predicate == name).collect();
            if resolvers.is_empty() {
                return Err(ProblemError::UnresolvableTask {
                    task: task.to_string(),
                });
            }
            if !resolvers.iter().any(|m| m.task.arity() == task.arity()) {
                return Err(ProblemError::ArityMismatch {
                    task: task.to_string(),
                    expected: resolvers[0].task.arity(),
                    found: task.arity(),
                });
            }
        }
    }
    Ok(())
}

/// An ordered action sequence decoded from a solution path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn encodings(&self) -> Vec<String> {
        self.actions.iter().map(Action::encoding).collect()
    }

    /// Applies the actions in order, checking every precondition.
    pub fn execute(&self, init: &Monom) -> anyhow::Result<Monom> {
        let mut state = init.clone();
        for action in &self.actions {
            if !action.is_applicable_in(&state) {
                return Err(anyhow!(
                    "action {} is not applicable in state {}",
                    action.encoding(),
                    state
                ));
            }
            action.apply_to(&mut state);
        }
        Ok(state)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "<empty plan>");
        }
        write!(f, "{}", self.encodings().join(" -> "))
    }
}

#[derive(Debug, Clone)]
pub struct SolveOptions {
    pub max_solutions: usize,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for SolveOptions {
    fn default() -> SolveOptions {
        SolveOptions {
            max_solutions: 1,
            timeout: None,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedPlan {
    pub plan: Plan,
    pub score: usize,
}

#[derive(Debug, Clone)]
pub struct SolveReport {
    pub plans: Vec<RankedPlan>,
    pub stats: Stats,
    pub timed_out: bool,
}

/// Builds the graph generator matching the problem variant and drives the
/// anytime search until enough solutions were collected or the graph is
/// exhausted. A timeout yields a partial report instead of an error.
///
/// The problem must have passed `validate()`.
pub fn solve(problem: &PlanningProblem, options: &SolveOptions) -> Result<SolveReport, SearchError> {
    debug_assert!(problem.validate().is_ok(), "solve() expects a validated problem");
    match problem {
        PlanningProblem::Strips(strips) => {
            let search = configure(
                AwaStarSearch::new(strips.graph_generator(), GoalCountEvaluator::new(strips)),
                options,
            );
            run_to_report(search, options, |solution| strips.decode_solution(&solution.nodes))
        }
        PlanningProblem::Htn(htn) => {
            let search = configure(
                AwaStarSearch::new(htn.graph_generator(), RemainingTasksEvaluator),
                options,
            );
            run_to_report(search, options, |solution| htn.decode_solution(&solution.nodes))
        }
    }
}

fn configure<G, E>(search: AwaStarSearch<G, E>, options: &SolveOptions) -> AwaStarSearch<G, E>
where
    G: GraphGenerator,
    E: PathEvaluator<G::Node, G::Label>,
{
    let mut search = search;
    if let Some(timeout) = options.timeout {
        search = search.with_timeout(timeout);
    }
    if let Some(cancel) = &options.cancel {
        search = search.with_cancellation_token(cancel.clone());
    }
    search
}

fn run_to_report<G, E, F>(
    mut search: AwaStarSearch<G, E>,
    options: &SolveOptions,
    decode: F,
) -> Result<SolveReport, SearchError>
where
    G: GraphGenerator,
    E: PathEvaluator<G::Node, G::Label, Score = usize>,
    F: Fn(&EvaluatedSearchPath<G::Node, G::Label, usize>) -> Plan,
{
    let solve_start = Instant::now();
    let mut plans = Vec::new();
    let mut timed_out = false;
    while plans.len() < options.max_solutions {
        match search.next_solution() {
            Ok(Some(solution)) => {
                let plan = decode(&solution);
                info!("solution candidate with score {} decodes to {plan}", solution.score);
                plans.push(RankedPlan {
                    plan,
                    score: solution.score,
                });
            }
            Ok(None) => break,
            Err(SearchError::Timeout(limit)) => {
                info!(
                    "search timed out after {limit:?}, returning the {} plans found so far",
                    plans.len()
                );
                timed_out = true;
                break;
            }
            Err(error) => return Err(error),
        }
    }
    let mut stats = search.stats().clone();
    stats.time_ms = solve_start.elapsed().as_millis() as usize;
    stats.print();
    Ok(SolveReport {
        plans,
        stats,
        timed_out,
    })
}
