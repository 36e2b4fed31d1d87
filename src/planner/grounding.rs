use std::collections::BTreeSet;

use tracing::trace;

use super::{Action, Method, MethodInstance, Operation};
use crate::logic::{Literal, Monom, Substitution, Term};

/// Every total mapping of `variables` into `constants`.
pub(crate) fn all_total_mappings(
    variables: &[String],
    constants: &BTreeSet<String>,
) -> Vec<Substitution> {
    if variables.is_empty() {
        return vec![Substitution::new()];
    }
    let constants: Vec<&String> = constants.iter().collect();
    let mut mappings = Vec::new();
    if constants.is_empty() {
        return mappings;
    }
    let mut indices = vec![0usize; variables.len()];
    loop {
        let mut substitution = Substitution::new();
        for (variable, &index) in variables.iter().zip(&indices) {
            substitution.bind(variable, constants[index]);
        }
        mappings.push(substitution);

        let mut position = 0;
        loop {
            indices[position] += 1;
            if indices[position] < constants.len() {
                break;
            }
            indices[position] = 0;
            position += 1;
            if position == variables.len() {
                return mappings;
            }
        }
    }
}

/// All ground actions whose precondition holds in `state`.
pub(crate) fn applicable_actions(
    state: &Monom,
    operations: &[Operation],
    constants: &BTreeSet<String>,
) -> Vec<Action> {
    let mut actions = Vec::new();
    for operation in operations {
        for grounding in all_total_mappings(&operation.params, constants) {
            if operation.precondition.substitute(&grounding).satisfied_in(state) {
                trace!("operation {} is applicable under {grounding:?}", operation.name);
                actions.push(Action::new(operation.clone(), grounding));
            }
        }
    }
    actions
}

/// The action instances resolving a ground primitive task. The task
/// arguments bind the operation parameters positionally, so there is at
/// most one candidate instance.
pub(crate) fn actions_for_primitive_task(
    operation: &Operation,
    task: &Literal,
    state: &Monom,
) -> Vec<Action> {
    assert_eq!(
        operation.params.len(),
        task.arity(),
        "task {task} does not match the parameters of operation {}",
        operation.name
    );
    let mut grounding = Substitution::new();
    for (param, term) in operation.params.iter().zip(&task.terms) {
        match term {
            Term::Constant(constant) => grounding.bind(param, constant),
            Term::Variable(_) => {
                panic!("task {task} handed to the decomposition generator must be ground")
            }
        }
    }
    let action = Action::new(operation.clone(), grounding);
    if action.is_applicable_in(state) {
        vec![action]
    } else {
        Vec::new()
    }
}

/// All method instances whose head unifies with the (ground) task and whose
/// precondition holds in `state`. Method parameters that do not occur in
/// the head are ground over the constant universe.
pub(crate) fn method_instances_for_task(
    methods: &[Method],
    task: &Literal,
    state: &Monom,
    constants: &BTreeSet<String>,
) -> Vec<MethodInstance> {
    let mut instances = Vec::new();
    for method in methods {
        if method.task.predicate != task.predicate || method.task.arity() != task.arity() {
            continue;
        }
        let mut base = Substitution::new();
        let mut unifies = true;
        for (head_term, task_term) in method.task.terms.iter().zip(&task.terms) {
            let constant = match task_term {
                Term::Constant(constant) => constant,
                Term::Variable(_) => {
                    panic!("task {task} handed to the decomposition generator must be ground")
                }
            };
            match head_term {
                Term::Variable(variable) => match base.get(variable) {
                    Some(bound) if bound != constant => {
                        unifies = false;
                        break;
                    }
                    Some(_) => {}
                    None => base.bind(variable, constant),
                },
                Term::Constant(head_constant) => {
                    if head_constant != constant {
                        unifies = false;
                        break;
                    }
                }
            }
        }
        if !unifies {
            continue;
        }
        let free: Vec<String> = method
            .params
            .iter()
            .filter(|param| base.get(param).is_none())
            .cloned()
            .collect();
        for extension in all_total_mappings(&free, constants) {
            let grounding = base.merged_with(&extension);
            if method.precondition.substitute(&grounding).satisfied_in(state) {
                instances.push(MethodInstance::new(method.clone(), grounding));
            }
        }
    }
    instances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TaskNetwork;

    fn toggle_operation() -> Operation {
        Operation::new(
            "toggle",
            &["x"],
            vec![
                Literal::atom("lamp", &["x"]),
                Literal::atom("lit", &["x"]).negated(),
            ],
            vec![Literal::atom("lit", &["x"])],
            vec![Literal::atom("dark", &["x"])],
        )
    }

    #[test]
    fn test_all_total_mappings_enumerates_the_product() {
        let variables = vec!["x".to_string(), "y".to_string()];
        let constants: BTreeSet<String> =
            ["a", "b", "c"].iter().map(|c| c.to_string()).collect();
        let mappings = all_total_mappings(&variables, &constants);
        assert_eq!(mappings.len(), 9);
        assert!(mappings.iter().all(|m| m.len() == 2));

        assert_eq!(all_total_mappings(&[], &constants).len(), 1);
        assert!(all_total_mappings(&variables, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_applicable_actions_respect_negative_preconditions() {
        let state: Monom = vec![
            Literal::fact("lamp", &["l1"]),
            Literal::fact("lamp", &["l2"]),
            Literal::fact("lit", &["l2"]),
        ]
        .into_iter()
        .collect();
        let operations = vec![toggle_operation()];
        let constants = state.constants();

        let actions = applicable_actions(&state, &operations, &constants);
        // l2 is already lit, so only l1 can be toggled.
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].encoding(), "toggle(l1)");
    }

    #[test]
    fn test_primitive_task_grounds_positionally() {
        let state: Monom = vec![Literal::fact("lamp", &["l1"])].into_iter().collect();
        let operation = toggle_operation();

        let actions =
            actions_for_primitive_task(&operation, &Literal::fact("toggle", &["l1"]), &state);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].grounding.get("x"), Some("l1"));

        let inapplicable =
            actions_for_primitive_task(&operation, &Literal::fact("toggle", &["l9"]), &state);
        assert!(inapplicable.is_empty());
    }

    #[test]
    fn test_method_instances_ground_free_parameters() {
        let method = Method::new(
            "m-light-room",
            Literal::atom("light-room", &["room"]),
            &["room", "lamp"],
            vec![
                Literal::atom("in", &["lamp", "room"]),
                Literal::atom("lamp", &["lamp"]),
            ],
            TaskNetwork::totally_ordered(vec![Literal::atom("toggle", &["lamp"])]),
        );
        let state: Monom = vec![
            Literal::fact("lamp", &["l1"]),
            Literal::fact("lamp", &["l2"]),
            Literal::fact("in", &["l1", "kitchen"]),
            Literal::fact("in", &["l2", "cellar"]),
        ]
        .into_iter()
        .collect();
        let constants = state.constants();

        let instances = method_instances_for_task(
            &[method],
            &Literal::fact("light-room", &["kitchen"]),
            &state,
            &constants,
        );
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].grounding.get("lamp"), Some("l1"));
        assert_eq!(
            instances[0].network_tasks(),
            vec![Literal::fact("toggle", &["l1"])]
        );
    }
}
