use anyhow::anyhow;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Config;
use crate::logic::{Literal, Monom};
use crate::planner::{HtnProblem, Method, Operation, PlanningProblem, StripsProblem, TaskNetwork};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    Blocksworld { num_blocks: usize },
    RandomBlocksworld { num_blocks: usize },
    Dockworker,
}

impl Scenario {
    pub fn from_config(config: &Config) -> anyhow::Result<Scenario> {
        match config.scenario.as_str() {
            "blocksworld" => Ok(Scenario::Blocksworld {
                num_blocks: config.num_blocks,
            }),
            "random-blocksworld" => Ok(Scenario::RandomBlocksworld {
                num_blocks: config.num_blocks,
            }),
            "dockworker" => Ok(Scenario::Dockworker),
            other => Err(anyhow!("unknown scenario {other}")),
        }
    }

    pub fn build(&self, rng: &mut StdRng) -> PlanningProblem {
        match self {
            Scenario::Blocksworld { num_blocks } => {
                PlanningProblem::Strips(blocksworld(*num_blocks))
            }
            Scenario::RandomBlocksworld { num_blocks } => {
                PlanningProblem::Strips(random_blocksworld(*num_blocks, rng))
            }
            Scenario::Dockworker => PlanningProblem::Htn(dockworker()),
        }
    }
}

fn block_names(num_blocks: usize) -> Vec<String> {
    assert!(
        (1..=26).contains(&num_blocks),
        "block names are single letters, got {num_blocks} blocks"
    );
    (0..num_blocks)
        .map(|i| ((b'a' + i as u8) as char).to_string())
        .collect()
}

fn blocksworld_operations() -> Vec<Operation> {
    vec![
        Operation::new(
            "pick-up",
            &["x"],
            vec![
                Literal::atom("clear", &["x"]),
                Literal::atom("ontable", &["x"]),
                Literal::fact("handempty", &[]),
            ],
            vec![Literal::atom("holding", &["x"])],
            vec![
                Literal::atom("ontable", &["x"]),
                Literal::atom("clear", &["x"]),
                Literal::fact("handempty", &[]),
            ],
        ),
        Operation::new(
            "put-down",
            &["x"],
            vec![Literal::atom("holding", &["x"])],
            vec![
                Literal::atom("ontable", &["x"]),
                Literal::atom("clear", &["x"]),
                Literal::fact("handempty", &[]),
            ],
            vec![Literal::atom("holding", &["x"])],
        ),
        Operation::new(
            "stack",
            &["x", "y"],
            vec![Literal::atom("holding", &["x"]), Literal::atom("clear", &["y"])],
            vec![
                Literal::atom("on", &["x", "y"]),
                Literal::atom("clear", &["x"]),
                Literal::fact("handempty", &[]),
            ],
            vec![Literal::atom("holding", &["x"]), Literal::atom("clear", &["y"])],
        ),
        Operation::new(
            "unstack",
            &["x", "y"],
            vec![
                Literal::atom("on", &["x", "y"]),
                Literal::atom("clear", &["x"]),
                Literal::fact("handempty", &[]),
            ],
            vec![Literal::atom("holding", &["x"]), Literal::atom("clear", &["y"])],
            vec![
                Literal::atom("on", &["x", "y"]),
                Literal::atom("clear", &["x"]),
                Literal::fact("handempty", &[]),
            ],
        ),
    ]
}

fn tower_goal(blocks: &[String]) -> Monom {
    let mut goal = Monom::new();
    for pair in blocks.windows(2) {
        goal.insert(Literal::fact("on", &[pair[1].as_str(), pair[0].as_str()]));
    }
    goal
}

/// The classic Blocks World: all blocks clear on the table, the goal is the
/// single tower a..z bottom-up.
pub fn blocksworld(num_blocks: usize) -> StripsProblem {
    let blocks = block_names(num_blocks);
    let mut init = Monom::new();
    init.insert(Literal::fact("handempty", &[]));
    for block in &blocks {
        init.insert(Literal::fact("clear", &[block.as_str()]));
        init.insert(Literal::fact("ontable", &[block.as_str()]));
    }
    StripsProblem {
        operations: blocksworld_operations(),
        init,
        goal: tower_goal(&blocks),
    }
}

/// Blocks World with a seeded random initial stack configuration and the
/// same tower goal.
pub fn random_blocksworld(num_blocks: usize, rng: &mut StdRng) -> StripsProblem {
    let blocks = block_names(num_blocks);
    let mut shuffled = blocks.clone();
    shuffled.shuffle(rng);

    let mut init = Monom::new();
    init.insert(Literal::fact("handempty", &[]));
    let mut index = 0;
    while index < shuffled.len() {
        let height = rng.gen_range(1..=shuffled.len() - index);
        let stack = &shuffled[index..index + height];
        init.insert(Literal::fact("ontable", &[stack[0].as_str()]));
        for pair in stack.windows(2) {
            init.insert(Literal::fact("on", &[pair[1].as_str(), pair[0].as_str()]));
        }
        init.insert(Literal::fact("clear", &[stack[height - 1].as_str()]));
        index += height;
    }

    StripsProblem {
        operations: blocksworld_operations(),
        init,
        goal: tower_goal(&blocks),
    }
}

/// The dockworker factory problem: robot r1 starts at l1, container c3 sits
/// in pile p2 at l2, and the initial network asks to deliver c3 to l1.
pub fn dockworker() -> HtnProblem {
    let operations = vec![
        Operation::new(
            "move",
            &["r", "from", "to"],
            vec![
                Literal::atom("at", &["r", "from"]),
                Literal::atom("adjacent", &["from", "to"]),
            ],
            vec![Literal::atom("at", &["r", "to"])],
            vec![Literal::atom("at", &["r", "from"])],
        ),
        Operation::new(
            "take",
            &["k", "l", "c", "p"],
            vec![
                Literal::atom("belong", &["k", "l"]),
                Literal::atom("attached", &["p", "l"]),
                Literal::atom("in", &["c", "p"]),
                Literal::atom("top", &["c", "p"]),
                Literal::atom("empty", &["k"]),
            ],
            vec![Literal::atom("holding", &["k", "c"])],
            vec![
                Literal::atom("in", &["c", "p"]),
                Literal::atom("top", &["c", "p"]),
                Literal::atom("empty", &["k"]),
            ],
        ),
        Operation::new(
            "load",
            &["k", "l", "c", "r"],
            vec![
                Literal::atom("belong", &["k", "l"]),
                Literal::atom("holding", &["k", "c"]),
                Literal::atom("at", &["r", "l"]),
                Literal::atom("unloaded", &["r"]),
            ],
            vec![
                Literal::atom("loaded", &["r", "c"]),
                Literal::atom("empty", &["k"]),
            ],
            vec![
                Literal::atom("holding", &["k", "c"]),
                Literal::atom("unloaded", &["r"]),
            ],
        ),
    ];

    let methods = vec![
        Method::new(
            "m-fetch",
            Literal::atom("fetch", &["r", "c"]),
            &["r", "c", "lr", "lc", "k", "p"],
            vec![
                Literal::atom("at", &["r", "lr"]),
                Literal::atom("attached", &["p", "lc"]),
                Literal::atom("in", &["c", "p"]),
                Literal::atom("belong", &["k", "lc"]),
                Literal::atom("adjacent", &["lr", "lc"]),
            ],
            TaskNetwork::totally_ordered(vec![
                Literal::atom("1-move", &["r", "lr", "lc"]),
                Literal::atom("2-take", &["k", "lc", "c", "p"]),
                Literal::atom("3-load", &["k", "lc", "c", "r"]),
            ]),
        ),
        Method::new(
            "m-deliver",
            Literal::atom("deliver", &["r", "c", "ld"]),
            &["r", "c", "ld", "lc", "p"],
            vec![
                Literal::atom("attached", &["p", "lc"]),
                Literal::atom("in", &["c", "p"]),
                Literal::atom("adjacent", &["lc", "ld"]),
            ],
            TaskNetwork::totally_ordered(vec![
                Literal::atom("1-fetch", &["r", "c"]),
                Literal::atom("2-move", &["r", "lc", "ld"]),
            ]),
        ),
    ];

    let init: Monom = vec![
        Literal::fact("at", &["r1", "l1"]),
        Literal::fact("adjacent", &["l1", "l2"]),
        Literal::fact("adjacent", &["l2", "l1"]),
        Literal::fact("attached", &["p1", "l1"]),
        Literal::fact("attached", &["p2", "l2"]),
        Literal::fact("in", &["c1", "p1"]),
        Literal::fact("top", &["c1", "p1"]),
        Literal::fact("in", &["c3", "p2"]),
        Literal::fact("top", &["c3", "p2"]),
        Literal::fact("belong", &["k1", "l1"]),
        Literal::fact("belong", &["k2", "l2"]),
        Literal::fact("empty", &["k1"]),
        Literal::fact("empty", &["k2"]),
        Literal::fact("unloaded", &["r1"]),
    ]
    .into_iter()
    .collect();

    HtnProblem {
        operations,
        methods,
        init,
        network: TaskNetwork::totally_ordered(vec![Literal::fact(
            "deliver",
            &["r1", "c3", "l1"],
        )]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_blocksworld_shape() {
        let problem = blocksworld(4);
        assert_eq!(problem.operations.len(), 4);
        // clear + ontable per block, plus handempty.
        assert_eq!(problem.init.len(), 9);
        assert_eq!(problem.goal.len(), 3);
        problem.validate().unwrap();
    }

    #[test]
    fn test_random_blocksworld_is_well_formed() {
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let problem = random_blocksworld(5, &mut rng);
            problem.validate().unwrap();

            let ontable = problem.init.iter().filter(|l| l.predicate == "ontable").count();
            let on = problem.init.iter().filter(|l| l.predicate == "on").count();
            let clear = problem.init.iter().filter(|l| l.predicate == "clear").count();
            // Every block is either on the table or on another block, and
            // every stack has exactly one clear top.
            assert_eq!(ontable + on, 5);
            assert_eq!(clear, ontable);
            assert!(problem.init.contains(&Literal::fact("handempty", &[])));
        }
    }

    #[test]
    fn test_dockworker_validates() {
        let problem = dockworker();
        problem.validate().unwrap();
        assert_eq!(problem.network.len(), 1);
    }

    #[test]
    fn test_unknown_scenario_is_rejected() {
        let mut config = Config::default();
        config.scenario = "towers-of-hanoi".to_string();
        assert!(Scenario::from_config(&config).is_err());
    }
}
