use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub expanded_nodes: usize,
    pub generated_nodes: usize,
    pub pruned_nodes: usize,
    pub solutions_found: usize,
    pub window_growths: usize,
    pub time_ms: usize,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Time(ms) {:?} Expanded nodes {:?} Generated nodes {:?} Pruned nodes {:?} Solutions {:?} Window growths {:?}",
            self.time_ms,
            self.expanded_nodes,
            self.generated_nodes,
            self.pruned_nodes,
            self.solutions_found,
            self.window_growths
        );
    }
}
