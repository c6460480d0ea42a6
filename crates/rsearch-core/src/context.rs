//! Application context
//!
//! Owns the single transposition table, node registry and time manager of an
//! engine process. The search driver holds one `EngineContext` and lends it to
//! its workers; nothing here is global.
//!
//! Lifecycle per game:
//! 1. `apply_options` after every `setoption` batch (resizes the table if needed)
//! 2. `new_game` on `ucinewgame`
//! 3. `start_search` before each search, then each worker calls `worker_setup`
//! 4. workers probe `tt()` concurrently until the search stops

use std::sync::Arc;

use log::info;

use crate::history::CounterMoveHistory;
use crate::numa::{ComputeNode, NodeRegistry};
use crate::options::{CoreOptions, OptionSource};
use crate::output::SyncOutput;
use crate::time::{SearchLimits, TimeManager, TimePlan};
use crate::tt::TranspositionTable;
use crate::types::{Color, Value};

/// What a search worker gets from `worker_setup`
pub struct WorkerSetup<'a> {
    pub node: &'a ComputeNode,
    /// Whether the thread is now restricted to the node's processors
    pub bound: bool,
    pub history: &'a CounterMoveHistory,
}

pub struct EngineContext {
    tt: TranspositionTable,
    nodes: NodeRegistry,
    time: TimeManager,
    options: CoreOptions,
    output: Arc<dyn SyncOutput>,
}

impl EngineContext {
    /// Discovers the machine topology and sizes the table from `options`
    pub fn new(options: CoreOptions, output: Arc<dyn SyncOutput>) -> Self {
        Self::with_registry(options, NodeRegistry::discover(), output)
    }

    pub fn with_registry(options: CoreOptions, nodes: NodeRegistry, output: Arc<dyn SyncOutput>) -> Self {
        let tt = TranspositionTable::new(options.hash_mb, options.large_pages);
        let ctx = Self {
            tt,
            nodes,
            time: TimeManager::new(),
            options,
            output,
        };
        ctx.report_large_pages();
        ctx
    }

    /// Re-reads the options; returns `true` if the table was reallocated
    pub fn apply_options(&mut self, source: &dyn OptionSource) -> bool {
        self.options = CoreOptions::from_source(source);
        let resized = self.tt.resize(self.options.hash_mb, self.options.large_pages);
        if resized {
            self.report_large_pages();
        }
        resized
    }

    fn report_large_pages(&self) {
        let message = large_pages_message(
            self.options.large_pages,
            self.tt.uses_large_pages(),
            self.tt.size_bytes() >> 20,
        );
        if let Some(message) = message {
            self.output.info_string(&message);
        }
    }

    /// Forgets everything learned in the previous game
    pub fn new_game(&mut self) {
        self.tt.clear();
        self.time.new_game();
        for node in self.nodes.nodes() {
            if node.scratch_addr().is_some() {
                node.scratch().clear();
            }
        }
        info!("new game: hash and history cleared");
    }

    /// Advances the table generation and computes the time budget
    pub fn start_search(&mut self, limits: &mut SearchLimits, us: Color, ply: i32, score: Value) -> TimePlan {
        self.tt.new_search();
        let time_options = self.options.time_options();
        self.time.init(limits, us, ply, score, &time_options)
    }

    /// Called by the `thread_index`-th worker on its own thread before it
    /// starts searching
    pub fn worker_setup(&self, thread_index: usize) -> WorkerSetup<'_> {
        let node = self.nodes.preferred_node(thread_index);
        let bound = !node.is_dummy() && self.nodes.bind(node).is_ok();
        WorkerSetup {
            node,
            bound,
            history: node.scratch(),
        }
    }

    /// Writes the topology dump to the output
    pub fn display_topology(&self) {
        self.nodes.display(self.output.as_ref());
    }

    #[inline]
    pub fn tt(&self) -> &TranspositionTable {
        &self.tt
    }

    /// Exclusive access for save/load between searches
    pub fn tt_mut(&mut self) -> &mut TranspositionTable {
        &mut self.tt
    }

    pub fn nodes(&self) -> &NodeRegistry {
        &self.nodes
    }

    pub fn time(&self) -> &TimeManager {
        &self.time
    }

    pub fn time_mut(&mut self) -> &mut TimeManager {
        &mut self.time
    }

    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    pub fn output(&self) -> &dyn SyncOutput {
        self.output.as_ref()
    }
}

/// GUI diagnostic for the page mode of a fresh table allocation
fn large_pages_message(requested: bool, granted: bool, size_mb: usize) -> Option<String> {
    match (requested, granted) {
        (_, true) => Some(format!("LargePages {size_mb} Mb")),
        (true, false) => Some("No Privilege for Large Pages, using regular pages".to_string()),
        (false, false) => None,
    }
}
