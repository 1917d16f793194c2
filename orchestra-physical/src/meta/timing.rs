//! Code for timing blocks of code

use std::{cmp::Reverse, fmt, time::Duration, time::Instant};

use ascii_tree::{write_tree, Tree};
use linked_hash_map::LinkedHashMap;

/// Represents a block of code that is timed
#[derive(Default, Copy, Clone)]
pub struct TimedCodeInfo {
    total_system_time: Duration,
    start_system: Option<Instant>,
    runs: u64,
}

impl TimedCodeInfo {
    /// Create new [TimedCodeInfo] object
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total system time for this node.
    pub fn system_time(&self) -> Duration {
        self.total_system_time
    }

    /// Returns how often the block was measured.
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

impl fmt::Debug for TimedCodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run_msg = if self.start_system.is_some() {
            "currently running"
        } else {
            "currently not running"
        };
        write!(
            f,
            "TimedCodeInfo [total (msec): {}, {:?} completed runs, {}]",
            self.total_system_time.as_millis(),
            self.runs,
            run_msg,
        )
    }
}

/// How to sort the elements of a [TimedCode] object
#[derive(Debug, Copy, Clone, Default)]
pub enum TimedSorting {
    /// The order the code got called in
    #[default]
    Default,
    /// Alphabetical by the title of the block
    Alphabetical,
    /// Show the blocks which took longest first
    LongestTime,
}

/// Represents a block of code that is timed
///
/// Unlike a process-wide timer, every reconciliation round owns its own tree.
#[derive(Debug, Default, Clone)]
pub struct TimedCode {
    info: TimedCodeInfo,
    subblocks: LinkedHashMap<String, TimedCode>,
}

impl TimedCode {
    /// Create new [TimedCode] object
    pub fn new() -> Self {
        Self {
            info: TimedCodeInfo::new(),
            subblocks: LinkedHashMap::new(),
        }
    }

    /// Return an iterator through the sub-nodes
    pub fn sub_nodes(&self) -> impl Iterator<Item = (&str, &TimedCode)> {
        self.subblocks.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Return the recorded timings for this block
    pub fn timings(&self) -> &TimedCodeInfo {
        &self.info
    }

    /// Reset the current node, remove all subnodes
    pub fn reset(&mut self) {
        self.info = Default::default();
        self.subblocks.clear();
    }

    /// Navigate to a subblock (use forward slash to go multiple layers at once)
    pub fn sub(&mut self, name: &str) -> &mut TimedCode {
        let mut current_block = self;
        for part in name.split('/') {
            current_block = current_block
                .subblocks
                .entry(part.to_string())
                .or_default()
        }

        current_block
    }

    /// Return the subblock with the given path, if it was ever measured.
    pub fn get(&self, name: &str) -> Option<&TimedCode> {
        let mut current_block = self;
        for part in name.split('/') {
            current_block = current_block.subblocks.get(part)?;
        }

        Some(current_block)
    }

    /// Return the total system time this block took.
    pub fn total_system_time(&self) -> Duration {
        self.info.total_system_time
    }

    /// Start the next measurement
    pub fn start(&mut self) {
        debug_assert!(self.info.start_system.is_none());

        self.info.start_system = Some(Instant::now());
    }

    /// Stop the current measurement and save the times
    ///
    /// Returns the duration of the measurement that just ended.
    pub fn stop(&mut self) -> Duration {
        let duration = self
            .info
            .start_system
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();

        self.info.total_system_time += duration;
        self.info.runs += 1;

        duration
    }

    /// Add a duration that was measured elsewhere.
    pub fn record(&mut self, duration: Duration) {
        self.info.total_system_time += duration;
        self.info.runs += 1;
    }

    fn sorted_blocks(&self, sorting: TimedSorting) -> Vec<(&String, &TimedCode)> {
        let mut blocks: Vec<(&String, &TimedCode)> = self.subblocks.iter().collect();

        match sorting {
            TimedSorting::Default => {}
            TimedSorting::Alphabetical => blocks.sort_by_key(|entry| entry.0),
            TimedSorting::LongestTime => {
                blocks.sort_by_key(|entry| Reverse(entry.1.info.total_system_time))
            }
        };

        blocks
    }

    /// Turns e.g. (Test, 0.642355,1234,56) into "Test [64.2%, 1234ms, 56x]"
    fn format_title(title: &str, percentage: f64, msecs: u128, runs: u64) -> String {
        format!("{title} [{percentage:.1}%, {msecs}ms, {runs}x]")
    }

    /// Create ASCII tree recursively
    fn create_tree_recursive(current_node: &TimedCode, title: String, sorting: TimedSorting) -> Tree {
        let mut subnodes = Vec::<Tree>::new();

        for (name, block) in current_node.sorted_blocks(sorting) {
            let percentage = if current_node.info.total_system_time > Duration::ZERO {
                100.0
                    * (block.info.total_system_time.as_secs_f64()
                        / current_node.info.total_system_time.as_secs_f64())
            } else {
                0.0
            };

            subnodes.push(TimedCode::create_tree_recursive(
                block,
                TimedCode::format_title(
                    name,
                    percentage,
                    block.info.total_system_time.as_millis(),
                    block.info.runs,
                ),
                sorting,
            ));
        }

        if subnodes.is_empty() {
            Tree::Leaf(vec![title])
        } else {
            Tree::Node(title, subnodes)
        }
    }

    /// Creates an ASCII tree
    pub fn create_tree(&self, title: &str, sorting: TimedSorting) -> Tree {
        let title_string = format!("{title} [{}ms]", self.info.total_system_time.as_millis());
        TimedCode::create_tree_recursive(self, title_string, sorting)
    }

    /// Creates an ASCII tree and converts it to a string representation
    pub fn create_tree_string(&self, title: &str, sorting: TimedSorting) -> String {
        let tree = self.create_tree(title, sorting);

        let mut output = String::new();
        if write_tree(&mut output, &tree).is_err() {
            log::warn!("unable to render timing tree");
        }

        output
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{TimedCode, TimedSorting};

    #[test]
    fn nested_blocks() {
        let mut timing = TimedCode::new();
        timing.record(Duration::from_millis(10));
        timing.sub("Deletion/Main").record(Duration::from_millis(4));
        timing.sub("Deletion/Main").record(Duration::from_millis(2));
        timing.sub("Insertion").record(Duration::from_millis(3));

        let main = timing.get("Deletion/Main").unwrap();
        assert_eq!(main.total_system_time(), Duration::from_millis(6));
        assert_eq!(main.timings().runs(), 2);
        assert!(timing.get("Insertion/Main").is_none());

        let rendered = timing.create_tree_string("Round", TimedSorting::Default);
        assert!(rendered.contains("Round [10ms]"));
        assert!(rendered.contains("Main"));
    }

    #[test]
    fn start_stop() {
        let mut timing = TimedCode::new();
        timing.start();
        let measured = timing.stop();

        assert_eq!(timing.total_system_time(), measured);
        assert_eq!(timing.timings().runs(), 1);
    }
}
