use crate::types::Point;

/// Mutable state threaded through one run of a step sequence.
///
/// Created when a run starts and dropped when the caller is done with the
/// report; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Center of the most recent successful search, where the pointer was sent
    pub last_search_position: Option<Point>,
    /// Top-left of the most recent match; continuation searches resume after it
    pub last_match: Option<Point>,
    /// Where this run believes the pointer is
    pub current_pointer: Point,
    failed_step: Option<usize>,
}

impl RunContext {
    pub fn new(pointer: Point) -> Self {
        Self { current_pointer: pointer, ..Self::default() }
    }

    pub fn failed_step(&self) -> Option<usize> {
        self.failed_step
    }

    /// Record the step that aborted the run. Only the first call sticks.
    pub(crate) fn mark_failed(&mut self, index: usize) {
        if self.failed_step.is_none() {
            self.failed_step = Some(index);
        }
    }

    pub(crate) fn record_match(&mut self, top_left: Point, center: Point) {
        self.last_match = Some(top_left);
        self.last_search_position = Some(center);
        self.current_pointer = center;
    }
}
