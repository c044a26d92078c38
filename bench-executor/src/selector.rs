use crate::{ErrorCode, RunError};

/// Cycles through a fixed list of targets, round-robin.
///
/// Not meant to be shared, the dispatcher of a run owns it exclusively.
#[derive(Debug)]
pub struct TargetSelector<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> TargetSelector<T> {
    pub fn new(items: Vec<T>) -> Result<Self, RunError> {
        if items.is_empty() {
            return Err(RunError::new(
                ErrorCode::EmptyUrlList,
                "url list can't be empty",
            ));
        }
        Ok(TargetSelector { items, cursor: 0 })
    }

    /// Returns the target under the cursor and moves the cursor forward, wrapping to the
    /// beginning after the last one.
    pub fn next(&mut self) -> &T {
        let current = self.cursor;
        self.cursor += 1;
        if self.cursor == self.items.len() {
            self.cursor = 0;
        }
        &self.items[current]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
