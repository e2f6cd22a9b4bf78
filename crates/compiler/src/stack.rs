use whistle_ir::ValueSource;

use crate::call::project;

/// The conditions in force within one scope, innermost last.
#[derive(Debug, Clone, Default)]
pub struct ValueStack {
    items: Vec<ValueSource>,
}

impl ValueStack {
    pub fn push(&mut self, condition: ValueSource) {
        self.items.push(condition);
    }

    pub fn pop(&mut self) -> Option<ValueSource> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Conjunction of the stack followed by `others`.
    ///
    /// `None` when there is nothing to combine; a single condition is
    /// returned as is; otherwise one flat `$And` call over all of them.
    pub fn and(&self, others: &[ValueSource]) -> Option<ValueSource> {
        let mut all: Vec<ValueSource> = self.items.iter().chain(others).cloned().collect();
        match all.len() {
            0 => None,
            1 => all.pop(),
            _ => Some(project("$And", all)),
        }
    }
}
