use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ReplayError, Result};
use crate::lua_rt::ScriptHost;
use crate::pattern::PatternStore;
use crate::step::Step;

/// Ordered, index-addressed list of steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSequence {
    steps: Vec<Step>,
}

/// Authoring edit to a sequence. Edits that arrive while a run is active are
/// held back until it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceEdit {
    Push(Step),
    Insert(usize, Step),
    Remove(usize),
    MoveUp(usize),
    MoveDown(usize),
    Clear,
}

impl StepSequence {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Insert at `index`, appending when past the end.
    pub fn insert(&mut self, index: usize, step: Step) {
        let index = index.min(self.steps.len());
        self.steps.insert(index, step);
    }

    pub fn remove(&mut self, index: usize) -> Option<Step> {
        (index < self.steps.len()).then(|| self.steps.remove(index))
    }

    /// Swap with the previous step. Returns false at the top.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.steps.len() {
            return false;
        }
        self.steps.swap(index - 1, index);
        true
    }

    /// Swap with the next step. Returns false at the bottom.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.steps.len() {
            return false;
        }
        self.steps.swap(index, index + 1);
        true
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn apply(&mut self, edit: SequenceEdit) {
        match edit {
            SequenceEdit::Push(step) => self.push(step),
            SequenceEdit::Insert(i, step) => self.insert(i, step),
            SequenceEdit::Remove(i) => {
                self.remove(i);
            }
            SequenceEdit::MoveUp(i) => {
                self.move_up(i);
            }
            SequenceEdit::MoveDown(i) => {
                self.move_down(i);
            }
            SequenceEdit::Clear => self.clear(),
        }
    }

    /// Index of the label called `name`, searching the whole sequence.
    pub fn label_index(&self, name: &str) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| matches!(s, Step::Label { name: n } if n == name))
    }

    /// Map every label to its index. Fails on a repeated label name.
    pub fn labels(&self) -> Result<HashMap<String, usize>> {
        let mut labels = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if let Step::Label { name } = step {
                if labels.insert(name.clone(), i).is_some() {
                    return Err(ReplayError::DuplicateLabel(name.clone()));
                }
            }
        }
        Ok(labels)
    }

    /// Check everything that must hold before a run may start: unique labels,
    /// resolvable goto targets, known pattern ids and compiling scripts.
    pub fn validate(&self, store: &PatternStore) -> Result<HashMap<String, usize>> {
        let labels = self.labels()?;
        for step in &self.steps {
            match step {
                Step::Goto { label } if !labels.contains_key(label) => {
                    return Err(ReplayError::UnresolvedLabel(label.clone()));
                }
                Step::Search(s) => {
                    store.get(s.pattern_id)?;
                }
                Step::Scripted(s) => ScriptHost::check(&s.name, &s.source)?,
                _ => {}
            }
        }
        Ok(labels)
    }
}

impl From<Vec<Step>> for StepSequence {
    fn from(steps: Vec<Step>) -> Self {
        Self::new(steps)
    }
}

/// A named step sequence bound to the pattern store it draws from.
#[derive(Debug, Clone)]
pub struct Test {
    pub name: String,
    pub steps: StepSequence,
    pub store: Arc<PatternStore>,
}

impl Test {
    pub fn new(name: impl Into<String>, steps: impl Into<StepSequence>, store: Arc<PatternStore>) -> Self {
        Self { name: name.into(), steps: steps.into(), store }
    }

    pub fn validate(&self) -> Result<HashMap<String, usize>> {
        self.steps.validate(&self.store)
    }
}
