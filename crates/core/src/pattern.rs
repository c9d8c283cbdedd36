use std::path::PathBuf;

use crate::error::{ReplayError, Result};
use crate::pixels::PixelBuffer;

pub type PatternId = u32;

/// One concrete rendering of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pixels: PixelBuffer,
    /// PNG file this variant was loaded from, kept so saving writes the path back
    source: Option<PathBuf>,
}

impl Variant {
    pub fn new(pixels: PixelBuffer) -> Self {
        Self { pixels, source: None }
    }

    pub fn from_png(path: PathBuf, pixels: PixelBuffer) -> Self {
        Self { pixels, source: Some(path) }
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }
}

/// A named search target with one or more variants, tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    variants: Vec<Variant>,
}

impl Pattern {
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }
}

/// ID-addressed pattern collection shared by every test of a test set.
///
/// IDs are handed out once and never reused, even after `remove`. Removing a
/// pattern that steps still reference is the caller's problem; load-time
/// validation catches the dangling reference on the next load.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: Vec<Pattern>,
    next_id: PatternId,
}

impl PatternStore {
    pub fn new() -> Self {
        Self { patterns: Vec::new(), next_id: 1 }
    }

    /// Add a pattern under a fresh ID.
    pub fn add(&mut self, name: impl Into<String>, variants: Vec<Variant>) -> Result<PatternId> {
        let id = self.next_id.max(1);
        self.insert(id, name, variants)?;
        Ok(id)
    }

    /// Add a pattern under an ID chosen elsewhere (a loaded document).
    pub fn insert(&mut self, id: PatternId, name: impl Into<String>, variants: Vec<Variant>) -> Result<()> {
        let name = name.into();
        if variants.is_empty() {
            return Err(ReplayError::InvalidPattern(format!("pattern '{}' has no variants", name)));
        }
        if self.contains(id) {
            return Err(ReplayError::InvalidPattern(format!("pattern id {} is already taken", id)));
        }
        let after = id
            .checked_add(1)
            .ok_or_else(|| ReplayError::InvalidPattern(format!("pattern id {} is out of range", id)))?;
        self.patterns.push(Pattern { id, name, variants });
        self.next_id = self.next_id.max(after);
        Ok(())
    }

    pub fn get(&self, id: PatternId) -> Result<&Pattern> {
        self.patterns
            .iter()
            .find(|p| p.id == id)
            .ok_or(ReplayError::UnknownPattern(id))
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.iter().any(|p| p.id == id)
    }

    /// Append a newly captured variant; existing pixel data is left alone.
    pub fn add_variant(&mut self, id: PatternId, variant: Variant) -> Result<()> {
        let pattern = self
            .patterns
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ReplayError::UnknownPattern(id))?;
        pattern.variants.push(variant);
        Ok(())
    }

    pub fn remove(&mut self, id: PatternId) -> Option<Pattern> {
        let idx = self.patterns.iter().position(|p| p.id == id)?;
        Some(self.patterns.remove(idx))
    }

    /// Patterns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    fn variant(c: u8) -> Variant {
        Variant::new(PixelBuffer::from_fn(2, 2, |_, _| Rgb::new(c, c, c)).unwrap())
    }

    #[test]
    fn ids_are_fresh_and_never_reused() {
        let mut store = PatternStore::new();
        let a = store.add("a", vec![variant(1)]).unwrap();
        let b = store.add("b", vec![variant(2)]).unwrap();
        assert_ne!(a, b);
        store.remove(b).unwrap();
        let c = store.add("c", vec![variant(3)]).unwrap();
        assert!(c > b);
        let names: Vec<_> = store.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn unknown_id_fails() {
        let store = PatternStore::new();
        assert!(matches!(store.get(42), Err(ReplayError::UnknownPattern(42))));
    }

    #[test]
    fn pattern_without_variants_is_invalid() {
        let mut store = PatternStore::new();
        assert!(matches!(store.add("empty", vec![]), Err(ReplayError::InvalidPattern(_))));
    }

    #[test]
    fn explicit_ids_advance_the_counter() {
        let mut store = PatternStore::new();
        store.insert(7, "seven", vec![variant(7)]).unwrap();
        assert!(store.insert(7, "again", vec![variant(8)]).is_err());
        assert_eq!(store.add("next", vec![variant(9)]).unwrap(), 8);
    }

    #[test]
    fn maximum_id_is_rejected() {
        let mut store = PatternStore::new();
        assert!(matches!(
            store.insert(PatternId::MAX, "last", vec![variant(1)]),
            Err(ReplayError::InvalidPattern(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn added_variant_is_appended() {
        let mut store = PatternStore::new();
        let id = store.add("ok", vec![variant(1)]).unwrap();
        store.add_variant(id, variant(2)).unwrap();
        let p = store.get(id).unwrap();
        assert_eq!(p.variants().len(), 2);
        assert_eq!(p.variants()[0], variant(1));
        assert!(store.add_variant(99, variant(3)).is_err());
    }
}
