use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};
use crate::pattern::{PatternId, PatternStore, Variant};
use crate::pixels::PixelBuffer;
use crate::sequence::Test;
use crate::step::Step;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    patterns: Vec<PatternDoc>,
    #[serde(default)]
    tests: Vec<TestDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatternDoc {
    id: PatternId,
    name: String,
    variants: Vec<VariantDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum VariantDoc {
    Png { path: PathBuf },
    Inline { width: u32, height: u32, rgb: Vec<u8> },
}

#[derive(Debug, Serialize, Deserialize)]
struct TestDoc {
    name: String,
    #[serde(default)]
    steps: Vec<Step>,
}

/// A pattern store plus the tests that draw from it; the unit of persistence.
#[derive(Debug, Clone)]
pub struct TestSet {
    store: Arc<PatternStore>,
    tests: Vec<Test>,
}

impl Default for TestSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSet {
    pub fn new() -> Self {
        Self { store: Arc::new(PatternStore::new()), tests: Vec::new() }
    }

    /// Load a JSON document. PNG variant paths are relative to the file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_json(&json, base)
    }

    /// Parse and validate a document. Every test must pass `Test::validate`
    /// before the set is returned, so nothing can run against a dangling
    /// pattern id or label.
    pub fn from_json(json: &str, base_dir: &Path) -> Result<Self> {
        let doc: Document = serde_json::from_str(json)?;

        let mut store = PatternStore::new();
        for p in doc.patterns {
            let variants = p
                .variants
                .into_iter()
                .map(|v| load_variant(v, base_dir))
                .collect::<Result<Vec<_>>>()?;
            store.insert(p.id, p.name, variants)?;
        }

        let store = Arc::new(store);
        let tests: Vec<Test> = doc
            .tests
            .into_iter()
            .map(|t| Test::new(t.name, t.steps, Arc::clone(&store)))
            .collect();
        for test in &tests {
            test.validate()?;
        }
        Ok(Self { store, tests })
    }

    pub fn to_json(&self) -> Result<String> {
        let doc = Document {
            patterns: self
                .store
                .iter()
                .map(|p| PatternDoc {
                    id: p.id,
                    name: p.name.clone(),
                    variants: p.variants().iter().map(save_variant).collect(),
                })
                .collect(),
            tests: self
                .tests
                .iter()
                .map(|t| TestDoc { name: t.name.clone(), steps: t.steps.iter().cloned().collect() })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn store(&self) -> &Arc<PatternStore> {
        &self.store
    }

    /// Mutate the pattern store and rebind every test to the result.
    pub fn edit_store<R>(&mut self, f: impl FnOnce(&mut PatternStore) -> R) -> R {
        let mut store = (*self.store).clone();
        let out = f(&mut store);
        self.store = Arc::new(store);
        for test in &mut self.tests {
            test.store = Arc::clone(&self.store);
        }
        out
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn test(&self, name: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.name == name)
    }

    pub fn test_mut(&mut self, name: &str) -> Option<&mut Test> {
        self.tests.iter_mut().find(|t| t.name == name)
    }

    /// Append an empty test bound to this set's store.
    pub fn add_test(&mut self, name: impl Into<String>) -> &mut Test {
        self.tests.push(Test::new(name, Vec::new(), Arc::clone(&self.store)));
        let last = self.tests.len() - 1;
        &mut self.tests[last]
    }
}

fn load_variant(doc: VariantDoc, base_dir: &Path) -> Result<Variant> {
    match doc {
        VariantDoc::Inline { width, height, rgb } => Ok(Variant::new(PixelBuffer::from_rgb(width, height, &rgb)?)),
        VariantDoc::Png { path } => {
            let image = image::open(base_dir.join(&path))
                .map_err(|e| ReplayError::InvalidPattern(format!("{}: {}", path.display(), e)))?
                .to_rgb8();
            Ok(Variant::from_png(path, PixelBuffer::from_image(&image)?))
        }
    }
}

fn save_variant(variant: &Variant) -> VariantDoc {
    match variant.source() {
        Some(path) => VariantDoc::Png { path: path.clone() },
        None => {
            let px = variant.pixels();
            VariantDoc::Inline { width: px.width(), height: px.height(), rgb: px.to_rgb() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgb;

    const DOC: &str = r#"{
        "patterns": [
            { "id": 3, "name": "ok", "variants": [
                { "width": 2, "height": 1, "rgb": [255, 0, 0, 0, 255, 0] }
            ] }
        ],
        "tests": [
            { "name": "login", "steps": [
                { "type": "label", "name": "top" },
                { "type": "searchPattern", "patternId": 3, "preCheck": true, "clickOnSucceseed": true },
                { "type": "delay", "ms": 10 },
                { "type": "goto", "label": "top" }
            ] }
        ]
    }"#;

    #[test]
    fn loads_patterns_and_steps() {
        let set = TestSet::from_json(DOC, Path::new(".")).unwrap();
        let ok = set.store().get(3).unwrap();
        assert_eq!(ok.variants()[0].pixels().get_pixel(1, 0).unwrap(), Rgb::new(0, 255, 0));
        let login = set.test("login").unwrap();
        assert_eq!(login.steps.len(), 4);
        assert!(matches!(login.steps.get(1), Some(Step::Search(s)) if s.pre_check && s.click_on_success));
    }

    #[test]
    fn unknown_pattern_fails_at_load() {
        let doc = DOC.replace("\"patternId\": 3", "\"patternId\": 4");
        assert!(matches!(
            TestSet::from_json(&doc, Path::new(".")),
            Err(ReplayError::UnknownPattern(4))
        ));
    }

    #[test]
    fn unresolved_goto_fails_at_load() {
        let doc = DOC.replace("\"label\": \"top\"", "\"label\": \"bottom\"");
        assert!(matches!(
            TestSet::from_json(&doc, Path::new(".")),
            Err(ReplayError::UnresolvedLabel(_))
        ));
    }

    #[test]
    fn mis_sized_inline_variant_is_invalid() {
        let doc = DOC.replace("\"width\": 2", "\"width\": 3");
        assert!(matches!(
            TestSet::from_json(&doc, Path::new(".")),
            Err(ReplayError::InvalidPattern(_))
        ));
    }

    #[test]
    fn maximum_pattern_id_is_invalid() {
        let doc = DOC.replace("\"id\": 3", "\"id\": 4294967295");
        assert!(matches!(
            TestSet::from_json(&doc, Path::new(".")),
            Err(ReplayError::InvalidPattern(_))
        ));
    }

    #[test]
    fn unknown_step_tag_is_a_format_error() {
        let doc = DOC.replace("\"type\": \"delay\"", "\"type\": \"hover\"");
        assert!(matches!(TestSet::from_json(&doc, Path::new(".")), Err(ReplayError::Format(_))));
    }

    #[test]
    fn saved_set_loads_back_with_png_variant() {
        let dir = tempfile::tempdir().unwrap();
        let png = image::RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8 * 40, y as u8 * 90, 7]));
        png.save(dir.path().join("icon.png")).unwrap();

        let doc = DOC.replace(
            r#"{ "width": 2, "height": 1, "rgb": [255, 0, 0, 0, 255, 0] }"#,
            r#"{ "path": "icon.png" }, { "width": 2, "height": 1, "rgb": [255, 0, 0, 0, 255, 0] }"#,
        );
        let set = TestSet::from_json(&doc, dir.path()).unwrap();
        let path = dir.path().join("set.json");
        set.save(&path).unwrap();

        let back = TestSet::load(&path).unwrap();
        let ok = back.store().get(3).unwrap();
        assert_eq!(ok.variants().len(), 2);
        assert_eq!(ok.variants()[0].source(), Some(&PathBuf::from("icon.png")));
        assert_eq!(ok.variants()[0].pixels().get_pixel(2, 1).unwrap(), Rgb::new(80, 90, 7));
        assert_eq!(back.test("login").unwrap().steps, set.test("login").unwrap().steps);
    }

    #[test]
    fn set_built_in_code_saves_and_loads() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = TestSet::new();
        let icon = PixelBuffer::from_fn(2, 2, |x, y| Rgb::new(9, x as u8, y as u8)).unwrap();
        let id = set.edit_store(|store| store.add("icon", vec![Variant::new(icon)])).unwrap();
        let test = set.add_test("fresh");
        test.steps.push(Step::label("top"));
        test.steps.push(Step::search(id));
        assert!(test.validate().is_ok());

        let path = dir.path().join("fresh.json");
        set.save(&path).unwrap();
        let back = TestSet::load(&path).unwrap();
        assert_eq!(back.tests().len(), 1);
        assert_eq!(back.test("fresh").unwrap().steps.len(), 2);
        assert!(back.store().contains(id));
    }

    #[test]
    fn edit_store_rebinds_tests() {
        let mut set = TestSet::from_json(DOC, Path::new(".")).unwrap();
        let icon = PixelBuffer::from_fn(1, 1, |_, _| Rgb::new(1, 2, 3)).unwrap();
        let id = set.edit_store(|store| store.add("new", vec![Variant::new(icon)])).unwrap();
        let login = set.test_mut("login").unwrap();
        login.steps.push(Step::search(id));
        assert!(login.validate().is_ok());
    }
}
