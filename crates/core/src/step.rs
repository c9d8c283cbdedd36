use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::logger;
use crate::lua_rt::ScriptHost;
use crate::matcher::{Matcher, ScanArea};
use crate::pattern::{PatternId, PatternStore};
use crate::pixels::PixelBuffer;
use crate::platform::Platform;
use crate::sleep;
use crate::types::Point;

/// Result of executing one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// Everything a step may touch besides the run context.
pub struct StepEnv<'a> {
    pub platform: &'a mut dyn Platform,
    pub store: &'a PatternStore,
    pub matcher: &'a Matcher,
    pub scripts: &'a ScriptHost,
    pub delay_jitter: bool,
    /// Position of the executing step in its sequence
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStep {
    pub pattern_id: PatternId,
    /// Look in a box around the current pointer before scanning the screen
    #[serde(default, rename = "preCheck")]
    pub pre_check: bool,
    #[serde(default, rename = "clickOnSucceseed")]
    pub click_on_success: bool,
    /// Resume scanning after the previous match instead of the screen origin
    #[serde(default)]
    pub next_search: bool,
}

impl SearchStep {
    pub fn new(pattern_id: PatternId) -> Self {
        Self { pattern_id, pre_check: false, click_on_success: false, next_search: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragStep {
    /// Drag start; the current pointer when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Point>,
    pub to: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonAction {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    #[serde(default = "default_script_name")]
    pub name: String,
    pub source: String,
}

fn default_script_name() -> String {
    "script".to_string()
}

/// One unit of automation. The serde tag doubles as the document element name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Step {
    #[serde(rename = "searchPattern")]
    Search(SearchStep),
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "delay")]
    Delay { ms: u64 },
    #[serde(rename = "goto")]
    Goto { label: String },
    #[serde(rename = "label")]
    Label { name: String },
    #[serde(rename = "drag")]
    PointerDrag(DragStep),
    #[serde(rename = "mouseUpDown")]
    PointerButton { action: ButtonAction },
    #[serde(rename = "script")]
    Scripted(ScriptStep),
}

impl Step {
    pub fn search(pattern_id: PatternId) -> Self {
        Step::Search(SearchStep::new(pattern_id))
    }

    pub fn label(name: impl Into<String>) -> Self {
        Step::Label { name: name.into() }
    }

    pub fn goto(label: impl Into<String>) -> Self {
        Step::Goto { label: label.into() }
    }

    pub fn script(name: impl Into<String>, source: impl Into<String>) -> Self {
        Step::Scripted(ScriptStep { name: name.into(), source: source.into() })
    }

    /// Document tag of this step.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Search(_) => "searchPattern",
            Step::Click => "click",
            Step::Delay { .. } => "delay",
            Step::Goto { .. } => "goto",
            Step::Label { .. } => "label",
            Step::PointerDrag(_) => "drag",
            Step::PointerButton { .. } => "mouseUpDown",
            Step::Scripted(_) => "script",
        }
    }

    /// Run this step. Goto only reports success here; the runner does the jump.
    pub fn execute(&self, ctx: &mut RunContext, env: &mut StepEnv) -> StepOutcome {
        match self {
            Step::Search(s) => search(s, ctx, env),
            Step::Click => {
                click(ctx, env);
                StepOutcome::Success
            }
            Step::Delay { ms } => {
                if env.delay_jitter {
                    sleep::sleep_jitter(*ms);
                } else {
                    sleep::sleep_ms(*ms);
                }
                StepOutcome::Success
            }
            Step::Goto { .. } | Step::Label { .. } => StepOutcome::Success,
            Step::PointerDrag(d) => {
                let from = d.from.unwrap_or(ctx.current_pointer);
                env.platform.move_to(from);
                env.platform.press(from);
                env.platform.move_to(d.to);
                env.platform.release(d.to);
                ctx.current_pointer = d.to;
                StepOutcome::Success
            }
            Step::PointerButton { action } => {
                match action {
                    ButtonAction::Down => env.platform.press(ctx.current_pointer),
                    ButtonAction::Up => env.platform.release(ctx.current_pointer),
                }
                StepOutcome::Success
            }
            Step::Scripted(s) => {
                let index = env.index;
                match env.scripts.run(&s.name, &s.source, index, ctx, &mut *env.platform) {
                    Ok(true) => StepOutcome::Success,
                    Ok(false) => StepOutcome::Failed(format!("script '{}' returned false", s.name)),
                    Err(e) => StepOutcome::Failed(format!("script '{}' raised: {}", s.name, e)),
                }
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Search(s) => {
                write!(f, "searchPattern #{}", s.pattern_id)?;
                if s.pre_check {
                    write!(f, " +preCheck")?;
                }
                if s.next_search {
                    write!(f, " +next")?;
                }
                if s.click_on_success {
                    write!(f, " +click")?;
                }
                Ok(())
            }
            Step::Click => write!(f, "click"),
            Step::Delay { ms } => write!(f, "delay {}ms", ms),
            Step::Goto { label } => write!(f, "goto {}", label),
            Step::Label { name } => write!(f, "label {}", name),
            Step::PointerDrag(d) => write!(f, "drag to ({}, {})", d.to.x, d.to.y),
            Step::PointerButton { action } => write!(f, "mouse {:?}", action),
            Step::Scripted(s) => write!(f, "script {}", s.name),
        }
    }
}

fn click(ctx: &RunContext, env: &mut StepEnv) {
    env.platform.click(ctx.current_pointer);
}

fn search(step: &SearchStep, ctx: &mut RunContext, env: &mut StepEnv) -> StepOutcome {
    let (store, matcher) = (env.store, env.matcher);
    let pattern = match store.get(step.pattern_id) {
        Ok(p) => p,
        Err(e) => return StepOutcome::Failed(e.to_string()),
    };

    // Fresh capture per search; nothing is cached across steps
    let screen = match env.platform.capture() {
        Ok(capture) => capture,
        Err(e) => return StepOutcome::Failed(format!("screen capture failed: {}", e)),
    };
    let screen = match PixelBuffer::from_capture(&screen) {
        Ok(buf) => buf,
        Err(e) => return StepOutcome::Failed(format!("unusable capture: {}", e)),
    };

    for (vi, variant) in pattern.variants().iter().enumerate() {
        let needle = variant.pixels();
        let mut hit = None;
        if step.pre_check {
            let area = ScanArea::around(ctx.current_pointer, needle.width(), needle.height());
            hit = matcher.find(&screen, needle, area);
        }
        if hit.is_none() {
            hit = match (step.next_search, ctx.last_match) {
                (true, Some(last)) => matcher.find_after(&screen, needle, last),
                _ => matcher.find(&screen, needle, ScanArea::full()),
            };
        }

        if let Some(top_left) = hit {
            let center = Point::new(
                top_left.x + needle.width() as i32 / 2,
                top_left.y + needle.height() as i32 / 2,
            );
            logger::info_p(
                "search",
                &format!(
                    "'{}' variant {} at ({}, {}), pointer -> ({}, {})",
                    pattern.name, vi, top_left.x, top_left.y, center.x, center.y
                ),
            );
            env.platform.move_to(center);
            ctx.record_match(top_left, center);
            if step.click_on_success {
                click(ctx, env);
            }
            return StepOutcome::Success;
        }
    }

    StepOutcome::Failed(format!("pattern '{}' not found on screen", pattern.name))
}
