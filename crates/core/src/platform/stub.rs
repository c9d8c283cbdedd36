use anyhow::{Result, anyhow};

use crate::logger;
use crate::pixels::PixelBuffer;
use crate::types::*;
use super::{Pointer, Screen};

/// Pointer activity seen by the stub, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Move(Point),
    Click(Point),
    Press(Point),
    Release(Point),
}

/// In-memory platform: serves a fixed screen and records pointer events.
pub struct StubPlatform {
    screen: Option<Capture>,
    pointer: Point,
    events: Vec<PointerEvent>,
    captures: usize,
}

impl StubPlatform {
    /// Serve `screen` on every capture.
    pub fn with_screen(screen: &PixelBuffer) -> Self {
        Self {
            screen: Some(screen.to_capture()),
            pointer: Point::default(),
            events: Vec::new(),
            captures: 0,
        }
    }

    /// Serve an all-black screen.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            screen: Some(Capture {
                data: vec![0; (width * height * 4) as usize],
                width,
                height,
                bytes_per_row: width * 4,
            }),
            pointer: Point::default(),
            events: Vec::new(),
            captures: 0,
        }
    }

    /// A platform whose capture always fails.
    pub fn without_screen() -> Self {
        Self { screen: None, pointer: Point::default(), events: Vec::new(), captures: 0 }
    }

    pub fn set_screen(&mut self, screen: &PixelBuffer) {
        self.screen = Some(screen.to_capture());
    }

    pub fn set_pointer(&mut self, at: Point) {
        self.pointer = at;
    }

    pub fn events(&self) -> &[PointerEvent] {
        &self.events
    }

    pub fn clicks(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, PointerEvent::Click(_))).count()
    }

    pub fn captures(&self) -> usize {
        self.captures
    }
}

impl Screen for StubPlatform {
    fn capture(&mut self) -> Result<Capture> {
        self.captures += 1;
        let screen = self.screen.clone().ok_or_else(|| anyhow!("stub has no screen"))?;
        logger::info_p("stub", &format!("capture() -> {}x{}", screen.width, screen.height));
        Ok(screen)
    }
}

impl Pointer for StubPlatform {
    fn position(&mut self) -> Point {
        self.pointer
    }

    fn move_to(&mut self, at: Point) {
        logger::info_p("stub", &format!("move_to({}, {})", at.x, at.y));
        self.pointer = at;
        self.events.push(PointerEvent::Move(at));
    }

    fn click(&mut self, at: Point) {
        logger::info_p("stub", &format!("click({}, {})", at.x, at.y));
        self.pointer = at;
        self.events.push(PointerEvent::Click(at));
    }

    fn press(&mut self, at: Point) {
        logger::info_p("stub", &format!("press({}, {})", at.x, at.y));
        self.pointer = at;
        self.events.push(PointerEvent::Press(at));
    }

    fn release(&mut self, at: Point) {
        logger::info_p("stub", &format!("release({}, {})", at.x, at.y));
        self.pointer = at;
        self.events.push(PointerEvent::Release(at));
    }
}
