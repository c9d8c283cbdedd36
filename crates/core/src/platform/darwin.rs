use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;

use crate::logger;
use crate::types::*;
use super::{Pointer, Screen};

/// Main-display capture and HID-level mouse events via Core Graphics.
///
/// Coordinates are in display points; on scaled (Retina) displays the
/// capture is in pixels, so patterns should be captured on the same display.
pub struct DarwinPlatform {
    pressed: bool,
}

impl DarwinPlatform {
    pub fn new() -> Self {
        DarwinPlatform { pressed: false }
    }

    fn post(&self, kind: CGEventType, at: Point) {
        let source = match CGEventSource::new(CGEventSourceStateID::HIDSystemState) {
            Ok(s) => s,
            Err(_) => {
                logger::warn_p("darwin", "failed to create event source");
                return;
            }
        };
        let point = CGPoint::new(at.x as f64, at.y as f64);
        match CGEvent::new_mouse_event(source, kind, point, CGMouseButton::Left) {
            Ok(event) => event.post(CGEventTapLocation::HID),
            Err(_) => logger::warn_p("darwin", &format!("failed to create mouse event at ({}, {})", at.x, at.y)),
        }
    }
}

impl Screen for DarwinPlatform {
    fn capture(&mut self) -> Result<Capture> {
        let image = CGDisplay::main()
            .image()
            .ok_or_else(|| anyhow!("main display capture failed (screen recording permission?)"))?;

        let bpr = image.bytes_per_row() as u32;
        let cf_data = image.data();
        Ok(Capture {
            data: cf_data.bytes().to_vec(),
            width: image.width() as u32,
            height: image.height() as u32,
            bytes_per_row: bpr,
        })
    }
}

impl Pointer for DarwinPlatform {
    fn position(&mut self) -> Point {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .ok()
            .and_then(|source| CGEvent::new(source).ok())
            .map(|event| {
                let p = event.location();
                Point::new(p.x.round() as i32, p.y.round() as i32)
            })
            .unwrap_or_default()
    }

    fn move_to(&mut self, at: Point) {
        let kind = if self.pressed { CGEventType::LeftMouseDragged } else { CGEventType::MouseMoved };
        self.post(kind, at);
    }

    fn click(&mut self, at: Point) {
        self.post(CGEventType::LeftMouseDown, at);
        thread::sleep(Duration::from_millis(15));
        self.post(CGEventType::LeftMouseUp, at);
        thread::sleep(Duration::from_millis(15));
    }

    fn press(&mut self, at: Point) {
        self.pressed = true;
        self.post(CGEventType::LeftMouseDown, at);
    }

    fn release(&mut self, at: Point) {
        self.post(CGEventType::LeftMouseUp, at);
        self.pressed = false;
    }
}
