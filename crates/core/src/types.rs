use serde::{Deserialize, Serialize};

use crate::sequence::SequenceEdit;

/// Absolute screen coordinate (may be negative on multi-display setups)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One pixel color. Alpha is dropped when decoding captures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Sub-region of a capture, in capture pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRect {
    pub l: u32,
    pub t: u32,
    pub w: u32,
    pub h: u32,
}

/// Raw screenshot pixel data (BGRA)
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
}

/// Command from the front end to the run worker
#[derive(Debug)]
pub enum Command {
    Run,
    Stop,
    Edit(SequenceEdit),
    Quit,
}
