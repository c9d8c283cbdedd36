pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

use anyhow::Result;

use crate::types::*;
use crate::logger;

/// Full virtual-screen capture.
pub trait Screen: Send {
    fn capture(&mut self) -> Result<Capture>;
}

/// Pointer injection at absolute screen coordinates.
pub trait Pointer: Send {
    fn position(&mut self) -> Point;
    fn move_to(&mut self, at: Point);
    fn click(&mut self, at: Point);
    fn press(&mut self, at: Point);
    fn release(&mut self, at: Point);
}

/// Everything a run needs from the OS.
pub trait Platform: Screen + Pointer {}

impl<T: Screen + Pointer> Platform for T {}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform::blank(1280, 800));
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return Box::new(darwin::DarwinPlatform::new());
    }
    #[cfg(not(target_os = "macos"))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("no native platform for this OS, using stub");
        return Box::new(stub::StubPlatform::blank(1280, 800));
    }
}
