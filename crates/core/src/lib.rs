pub mod context;
pub mod error;
pub mod logger;
pub mod lua_rt;
pub mod matcher;
pub mod orchestrator;
pub mod pattern;
pub mod pixels;
pub mod platform;
pub mod runner;
pub mod sequence;
pub mod settings;
pub mod sleep;
pub mod step;
pub mod testset;
pub mod types;

pub use error::{ReplayError, Result};
