pub mod checkpoint;
pub mod config;
pub mod error;
pub mod graduate;
pub mod graph;
pub mod io;
pub mod log;
pub mod orchestrate;
pub mod paths;
pub mod render;
pub mod session;
pub mod task;
pub mod types;

pub use error::{CadenceError, Result};
