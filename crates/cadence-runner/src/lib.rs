pub mod aligner;
pub mod config;
pub mod context;
pub mod deadline;
pub mod doctor;
pub mod poller;
pub mod resources;
pub mod restore;
pub mod runner;
pub mod scenario;
pub mod select;
pub mod window;

pub use config::*;
pub use doctor::*;
pub use runner::*;
