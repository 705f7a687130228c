pub mod codec;
pub mod exec;
pub mod velero;

pub use velero::*;
