pub mod cadence;
pub mod clock;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod model;
pub mod period;
pub mod timestamp;
pub mod types;

pub use cadence::*;
pub use clock::*;
pub use error::*;
pub use ids::*;
pub use ledger::*;
pub use model::*;
pub use period::*;
pub use timestamp::*;
pub use types::*;
