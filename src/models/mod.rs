pub mod record;
pub mod record_set;

pub use record::*;
pub use record_set::*;
