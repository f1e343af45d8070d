pub mod document;
pub mod enums;
pub mod record;
pub mod snapshot;

pub use document::*;
pub use enums::*;
pub use record::*;
pub use snapshot::*;
