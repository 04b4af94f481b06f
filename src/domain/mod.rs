pub mod listing;
pub mod source;
pub mod state;

pub use listing::{Listing, RawListing};
pub use source::{SelectorSet, SourceConfig};
pub use state::{RunState, SourceStatus};
