pub mod bow;
pub mod listen;
pub mod signal;
pub mod strng;
pub mod tokio_metrics;
pub mod version;

pub use bow::OwnedOrBorrowed;
pub use strng::Strng;
