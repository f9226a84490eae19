//! Interned, cheaply-clonable strings used throughout the gateway for
//! headers, model names, and backend identifiers.

use arcstr::ArcStr;

/// A reference-counted, immutable string. Cloning is an atomic refcount bump,
/// not a copy, which matters on the hot per-stream path where header and
/// model names are cloned into every `PerRequestState`.
pub type Strng = ArcStr;

/// Intern a `&'static str` with no allocation at call time.
pub const fn literal(s: &'static str) -> Strng {
	ArcStr::new(s)
}

/// Build a `Strng` from an owned `String` or other `Into<ArcStr>` source.
pub fn new(s: impl Into<Strng>) -> Strng {
	s.into()
}

/// Intern a string at compile time; use like `strng::literal!("foo")`.
#[macro_export]
macro_rules! literal {
	($s:expr) => {
		$crate::strng::literal($s)
	};
}

/// Format a `Strng` the same way `format!` builds a `String`.
#[macro_export]
macro_rules! format {
	($($arg:tt)*) => {
		$crate::strng::new(::std::format!($($arg)*))
	};
}

pub use crate::format;
pub use crate::literal;
