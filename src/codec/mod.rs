//! Gray Paper codec: compact natural-number encoding, program blob format,
//! service account / implications serialization.

mod impl_;

pub use impl_::*;
