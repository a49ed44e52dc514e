//! Control-plane facilities shared by the store's components.

mod hlc;

pub use hlc::*;
