pub mod align;
pub mod errno;
pub mod error;
pub mod locator;
pub mod manager;
pub mod trace;

pub use align::*;
pub use errno::*;
pub use error::*;
pub use locator::*;
pub use manager::*;
pub use trace::*;
