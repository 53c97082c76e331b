pub mod error;
pub mod linear;
pub mod region;
pub mod shared;

pub use error::*;
pub use linear::*;
pub use region::*;
pub use shared::*;
