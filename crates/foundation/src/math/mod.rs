pub mod geodesy;
pub mod mat4;
pub mod precision;
pub mod projection;
pub mod vec;

pub use geodesy::*;
pub use mat4::*;
pub use precision::*;
pub use projection::*;
pub use vec::*;
