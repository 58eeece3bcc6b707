pub mod common;
pub mod routing;
pub mod work_order;

pub use common::*;
pub use routing::*;
pub use work_order::*;
