pub mod hierarchy;
pub mod references;
pub mod routing;
pub mod split;

pub use hierarchy::*;
pub use references::*;
pub use routing::*;
pub use split::*;
