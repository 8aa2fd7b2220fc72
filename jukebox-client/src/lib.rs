mod driver;
mod reconciler;

pub use driver::*;
pub use reconciler::*;
