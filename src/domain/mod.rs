mod live;
mod parse;
mod project_path;
mod reconcile;
mod thread;
mod tree;
mod types;

pub use live::*;
pub use parse::*;
pub use project_path::*;
pub use reconcile::*;
pub use thread::*;
pub use tree::*;
pub use types::*;
