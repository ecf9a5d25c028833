mod config;
mod reconcile;
mod scan;
mod tail;
mod watch;

pub use config::*;
pub use reconcile::*;
pub use scan::*;
pub use tail::*;
pub use watch::*;
