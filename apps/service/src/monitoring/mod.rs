/// Check strategies and the name-keyed registries used to look up checks and
/// alerts at runtime.
pub mod checker;
pub mod registry;

pub use checker::{Checker, HttpChecker, PingChecker};
pub use registry::{AlertRegistry, CheckRegistry, Registry};
