pub mod conflicts;
pub mod import;
pub mod remind;
pub mod timeline;
pub mod watch;
