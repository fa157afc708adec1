pub mod scan;
pub mod state;
pub mod watch;
