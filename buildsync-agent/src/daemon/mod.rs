pub mod periodic;
pub mod shutdown;

pub use periodic::{periodic_loop, run_service, Loader, PeriodicStats};
pub use shutdown::ShutdownCoordinator;
