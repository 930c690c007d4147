pub mod app;
pub mod identity;
pub mod shutdown;

pub use app::Application;
pub use identity::MachineIdentity;
pub use shutdown::ShutdownManager;
