pub mod instance;
pub mod service_type;

pub use instance::InstanceListener;
pub use service_type::TypeListener;
