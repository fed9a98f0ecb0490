pub mod capture_device;
pub mod dispatch;
pub mod output_device;
pub mod permission;
pub mod sinks;
