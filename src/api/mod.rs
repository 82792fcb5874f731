//! REST backend access: authentication, session probing, realtime endpoint
//! discovery, and the device directory fetch.

pub mod devices;
pub mod server_info;
pub mod session;

pub use devices::{fetch_device_list, DeviceRecord};
pub use server_info::resolve_endpoint;
pub use session::SessionManager;
