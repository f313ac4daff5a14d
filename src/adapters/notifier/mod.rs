//! Status display notifiers.

pub mod http_display;
pub mod null;

pub use http_display::HttpDisplayNotifier;
pub use null::NullNotifier;
