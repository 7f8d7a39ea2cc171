//! Connection settings builders.
//!
//! Profiles are assembled as typed [`Settings`](crate::dbus::Settings) maps
//! and only converted to D-Bus values when they are sent.

pub mod connection_builder;
pub mod ethernet;
pub mod wifi;

pub use connection_builder::ConnectionBuilder;
pub use ethernet::build_ethernet_connection;
pub use wifi::{WifiConnectionBuilder, WifiSecurityKind, classify_security};
