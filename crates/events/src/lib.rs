//! Notification delivery for import requests.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`Notifier`]: the seam the request workflow sends notifications
//!   through. [`NoopNotifier`] when the subsystem is absent, [`DbNotifier`]
//!   to store them and publish on the bus.
//! - [`EmailRelay`]: optional bus subscriber that emails receivers.

pub mod bus;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, EmailDelivery, EmailRelay};
pub use notifier::{DbNotifier, NoopNotifier, Notifier, NotifyError};
