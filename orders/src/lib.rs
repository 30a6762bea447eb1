pub mod db;
pub mod desk;
pub mod message;
pub mod notify;

pub use db::{NewOrder, Order, OrderDb};
pub use desk::OrderDesk;
pub use notify::{AnyNotifier, LogNotifier, Notifier, NotifyError, WebhookNotifier};
