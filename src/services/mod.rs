pub mod alert_monitor;
pub mod analytics;
pub mod notifier;
