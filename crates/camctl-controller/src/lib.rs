pub mod controller;
pub mod health_monitor;

pub use controller::Controller;
pub use health_monitor::{HealthMetrics, HealthMonitor, HealthMonitorConfig, HealthState};
