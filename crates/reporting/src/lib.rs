//! Reporting dashboards and the metrics their widgets display.

pub mod dashboard;
pub mod metrics;

pub use dashboard::{
    Dashboard, DashboardCommand, DashboardEvent, DashboardId, DashboardStatus, Position, Widget,
    WidgetKind,
};
pub use metrics::{Metric, MetricSource, MetricUnit, MetricValue, evaluate};
