//! Planning data: purchase discounts and demand forecasts.

pub mod discount;
pub mod forecast;
pub mod period;

pub use discount::{
    Discount, DiscountCommand, DiscountEvent, DiscountId, DiscountKind, DiscountStatus,
};
pub use forecast::{
    Forecast, ForecastCommand, ForecastEvent, ForecastId, ForecastMethod, ForecastPoint,
    project,
};
pub use period::YearMonth;
