use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::services::AppServices;
use crate::middleware;

pub mod bills;
pub mod capas;
pub mod dashboards;
pub mod discounts;
pub mod forecasts;
pub mod history;
pub mod landed_costs;
pub mod ledger;
pub mod ncrs;
pub mod orgs;
pub mod payments;
pub mod revaluations;
pub mod standard_costs;
pub mod system;
pub mod variances;
pub mod vendors;

/// Router for all authenticated endpoints, mounted under `/api`.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/orgs", post(orgs::create_org))
        .nest(
            "/orgs/:slug",
            org_router().route_layer(axum::middleware::from_fn_with_state(
                services,
                middleware::org_middleware,
            )),
        )
}

/// Everything scoped to one organization.
fn org_router() -> Router {
    Router::new()
        .route("/", get(orgs::get_org).patch(orgs::rename_org))
        .nest("/vendors", vendors::router())
        .nest("/bills", bills::router())
        .route("/payables/aging", get(bills::aging))
        .nest("/payments", payments::router())
        .nest("/ledger", ledger::router())
        .nest("/standard-costs", standard_costs::router())
        .nest("/revaluations", revaluations::router())
        .nest("/variances", variances::router())
        .nest("/landed-costs", landed_costs::router())
        .nest("/ncrs", ncrs::router())
        .nest("/capas", capas::router())
        .nest("/dashboards", dashboards::router())
        .nest("/discounts", discounts::router())
        .nest("/forecasts", forecasts::router())
        .route("/history/:aggregate_id", get(history::aggregate_history))
        .route("/stream", get(system::stream))
}
