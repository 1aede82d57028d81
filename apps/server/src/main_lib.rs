use std::sync::Arc;

use folio_market_data::{Orchestrator, OrchestratorConfig};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{config::Config, providers::ProviderCatalog};

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub providers: ProviderCatalog,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, providers: ProviderCatalog) -> Self {
        Self {
            orchestrator,
            providers,
        }
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("FOLIO_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn build_state(config: &Config) -> Arc<AppState> {
    let orchestrator_config = OrchestratorConfig {
        breaker: config.breaker.clone(),
        ..OrchestratorConfig::default()
    };
    tracing::info!(
        "Circuit breaker: threshold {} within {:?}, cooldown {:?}",
        orchestrator_config.breaker.failure_threshold,
        orchestrator_config.breaker.failure_window,
        orchestrator_config.breaker.cooldown
    );

    let orchestrator = Arc::new(Orchestrator::new(orchestrator_config));
    let providers = ProviderCatalog::from_config(config);
    Arc::new(AppState::new(orchestrator, providers))
}
