use std::sync::Arc;
use std::time::Duration;

use crewsync::state::AppState;
use crewsync::{server, Config};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("startup: {}", err);
            std::process::exit(1);
        }
    };

    let state = match AppState::new(config) {
        Ok(state) => Arc::new(state),
        Err(err) => {
            log::error!("startup: {}", err);
            std::process::exit(1);
        }
    };

    // Warm the activity-type catalog once. Allow-all can run without it
    // (raw keys substitute for labels); allow-list cannot make scope
    // decisions at all, so that combination is fatal.
    if let Err(err) = state.catalog.warm(state.store.as_ref()).await {
        if state.filter.requires_catalog() {
            log::error!("startup: activity-type catalog unavailable: {}", err);
            std::process::exit(1);
        }
        log::warn!(
            "type catalog warm failed ({}), continuing with raw type keys",
            err
        );
    }

    if state.config.poll.enabled {
        let interval = Duration::from_secs(state.config.poll.interval_minutes * 60);
        tokio::spawn(state.poller.clone().run(interval));
        log::info!(
            "drift poller enabled: every {} min, {} h cold-start lookback",
            state.config.poll.interval_minutes,
            state.config.poll.lookback_hours
        );
    } else {
        log::info!("drift poller disabled by config");
    }

    let bind_addr = state.config.bind_addr.clone();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::error!("failed to bind {}: {}", bind_addr, err);
            std::process::exit(1);
        }
    };
    log::info!("crewsync listening on {}", bind_addr);

    if let Err(err) = axum::serve(listener, server::router(state)).await {
        log::error!("server error: {}", err);
        std::process::exit(1);
    }
}
