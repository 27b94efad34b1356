pub mod models {
    pub mod carrier;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod normalize;
pub mod oauth1;
pub mod schema;
pub mod transport;
pub mod utils;
pub mod services {
    pub mod ingest;
    pub mod realtime;
}

use crate::client::{CarrierClient, UserCredentials};
use crate::config::{CliArgs, Config};
use crate::oauth1::Credentials;
use crate::services::realtime::{self, MAX_BACKOFF, PollSettings, Shutdown};
use log::{error, info, warn};
use std::sync::Arc;

pub fn run(cli: &CliArgs) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::resolve(cli, |k| std::env::var(k).ok())?;
    info!(
        "Config loaded (base_url={}, user={}, db_path={}, poll_interval={}s, energy_interval={}s, max_request_retries={}, once={})",
        cfg.base_url,
        cfg.user_email,
        cfg.db_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        cfg.poll_interval.as_secs(),
        cfg.energy_interval.as_secs(),
        cfg.max_request_retries.get(),
        cfg.once
    );

    // 2) Init Carrier client and log in
    let client = CarrierClient::new(
        cfg.base_url.clone(),
        Credentials::new(cfg.client_key.clone(), cfg.client_secret.clone()),
        UserCredentials {
            user_name: cfg.user_email.clone(),
            password: cfg.user_password.clone(),
        },
    );
    client
        .ensure_authenticated()
        .map_err(|e| format!("Carrier auth failed (credentials invalid?): {}", e))?;

    // 3) Discover locations and systems
    let user = client.get_user_info().map_err(|e| format!("get_user_info failed: {}", e))?;
    if let Some(name) = user.pointer("/user/username").and_then(|v| v.as_str()) {
        info!("Signed in as {}", name);
    }
    let locations = client.get_locations().map_err(|e| format!("get_locations failed: {}", e))?;
    let mut serials = Vec::new();
    for (location_id, entry) in &locations {
        let name = entry.location.get("name").and_then(|v| v.as_str()).unwrap_or("-");
        info!("Location {} ({}): {} system(s)", location_id, name, entry.systems.len());
        serials.extend(entry.systems.keys().cloned());
    }
    serials.sort_unstable();
    serials.dedup();
    if serials.is_empty() {
        return Err("No systems found; ensure the account has systems".into());
    }
    info!("Discovered {} system(s): {}", serials.len(), serials.join(", "));

    // 4) Open the optional store
    let mut store = match &cfg.db_path {
        Some(path) => {
            let conn = db::store::open(path)?;
            info!("Connected to database {}", path.display());
            Some(conn)
        }
        None => {
            warn!("No -db-path given; readings are logged but not stored");
            None
        }
    };

    // 5) Poll
    let settings = PollSettings {
        interval: cfg.poll_interval,
        energy_interval: cfg.energy_interval,
        max_retries: cfg.max_request_retries,
        max_backoff: MAX_BACKOFF,
        max_ticks: cfg.once.then_some(1),
    };
    info!(
        "Starting poll loop: systems={}, interval={}s",
        serials.len(),
        cfg.poll_interval.as_secs()
    );
    let shutdown = Arc::new(Shutdown::new());
    realtime::trigger_when(shutdown.clone(), tokio::signal::ctrl_c())?;
    realtime::run_loop(store.as_mut(), &client, &serials, &settings, &shutdown)?;

    Ok(())
}

fn main() {
    let (cli, loaded_env) = match config::configure_env_from_cli() {
        Ok(v) => v,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "carrier-infinity {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
