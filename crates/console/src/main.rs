use std::sync::Arc;

use anyhow::Context;

use precinct_auth::SessionController;
use precinct_console::{Command, StdoutNotifier, USAGE};
use precinct_infra::{
    AppConfig, HttpIdentityProvider, PostgresProfileStore, PostgresRecordRepository, connect_pool,
};
use precinct_observability::{LogFormat, LogSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    precinct_observability::init_with(&LogSettings {
        format: LogFormat::Compact,
        to_stderr: true,
        ..LogSettings::default()
    });

    let command = match Command::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = AppConfig::from_env().context("loading configuration")?;
    let pool = connect_pool(&config)
        .await
        .context("connecting to the records database")?;

    let controller = SessionController::start(
        Arc::new(HttpIdentityProvider::from_config(&config)),
        Arc::new(PostgresProfileStore::new(pool.clone())),
        Arc::new(StdoutNotifier),
    );
    let records = Arc::new(PostgresRecordRepository::new(pool));

    precinct_console::run(command, &controller, records).await
}
