// pea: process entry point

use std::env;

use pea::transport::mock::MockTransport;
use pea::{init_tracing, PassExecutor, Pea, PeaConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = match env::var("PEA_CONFIG_PATH") {
        Ok(path) => PeaConfig::from_file(&path)?.with_env_overrides(),
        Err(_) => PeaConfig::default().with_env_overrides(),
    };

    info!(
        name = %config.derived_name(),
        role = ?config.role,
        uses = %config.uses,
        "starting pea"
    );

    // The real transport is supplied by the embedding domain (sockets and
    // wire framing are out of scope here); an empty mock lets this binary
    // demonstrate the scoped enter/run/teardown lifecycle end to end.
    let transport = MockTransport::<Vec<u8>>::new(Vec::new());

    let mut pea = match Pea::<PassExecutor, _, Vec<u8>>::enter(config, transport) {
        Ok(pea) => pea,
        Err(err) => {
            error!("failed to enter: {err}");
            return Err(Box::new(err) as Box<dyn std::error::Error>);
        }
    };

    if let Err(err) = pea.run(None).await {
        error!("request loop ended with an error: {err}");
    }

    pea.teardown().await?;

    let snapshot = pea.metrics().snapshot();
    info!(
        received = snapshot.received,
        sent = snapshot.sent,
        suppressed = snapshot.suppressed,
        "pea stopped"
    );

    Ok(())
}
