mod error;

use std::sync::Arc;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use huelink_config::{Config, Logger};
use huelink_core::{
    Bridge, Controller, DeviceRegistry, Discovery, Monitor, RefreshSchedule, Router, Services,
    Transport, mqtt,
};

use crate::error::GatewayError;

#[tokio::main]
async fn main() {
    let config = match huelink_config::load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:?}", miette::Report::new(GatewayError::from(err)));
            std::process::exit(1);
        }
    };

    init_tracing(&config.logger);

    if let Err(err) = run(config).await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}

fn init_tracing(logger: &Logger) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = logger.level.clone();
        if !logger.enable_mqtt {
            directives.push_str(",rumqttc=warn");
        }
        EnvFilter::new(directives)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(config: Config) -> Result<(), GatewayError> {
    let gateway = config.to_gateway_config()?;

    if let Some((min, max)) = config.start_delay.window() {
        let delay = rand::thread_rng().gen_range(min..=max);
        info!(?delay, "delaying start");
        tokio::time::sleep(delay).await;
    }

    let cancel = CancellationToken::new();
    let bridge = Arc::new(
        Bridge::new(&gateway.bridge).map_err(|source| GatewayError::BridgeClient { source })?,
    );
    let (transport, eventloop) = mqtt::connect(&gateway.mqtt);
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let registry = Arc::new(DeviceRegistry::new());
    let refresh = Arc::new(RefreshSchedule::new());

    let controller = Controller::new(
        Arc::clone(&registry),
        Arc::new(Services::new(Arc::clone(&bridge))),
        Arc::clone(&transport),
        gateway.controller.clone(),
    );
    let router = Arc::new(Router::new(Arc::clone(&refresh), controller.command_sender()));

    let gateway_task = async {
        let discovery = Arc::new(Discovery::new(
            Arc::clone(&bridge),
            gateway.discovery.clone(),
        )?);
        let health = discovery.start_discovery(cancel.clone()).await;

        let monitor = Arc::new(Monitor::new(
            Arc::clone(&bridge),
            Arc::clone(&registry),
            Arc::clone(&transport),
            Arc::clone(&refresh),
            gateway.monitor.clone(),
        ));
        let monitor_task = monitor.spawn(cancel.clone());
        let dispatch = controller.start().await?;

        info!(
            bridge_id = bridge.id(),
            client_id = %gateway.mqtt.client_id,
            "gateway started"
        );
        mqtt::run_event_loop(
            eventloop,
            Arc::clone(&transport),
            Arc::clone(&router),
            Arc::clone(&refresh),
            cancel.clone(),
        )
        .await;

        for (name, task) in [("health", health), ("monitor", monitor_task), ("dispatch", dispatch)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "task ended abnormally");
            }
        }
        Ok::<(), GatewayError>(())
    };

    let result = tokio::select! {
        result = gateway_task => result,
        () = shutdown_signal() => {
            info!("received shutdown signal, exiting");
            Ok(())
        }
    };

    cancel.cancel();
    controller.shutdown();
    result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => first_signal(tokio::signal::ctrl_c(), terminate.recv()).await,
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl-C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Ctrl-C handler unavailable, running until killed");
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl-C handler unavailable, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Resolve on Ctrl-C or `terminate`, whichever comes first. A failed Ctrl-C
/// handler is logged and leaves `terminate` as the only trigger.
async fn first_signal<C, T>(ctrl_c: C, terminate: T)
where
    C: Future<Output = std::io::Result<()>>,
    T: Future<Output = Option<()>>,
{
    tokio::pin!(terminate);
    tokio::select! {
        result = ctrl_c => {
            if let Err(e) = result {
                warn!(error = %e, "Ctrl-C handler unavailable, waiting for SIGTERM only");
                (&mut terminate).await;
            }
        }
        _ = &mut terminate => {}
    }
}
