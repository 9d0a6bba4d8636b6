//! Process signals → cancellation.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for SIGINT, SIGTERM, SIGHUP or SIGQUIT.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let kinds = [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
            (SignalKind::quit(), "SIGQUIT"),
        ];
        let mut streams = Vec::new();
        for (kind, name) in kinds {
            match signal(kind) {
                Ok(stream) => streams.push((stream, name)),
                Err(e) => warn!("could not listen for {}: {}", name, e),
            }
        }

        let unix_signal = async {
            if streams.is_empty() {
                return std::future::pending::<&str>().await;
            }
            let waits = streams.iter_mut().map(|(stream, name)| {
                Box::pin(async move {
                    stream.recv().await;
                    *name
                })
            });
            futures::future::select_all(waits).await.0
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
            name = unix_signal => info!("Received {}, shutting down...", name),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("could not listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received ctrl-c, shutting down...");
    }
}

/// Cancel `token` once a shutdown signal arrives.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = shutdown_signal() => token.cancel(),
        }
    })
}
