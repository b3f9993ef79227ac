use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use meetslot::calendar::credentials::CredentialStore;
use meetslot::calendar::{Calendar, GoogleCalendar, UnconfiguredCalendar};
use meetslot::config::Config;
use meetslot::engine::Engine;
use meetslot::limits::CREDENTIAL_REFRESH_LEAD_DAYS;
use meetslot::mail::{ConsoleMailer, Mailer, SmtpMailer};
use meetslot::services::{Services, Settings};
use meetslot::{reaper, wire};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    meetslot::observability::init(config.metrics_port)?;

    let tls_acceptor = config
        .tls
        .as_ref()
        .map(meetslot::tls::load_tls_acceptor)
        .transpose()?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(
        config.data_dir.join("meetslot.wal"),
        config.schedule,
    )?);

    let calendar: Arc<dyn Calendar> = match &config.google {
        Some(google) => {
            let credentials = CredentialStore::new(
                google.token_path.clone(),
                google.client_id.clone(),
                google.client_secret.clone(),
            );
            Arc::new(GoogleCalendar::new(
                credentials,
                google.calendar_id.clone(),
                config.schedule.tz,
                config.http_timeout,
                chrono::Duration::days(CREDENTIAL_REFRESH_LEAD_DAYS),
            )?)
        }
        None => {
            tracing::warn!("no calendar configured; approvals will fail until one is");
            Arc::new(UnconfiguredCalendar)
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp.clone())?),
        None => {
            tracing::warn!("no SMTP configured; mail is written to the log");
            Arc::new(ConsoleMailer)
        }
    };

    let services = Arc::new(Services::new(
        engine.clone(),
        calendar.clone(),
        mailer,
        Settings {
            public_url: config.public_url.clone(),
            approval_cc: config.approval_cc().map(str::to_string),
        },
    ));

    tokio::spawn(reaper::run_reaper(services.clone()));
    tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));
    tokio::spawn(reaper::run_reminders(services.clone()));
    if config.google.is_some() {
        tokio::spawn(reaper::run_credential_refresh(calendar));
    }

    let factory = Arc::new(wire::MeetslotFactory::new(
        services,
        config.admin_password.clone(),
    ));
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("meetslot listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  timezone: {}", config.schedule.tz);
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(meetslot::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(meetslot::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(meetslot::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let factory = factory.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, factory, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(meetslot::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("meetslot stopped");
    Ok(())
}
