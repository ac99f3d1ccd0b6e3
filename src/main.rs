// geotick - Main Entry Point
// Copyright (C) 2024 geotick contributors
// Licensed under AGPL v3
// Live position display with dead-reckoning when fixes stall

use geotick::config::{listen_addr, Config};
use geotick::net::TcpFixProvider;
use geotick::output::{CsvOutput, JsonLinesOutput, LogOutput, OutputHandler};
use geotick::provider::check_and_prompt_enable_gps;
use geotick::tracker::Tracker;
use std::sync::Arc;
use tokio::signal;
use clap::Parser;
use tracing::{info, error, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command-line arguments
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    info!("Starting geotick");

    let provider = Arc::new(TcpFixProvider::new(config.provider_connect.clone()));

    // Readiness is advisory: tracking starts either way and fixes flow once the source is up
    if check_and_prompt_enable_gps(provider.check_settings(), || info!("GPS ready")).await.is_err() {
        warn!("Starting without a reachable location source at {}", provider.addr());
    }

    // 1. Setup Outputs
    let mut outputs: Vec<Box<dyn OutputHandler>> = Vec::new();

    if !config.no_log_state {
        outputs.push(Box::new(LogOutput));
    }

    if !config.state_listen.is_empty() {
        // Capacity 100 messages
        let (tx, _rx) = tokio::sync::broadcast::channel(100);
        for listen in &config.state_listen {
            let addr = listen_addr(listen);
            info!("State output on {} (Listen)", addr);
            tokio::spawn(geotick::net::output_tcp::run_tcp_listen_output(addr, tx.clone()));
        }
        outputs.push(Box::new(JsonLinesOutput::new(Some(tx))));
    }

    for filename in &config.write_csv {
        info!("Writing CSV states to {}", filename);
        match CsvOutput::new(filename) {
            Ok(csv_out) => outputs.push(Box::new(csv_out)),
            Err(e) => error!("Failed to open CSV output file {}: {}", filename, e),
        }
    }

    // 2. Tracker
    let mut tracker = Tracker::new(provider.clone(), config.tracker_config());

    if let Some(port) = config.http_port {
        let rx = tracker.subscribe();
        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind((std::net::Ipv4Addr::UNSPECIFIED, port)).await {
                Ok(l) => l,
                Err(e) => {
                    error!("HTTP server failed to bind to port {}: {}", port, e);
                    return;
                }
            };
            if let Err(e) = geotick::net::http::serve(listener, rx).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    tokio::spawn(geotick::output::run_outputs(tracker.subscribe(), outputs));

    tracker.start().await?;
    info!("Tracking ready");

    // Wait for shutdown signal (Ctrl+C)
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            tracker.stop().await;
            return Err(err.into());
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    tracker.stop().await;

    let state = tracker.location_state();
    info!("Last position: ({:.6}, {:.6})", state.latitude, state.longitude);

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt::format::FmtSpan;

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_span_events(if verbose {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if verbose {
        subscriber
            .with_max_level(tracing::Level::DEBUG)
            .init();
        info!("Verbose logging enabled (DEBUG level)");
    } else {
        subscriber
            .with_max_level(tracing::Level::INFO)
            .init();
    }
}
