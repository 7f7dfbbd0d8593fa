//! `telesync fetch`: one request to the status endpoint.

use telesync_core::{Clock, ControllerConfig, PullAdapter, Snapshot};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn handle(config: &ControllerConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot = fetch_snapshot(config).await?;
    let out = output::render_single(
        global.output,
        &snapshot,
        output::snapshot_detail,
        output::snapshot_plain,
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Fetch once, mapping failures onto the endpoint URL.
pub async fn fetch_snapshot(config: &ControllerConfig) -> Result<Snapshot, CliError> {
    let url = &config.status_url;
    let adapter = PullAdapter::for_config(config, Clock::new())
        .map_err(|e| CliError::from_sync(e, url))?;

    tracing::debug!(%url, timeout = ?adapter.timeout(), "fetching status");
    adapter
        .fetch_once()
        .await
        .map_err(|e| CliError::from_sync(e, url))
}
