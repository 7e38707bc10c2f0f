//! Replays the event log into every read model.
//!
//! Configured through the `TANIA_*` environment variables; exits non-zero when a view
//! could not be rebuilt or rows remain flagged stale. Other processes writing to the
//! same database must be stopped first; only this process's saves are paused.

use anyhow::{Context, bail};
use tracing::{info, warn};

use tania_infra::composition::Tania;
use tania_infra::config::TaniaConfig;

fn main() -> anyhow::Result<()> {
    let config = TaniaConfig::from_env().context("invalid configuration")?;
    tania_observability::init_with(&config.log_filter);

    let tania = Tania::from_config(&config).context("failed to start")?;
    let rebuilt = tania
        .rebuild_read_models()
        .context("rebuild aborted by a storage failure")?;

    for view in &rebuilt {
        info!(
            view = view.view,
            events = view.stats.events,
            rows = view.stats.rows,
            failures = view.stats.failures,
            "view rebuilt"
        );
    }

    let stale = tania.stale_ids().context("failed to read stale rows")?;
    if !stale.is_empty() {
        for (view, ids) in &stale {
            warn!(view = *view, rows = ids.len(), "rows still stale after rebuild");
        }
        bail!("{} view(s) still hold stale rows", stale.len());
    }

    info!(views = rebuilt.len(), "rebuild complete");
    Ok(())
}
