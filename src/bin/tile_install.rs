//! Installs a staged build artifact over a deployed one.
//!
//! Usage: `tile_install <staged> <target>`

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_cache::deploy::install_artifact;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tile_cache=info,tile_install=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [staged, target] = args.as_slice() else {
        bail!("usage: tile_install <staged> <target>");
    };
    let (staged, target) = (PathBuf::from(staged), PathBuf::from(target));

    let report = install_artifact(&staged, &target).with_context(|| {
        format!(
            "failed to install {} to {}",
            staged.display(),
            target.display()
        )
    })?;

    info!(
        target = %report.target.display(),
        bytes = report.bytes,
        replaced = report.replaced,
        "Done"
    );
    Ok(())
}
