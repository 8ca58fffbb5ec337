//! Shared CLI helpers used across multiple commands.

use anyhow::Context;
use strata_config::Patch;
use std::path::Path;

/// Load a patch file, optionally overriding its sample rate.
pub fn load_patch(path: &Path, sample_rate: Option<u32>) -> anyhow::Result<Patch> {
    let mut patch =
        Patch::load(path).with_context(|| format!("loading patch {}", path.display()))?;
    if let Some(rate) = sample_rate {
        patch.engine.sample_rate = rate;
    }
    Ok(patch)
}

/// One-line description of a patch's engine settings.
pub fn engine_summary(patch: &Patch) -> String {
    let engine = &patch.engine;
    format!(
        "{} Hz, {} frame blocks, {} channel(s)",
        engine.sample_rate, engine.block_size, engine.channels
    )
}
