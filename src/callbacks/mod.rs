use std::{
    fs::{create_dir_all, File},
    io::BufWriter,
    path::Path,
};

use anyhow::Context as _;
use serde::Serialize;

pub mod log_dispatch;

/// Pretty-print `value` as JSON at `path`, creating parent directories.
pub fn dump_json<T>(path: impl AsRef<Path>, value: &T) -> anyhow::Result<()>
where
    T: ?Sized + Serialize,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("unable to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("unable to serialize {}", path.display()))?;
    Ok(())
}
