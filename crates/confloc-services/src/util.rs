use std::path::Path;

use confloc_core::Result;

/// Write a file via a sibling temp file and rename, so a failed or
/// cancelled run never leaves a half-written artifact behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Timestamp used in artifact names, matching the import-log convention.
pub fn artifact_timestamp() -> String {
    chrono::Local::now()
        .format("%a_%d%b_%Y_%Hh%Mm%Ss")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.xml");
        write_atomic(&path, b"<x/>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<x/>");
        assert!(!path.with_extension("tmp").exists());
    }
}
