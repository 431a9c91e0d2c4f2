// File I/O for marketplace VAT reports: CSV input, XLSX, Form 349 and Form 369 output

pub mod csv;
pub mod form349;
pub mod form369;
pub mod transform;
pub mod xlsx;

use std::path::{Path, PathBuf};

use taxgrid_vat::TransformError;

pub use transform::{
    aggregate_file, analyze_periods, export_form349, export_form369, load_rates, transform,
    transform_with, Form349Summary, Form369Options, Form369Summary, PeriodAnalysis, TransformOptions,
};
pub use form369::{Declarant, Form369Regime};

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename, so a
/// failed write never leaves a partial file at `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TransformError> {
    let tmp = tmp_path(path);
    if let Err(e) = std::fs::write(&tmp, bytes).and_then(|_| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
