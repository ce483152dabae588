// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends each epoch's evaluation report to a per-level CSV:
//
//   results/metrics_level_<L>.csv
//
//   epoch,mse,psnr,vgg,ms_ssim
//   0,0.012345,19.084512,0.231000,
//   1,0.010211,19.909870,0.198000,
//
// Terms a level does not report are left empty. The header is only
// written when the file is new, so restarted runs keep appending.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::error::{TrainError, TrainResult};
use crate::domain::level::Level;
use crate::domain::metrics::EvalReport;

const HEADER: &str = "epoch,mse,psnr,vgg,ms_ssim";

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>, level: Level) -> TrainResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .map_err(|e| TrainError::io(format!("creating '{}'", dir.display()), e))?;

        let csv_path = dir.join(format!("metrics_level_{level}.csv"));
        if !csv_path.exists() {
            fs::write(&csv_path, format!("{HEADER}\n"))
                .map_err(|e| TrainError::io(format!("creating '{}'", csv_path.display()), e))?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, epoch: usize, report: &EvalReport) -> TrainResult<()> {
        let action = || format!("appending to '{}'", self.csv_path.display());
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .map_err(|e| TrainError::io(action(), e))?;

        writeln!(f, "{}", csv_row(epoch, report)).map_err(|e| TrainError::io(action(), e))
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

fn csv_row(epoch: usize, r: &EvalReport) -> String {
    let optional = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
    format!(
        "{},{:.6},{:.6},{},{}",
        epoch,
        r.mse,
        r.psnr,
        optional(r.vgg),
        optional(r.ssim)
    )
}
