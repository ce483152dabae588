// ============================================================
// Layer 6 — GPU Memory Monitor
// ============================================================
// ResourceMonitor backed by `nvidia-smi`. Any failure (no binary,
// no NVIDIA device, unparsable output) reads as "unknown", never
// as an error.

use std::process::Command;

use crate::domain::traits::ResourceMonitor;

#[derive(Debug, Clone)]
pub struct NvidiaSmiMonitor {
    device_idx: usize,
}

impl NvidiaSmiMonitor {
    pub fn new(device_idx: usize) -> Self {
        Self { device_idx }
    }
}

impl ResourceMonitor for NvidiaSmiMonitor {
    fn used_memory_mib(&self) -> Option<f64> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=memory.used",
                "--format=csv,noheader,nounits",
                &format!("--id={}", self.device_idx),
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_memory_used(&String::from_utf8_lossy(&output.stdout))
    }
}

/// First line of `--query-gpu=memory.used --format=csv,noheader,nounits`.
pub fn parse_memory_used(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .next()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_used() {
        assert_eq!(parse_memory_used("2048\n"), Some(2048.0));
        assert_eq!(parse_memory_used(" 512 \n1024\n"), Some(512.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_memory_used(""), None);
        assert_eq!(parse_memory_used("[N/A]"), None);
        assert_eq!(parse_memory_used("-5"), None);
    }
}
