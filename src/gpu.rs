//! Accelerator probing through `nvidia-smi`.

use crate::messages::GpuInfo;
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum GpuProbeError {
    #[error("nvidia-smi failed: {0}")]
    Command(String),
    #[error("nvidia-smi did not answer within {0:?}")]
    Timeout(Duration),
    #[error("invalid nvidia-smi output: {0}")]
    Parse(String),
}

/// Queries the first GPU. A missing `nvidia-smi` binary means there is no
/// accelerator and is not an error; a binary that runs but misbehaves is.
pub async fn probe() -> Result<GpuInfo, GpuProbeError> {
    let query = Command::new("nvidia-smi")
        .args([
            "--query-gpu=name,memory.used,memory.total",
            "--format=csv,noheader,nounits",
        ])
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(PROBE_TIMEOUT, query)
        .await
        .map_err(|_| GpuProbeError::Timeout(PROBE_TIMEOUT))?
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GpuInfo::default()),
        Err(e) => return Err(GpuProbeError::Command(e.to_string())),
    };

    if !output.status.success() {
        // nvidia-smi exits non-zero when the driver sees no devices
        log::debug!(
            "nvidia-smi exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(GpuInfo::default());
    }

    parse_query_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `name, memory.used, memory.total` lines; the first line describes
/// the reported GPU and the line count gives the device count.
pub fn parse_query_output(stdout: &str) -> Result<GpuInfo, GpuProbeError> {
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    let Some(first) = lines.first() else {
        return Ok(GpuInfo::default());
    };

    let parts: Vec<&str> = first.split(',').map(str::trim).collect();
    let &[name, used, total] = parts.as_slice() else {
        return Err(GpuProbeError::Parse(first.to_string()));
    };
    let used: f64 = used
        .parse()
        .map_err(|_| GpuProbeError::Parse(format!("memory.used '{used}'")))?;
    let total = total.parse::<f64>().ok();

    Ok(GpuInfo {
        available: true,
        count: Some(lines.len() as u32),
        name: Some(name.to_string()),
        memory_used_mb: Some(used),
        total_memory_mb: total,
    })
}
