use std::collections::BTreeMap;
use std::io;
use std::process::Command;

use log::debug;
use tch::{Cuda, Device, Kind, Tensor};

use crate::error::{Result, TrainerError};

/// Picks the devices to train on. `gpus == 0` means CPU.
///
/// With `auto_select` every visible CUDA device is probed with a one-element
/// allocation and the first `gpus` usable ones are returned; otherwise the
/// ordinals `0..gpus` are taken as-is.
pub fn select_devices(gpus: usize, auto_select: bool) -> Result<Vec<Device>> {
    if gpus == 0 {
        return Ok(vec![Device::Cpu]);
    }

    let available = Cuda::device_count().max(0) as usize;
    if available < gpus {
        return Err(TrainerError::Misconfiguration(format!(
            "{} GPU(s) requested but only {} CUDA device(s) available",
            gpus, available
        )));
    }

    if !auto_select {
        return Ok((0..gpus).map(Device::Cuda).collect());
    }

    let mut picked = Vec::with_capacity(gpus);
    for index in 0..available {
        let device = Device::Cuda(index);
        match Tensor::f_ones([1], (Kind::Float, device)) {
            Ok(_) => picked.push(device),
            Err(e) => debug!("Skipping busy device {:?}: {}", device, e),
        }
        if picked.len() == gpus {
            return Ok(picked);
        }
    }

    Err(TrainerError::Misconfiguration(format!(
        "{} GPU(s) requested but only {} could be allocated on",
        gpus,
        picked.len()
    )))
}

/// Used memory per GPU in MiB, keyed `gpu_<index>`, as reported by `nvidia-smi`.
pub fn gpu_memory_map() -> Result<BTreeMap<String, u64>> {
    let output = Command::new("nvidia-smi")
        .args([
            "--query-gpu=memory.used",
            "--format=csv,nounits,noheader",
        ])
        .output()?;

    if !output.status.success() {
        return Err(TrainerError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("nvidia-smi exited with {}", output.status),
        )));
    }

    parse_memory_map(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_memory_map(raw: &str) -> Result<BTreeMap<String, u64>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            let used = line.parse::<u64>().map_err(|e| {
                TrainerError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad nvidia-smi line '{}': {}", line, e),
                ))
            })?;
            Ok((format!("gpu_{}", index), used))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gpus_selects_cpu() {
        assert_eq!(select_devices(0, true).unwrap(), vec![Device::Cpu]);
        assert_eq!(select_devices(0, false).unwrap(), vec![Device::Cpu]);
    }

    #[test]
    fn too_many_gpus_is_misconfiguration() {
        let requested = Cuda::device_count().max(0) as usize + 1;
        let err = select_devices(requested, false).unwrap_err();
        assert!(matches!(err, TrainerError::Misconfiguration(_)));
    }

    #[test]
    fn parses_nvidia_smi_output() {
        let map = parse_memory_map("1024\n  2048 \n\n").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["gpu_0"], 1024);
        assert_eq!(map["gpu_1"], 2048);
    }

    #[test]
    fn rejects_garbage_memory_lines() {
        assert!(parse_memory_map("N/A\n").is_err());
    }
}
