use clap::ValueEnum;
use tch::{Device, Kind};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Precision {
    Fp32,
    Fp16,
    Bf16,
}

impl Precision {
    pub fn kind(self) -> Kind {
        match self {
            Precision::Fp32 => Kind::Float,
            Precision::Fp16 => Kind::Half,
            Precision::Bf16 => Kind::BFloat16,
        }
    }
}

/// First requested CUDA device, or the CPU when CUDA isn't available.
pub fn select_device(devices: &[usize]) -> Device {
    if !tch::Cuda::is_available() {
        warn!("CUDA is not available, running on CPU");
        return Device::Cpu;
    }
    match devices {
        [] => Device::Cpu,
        [first, rest @ ..] => {
            if !rest.is_empty() {
                warn!("Only one device is used for evaluation, ignoring {rest:?}");
            }
            Device::Cuda(*first)
        }
    }
}
