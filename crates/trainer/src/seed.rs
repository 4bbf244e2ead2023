use log::info;

/// Seeds the libtorch CPU and CUDA generators. Call once at startup, before
/// any module is built.
pub fn seed_everything(seed: u64) -> u64 {
    info!("Global seed set to {}", seed);
    tch::manual_seed(seed as i64);
    tch::Cuda::manual_seed_all(seed);
    seed
}
