use tch::{Device, Kind, Tensor};
use trainer::seed_everything;

// Kept alone in its own test binary: the libtorch generator is process-global.
#[test]
fn same_seed_gives_same_draws() {
    assert_eq!(seed_everything(234), 234);
    let a = Tensor::randn([8], (Kind::Float, Device::Cpu));
    seed_everything(234);
    let b = Tensor::randn([8], (Kind::Float, Device::Cpu));
    assert!(a.equal(&b));
}
