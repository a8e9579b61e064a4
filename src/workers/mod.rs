pub mod lifecycle_sweep;

pub use lifecycle_sweep::LifecycleSweepWorker;
