pub mod histogram;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use histogram::HistogramBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
