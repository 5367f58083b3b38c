//! Compile-time backend selection.
//!
//! Training runs on `Autodiff<DefaultBackend>`. The CPU `NdArray` backend is the
//! default; building with `--features cuda` switches every entry point to CUDA.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray"), not(feature = "cpu")))]
compile_error!("Enable one backend feature: `ndarray` (default) or `cuda`.");

/// Backend used for both training phases
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device type of the selected backend
pub type DefaultDevice = <DefaultBackend as Backend>::Device;

#[cfg(feature = "cuda")]
const BACKEND_NAME: &str = "CUDA (GPU)";

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
const BACKEND_NAME: &str = "NdArray (CPU)";

/// Human-readable name of the compiled-in backend
pub fn backend_name() -> &'static str {
    BACKEND_NAME
}

/// First device of the selected backend
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}
