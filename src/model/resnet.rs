//! ResNet50 backbone
//!
//! Bottleneck layout with the stride on the 3x3 convolution. The backbone is
//! split into freezable units: unit 0 is the stem, units 1..=16 are the
//! bottleneck blocks in order (stages of 3, 4, 6 and 3 blocks).
//!
//! Architecture (base width 64):
//! - Stem: Conv 7x7/2 (64) → BN → ReLU → MaxPool 3x3/2
//! - Stage 1: 3 × Bottleneck(64 → 256)
//! - Stage 2: 4 × Bottleneck(128 → 512), first block stride 2
//! - Stage 3: 6 × Bottleneck(256 → 1024), first block stride 2
//! - Stage 4: 3 × Bottleneck(512 → 2048), first block stride 2
//!
//! Every forward takes a [`NormMode`]. Training passes use
//! [`NormMode::Running`] so that unfrozen units keep normalizing with the
//! pretrained running statistics, as Keras does for a base model called
//! with `training=False`.

use std::ops::Range;

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Blocks per stage
pub const STAGE_BLOCKS: [usize; 4] = [3, 4, 6, 3];

/// Output channels of a bottleneck relative to its inner width
pub const EXPANSION: usize = 4;

/// Stem plus every bottleneck block
pub const NUM_UNITS: usize = 17;

/// First unit of each stage (stage 1 starts right after the stem)
pub const STAGE_START_UNITS: [usize; 4] = [1, 4, 8, 14];

/// How batch norm layers normalize during a forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormMode {
    /// Burn's `BatchNorm::forward`: batch statistics (and running-stat
    /// updates) on an autodiff backend, running statistics otherwise
    Batch,
    /// Always the running statistics; gamma and beta still get gradients
    Running,
}

/// Bias-free convolution followed by batch norm
#[derive(Module, Debug)]
pub struct ConvNorm<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvNorm<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: NormMode) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        match mode {
            NormMode::Batch => self.bn.forward(x),
            NormMode::Running => self.normalize_running(x),
        }
    }

    fn normalize_running(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();
        let shape = [1, channels, 1, 1];

        let mean = self.bn.running_mean.value().reshape(shape);
        let var = self.bn.running_var.value().reshape(shape);
        let gamma = self.bn.gamma.val().reshape(shape);
        let beta = self.bn.beta.val().reshape(shape);

        x.sub(mean)
            .div(var.add_scalar(self.bn.epsilon).sqrt())
            .mul(gamma)
            .add(beta)
    }
}

/// 7x7 strided convolution and max pooling
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    pub conv: ConvNorm<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    pub fn new(out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: ConvNorm::new(3, out_channels, 7, 2, device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: NormMode) -> Tensor<B, 4> {
        let x = self.relu.forward(self.conv.forward(x, mode));
        self.pool.forward(x)
    }
}

/// 1x1 reduce → 3x3 → 1x1 expand, with a projection shortcut when the shape changes
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub reduce: ConvNorm<B>,
    pub conv: ConvNorm<B>,
    pub expand: ConvNorm<B>,
    pub downsample: Option<ConvNorm<B>>,
    pub relu: Relu,
}

impl<B: Backend> Bottleneck<B> {
    pub fn new(in_channels: usize, width: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = width * EXPANSION;
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(ConvNorm::new(in_channels, out_channels, 1, stride, device))
        } else {
            None
        };

        Self {
            reduce: ConvNorm::new(in_channels, width, 1, 1, device),
            conv: ConvNorm::new(width, width, 3, stride, device),
            expand: ConvNorm::new(width, out_channels, 1, 1, device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, mode: NormMode) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone(), mode),
            None => x.clone(),
        };

        let out = self.relu.forward(self.reduce.forward(x, mode));
        let out = self.relu.forward(self.conv.forward(out, mode));
        let out = self.expand.forward(out, mode);

        self.relu.forward(out + identity)
    }
}

/// ResNet50 feature extractor (no pooling, no classifier)
#[derive(Module, Debug)]
pub struct ResNet50<B: Backend> {
    pub stem: Stem<B>,
    pub blocks: Vec<Bottleneck<B>>,
    out_channels: usize,
}

impl<B: Backend> ResNet50<B> {
    /// `base_width` is the stem width and the inner width of stage 1 (64 for
    /// the standard network); later stages double it.
    pub fn new(base_width: usize, device: &B::Device) -> Self {
        let stem = Stem::new(base_width, device);

        let mut blocks = Vec::with_capacity(NUM_UNITS - 1);
        let mut in_channels = base_width;
        for (stage, &num_blocks) in STAGE_BLOCKS.iter().enumerate() {
            let width = base_width << stage;
            for block in 0..num_blocks {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                blocks.push(Bottleneck::new(in_channels, width, stride, device));
                in_channels = width * EXPANSION;
            }
        }

        Self {
            stem,
            blocks,
            out_channels: in_channels,
        }
    }

    /// Channels of the final feature map
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Run the whole backbone with Burn's batch norm behaviour
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward_units(x, 0..NUM_UNITS, NormMode::Batch)
    }

    /// Run only the units in `units` (clamped to the backbone)
    pub fn forward_units(&self, x: Tensor<B, 4>, units: Range<usize>, mode: NormMode) -> Tensor<B, 4> {
        let mut x = x;
        for unit in units.start..units.end.min(NUM_UNITS) {
            x = if unit == 0 {
                self.stem.forward(x, mode)
            } else {
                self.blocks[unit - 1].forward(x, mode)
            };
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_unit_layout() {
        assert_eq!(1 + STAGE_BLOCKS.iter().sum::<usize>(), NUM_UNITS);
        let mut start = 1;
        for (stage, &n) in STAGE_BLOCKS.iter().enumerate() {
            assert_eq!(STAGE_START_UNITS[stage], start);
            start += n;
        }
    }

    #[test]
    fn test_standard_width_channels() {
        let device = Default::default();
        // only the bookkeeping is checked here, the full network is never run
        let model = ResNet50::<TestBackend>::new(64, &device);
        assert_eq!(model.out_channels(), 2048);
        assert_eq!(model.blocks.len(), NUM_UNITS - 1);
        assert!(model.blocks[0].downsample.is_some());
        assert!(model.blocks[1].downsample.is_none());
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = ResNet50::<TestBackend>::new(2, &device);
        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);

        let output = model.forward(input);

        // 32 → 16 (conv) → 8 (pool) → 8 → 4 → 2 → 1
        assert_eq!(output.dims(), [2, 2 * 8 * EXPANSION, 1, 1]);
    }

    #[test]
    fn test_split_forward_matches_full_forward() {
        let device = Default::default();
        let model = ResNet50::<TestBackend>::new(2, &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);

        let full = model.forward(input.clone());
        let lower = model.forward_units(input, 0..STAGE_START_UNITS[3], NormMode::Batch);
        let split = model.forward_units(lower, STAGE_START_UNITS[3]..NUM_UNITS, NormMode::Batch);

        let full = full.into_data().to_vec::<f32>().unwrap();
        let split = split.into_data().to_vec::<f32>().unwrap();
        assert_eq!(full.len(), split.len());
        for (a, b) in full.iter().zip(&split) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_running_norm_matches_inference_forward() {
        let device = Default::default();
        let model = ResNet50::<TestBackend>::new(2, &device);
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 32, 32], &device);

        let batch = model.forward(input.clone()).into_data().to_vec::<f32>().unwrap();
        let running = model
            .forward_units(input, 0..NUM_UNITS, NormMode::Running)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        for (a, b) in batch.iter().zip(&running) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
