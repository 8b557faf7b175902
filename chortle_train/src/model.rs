use burn::config::Config;
use burn::module::{Module, Param};
use burn::tensor::activation::{relu, sigmoid, softmax};
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;
use burn::tensor::{Tensor, TensorData, backend::Backend};
use chortle_core::Error;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::config::EmbeddingSpace;

/// Geometry and initialization of the conv → dense → softmax network.
#[derive(Config, Debug)]
pub struct EmbeddingNetConfig {
    #[config(default = 60)]
    pub bands: usize,
    #[config(default = 433)]
    pub frames: usize,
    #[config(default = 2)]
    pub channels: usize,
    #[config(default = 30)]
    pub kernel_size: usize,
    #[config(default = 2)]
    pub stride: usize,
    /// Convolution output channels.
    #[config(default = 20)]
    pub depth: usize,
    #[config(default = 200)]
    pub hidden: usize,
    #[config(default = 5)]
    pub num_labels: usize,
    /// Standard deviation of the truncated-normal weight init.
    #[config(default = 0.1)]
    pub init_std: f64,
    #[config(default = 1.0)]
    pub init_bias: f64,
}

impl EmbeddingNetConfig {
    /// Zero padding `[before, after]` per axis, `[bands, frames]`, giving the
    /// "same" output size `ceil(input / stride)`. Odd totals put the extra
    /// row or column after the input.
    pub fn conv_padding(&self) -> [[usize; 2]; 2] {
        [
            same_padding(self.bands, self.kernel_size, self.stride),
            same_padding(self.frames, self.kernel_size, self.stride),
        ]
    }

    /// Spatial size of the convolution output, `[bands, frames]`.
    pub fn conv_output(&self) -> [usize; 2] {
        let [[top, bottom], [left, right]] = self.conv_padding();
        [
            (self.bands + top + bottom - self.kernel_size) / self.stride + 1,
            (self.frames + left + right - self.kernel_size) / self.stride + 1,
        ]
    }

    /// Width of the flattened convolution output.
    pub fn flat_features(&self) -> usize {
        let [h, w] = self.conv_output();
        self.depth * h * w
    }

    pub fn validate(&self) -> chortle_core::Result<()> {
        let sizes = [
            ("bands", self.bands),
            ("frames", self.frames),
            ("channels", self.channels),
            ("kernel_size", self.kernel_size),
            ("stride", self.stride),
            ("depth", self.depth),
            ("hidden", self.hidden),
            ("num_labels", self.num_labels),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("model.{name} must be positive")));
        }
        if !(self.init_std > 0.0) {
            return Err(Error::InvalidConfig("model.init_std must be positive".into()));
        }
        Ok(())
    }

    /// Weights from a truncated normal, biases constant.
    pub fn init<B: Backend, R: Rng + ?Sized>(&self, device: &B::Device, rng: &mut R) -> EmbeddingNet<B> {
        let k = self.kernel_size;
        let [[pad_top, pad_bottom], [pad_left, pad_right]] = self.conv_padding();
        let flat = self.flat_features();

        let weight = |rng: &mut R, shape: Vec<usize>| {
            let n = shape.iter().product();
            TensorData::new(truncated_normal(rng, n, self.init_std), shape)
        };
        let bias = |n: usize| Tensor::<B, 1>::full([n], self.init_bias, device);

        EmbeddingNet {
            conv_weight: Param::from_tensor(Tensor::from_data(
                weight(&mut *rng, vec![self.depth, self.channels, k, k]),
                device,
            )),
            conv_bias: Param::from_tensor(bias(self.depth)),
            hidden_weight: Param::from_tensor(Tensor::from_data(weight(&mut *rng, vec![flat, self.hidden]), device)),
            hidden_bias: Param::from_tensor(bias(self.hidden)),
            output_weight: Param::from_tensor(Tensor::from_data(
                weight(&mut *rng, vec![self.hidden, self.num_labels]),
                device,
            )),
            output_bias: Param::from_tensor(bias(self.num_labels)),
            stride: self.stride,
            pad_top,
            pad_bottom,
            pad_left,
            pad_right,
        }
    }
}

fn same_padding(input: usize, kernel: usize, stride: usize) -> [usize; 2] {
    let output = input.div_ceil(stride);
    let total = ((output - 1) * stride + kernel).saturating_sub(input);
    [total / 2, total - total / 2]
}

/// Zero-pad axis `dim` of `x` by `[before, after]`.
fn pad_axis<B: Backend>(x: Tensor<B, 4>, dim: usize, [before, after]: [usize; 2]) -> Tensor<B, 4> {
    if before == 0 && after == 0 {
        return x;
    }
    let device = x.device();
    let mut dims = x.dims();
    let mut parts = Vec::with_capacity(3);
    if before > 0 {
        dims[dim] = before;
        parts.push(Tensor::zeros(dims, &device));
    }
    parts.push(x);
    if after > 0 {
        dims[dim] = after;
        parts.push(Tensor::zeros(dims, &device));
    }
    Tensor::cat(parts, dim)
}

/// Normal(0, std) samples, redrawn when beyond two standard deviations.
fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, n: usize, std: f64) -> Vec<f32> {
    (0..n)
        .map(|_| loop {
            let z: f64 = rng.sample(StandardNormal);
            if z.abs() <= 2.0 {
                break (z * std) as f32;
            }
        })
        .collect()
}

/// Network parameters plus the convolution geometry they were built for.
#[derive(Module, Debug)]
pub struct EmbeddingNet<B: Backend> {
    /// `[depth, channels, k, k]`
    conv_weight: Param<Tensor<B, 4>>,
    conv_bias: Param<Tensor<B, 1>>,
    /// `[flat, hidden]`
    hidden_weight: Param<Tensor<B, 2>>,
    hidden_bias: Param<Tensor<B, 1>>,
    /// `[hidden, num_labels]`
    output_weight: Param<Tensor<B, 2>>,
    output_bias: Param<Tensor<B, 1>>,
    stride: usize,
    pad_top: usize,
    pad_bottom: usize,
    pad_left: usize,
    pad_right: usize,
}

/// Every activation a caller may treat as the embedding.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput<B: Backend> {
    /// Sigmoid layer, `[n, hidden]`.
    pub hidden: Tensor<B, 2>,
    /// Pre-softmax scores, `[n, num_labels]`.
    pub logits: Tensor<B, 2>,
    /// Softmax head, `[n, num_labels]`.
    pub probabilities: Tensor<B, 2>,
}

impl<B: Backend> EmbeddingOutput<B> {
    pub fn embedding(&self, space: EmbeddingSpace) -> Tensor<B, 2> {
        match space {
            EmbeddingSpace::Probabilities => self.probabilities.clone(),
            EmbeddingSpace::Logits => self.logits.clone(),
            EmbeddingSpace::Hidden => self.hidden.clone(),
        }
    }
}

impl<B: Backend> EmbeddingNet<B> {
    /// `features`: `[n, channels, bands, frames]`.
    pub fn forward(&self, features: Tensor<B, 4>) -> EmbeddingOutput<B> {
        let padded = pad_axis(features, 2, [self.pad_top, self.pad_bottom]);
        let padded = pad_axis(padded, 3, [self.pad_left, self.pad_right]);

        let options = ConvOptions::new([self.stride, self.stride], [0, 0], [1, 1], 1);
        let conv = relu(conv2d(
            padded,
            self.conv_weight.val(),
            Some(self.conv_bias.val()),
            options,
        ));

        let [n, depth, h, w] = conv.dims();
        let flat = conv.reshape([n, depth * h * w]);

        let hidden = sigmoid(flat.matmul(self.hidden_weight.val()) + self.hidden_bias.val().unsqueeze());
        let logits = hidden.clone().matmul(self.output_weight.val()) + self.output_bias.val().unsqueeze();
        let probabilities = softmax(logits.clone(), 1);

        EmbeddingOutput {
            hidden,
            logits,
            probabilities,
        }
    }
}
