//! Trainable classifier head
//!
//! Global average pooling over the backbone feature maps, one hidden dense
//! layer with ReLU, and a dense output layer producing one logit per class.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

/// Configuration for the classifier head
#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    /// Channels of the incoming feature maps
    pub in_channels: usize,

    /// Width of the hidden dense layer
    #[config(default = "1024")]
    pub hidden_units: usize,

    /// Number of output classes
    #[config(default = "4")]
    pub num_classes: usize,
}

impl ClassifierHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        ClassifierHead {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(self.in_channels, self.hidden_units).init(device),
            activation: Relu::new(),
            output: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
        }
    }
}

/// GAP → Dense(hidden, ReLU) → Dense(num_classes)
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub hidden: Linear<B>,
    pub activation: Relu,
    pub output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    /// Logits of shape [batch_size, num_classes] from [batch_size, C, H, W] features
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.pool.forward(features);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.activation.forward(self.hidden.forward(x));
        self.output.forward(x)
    }

    /// (in_channels, hidden_units, num_classes) as stored in the weights
    pub fn dims(&self) -> (usize, usize, usize) {
        // Linear weights are stored as [d_input, d_output]
        let [in_channels, hidden_units] = self.hidden.weight.val().dims();
        let [_, num_classes] = self.output.weight.val().dims();
        (in_channels, hidden_units, num_classes)
    }
}
