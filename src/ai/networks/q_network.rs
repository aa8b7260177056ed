use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Action-value network for the chaser policy.
///
/// ```text
/// Input:  [batch, state_dim]
/// FC1:    state_dim -> hidden, ReLU
/// FC2:    hidden -> hidden, ReLU
/// FC3:    hidden -> action_dim  (one Q-value per heading)
/// ```
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct QNetworkConfig {
    pub state_dim: usize,
    pub action_dim: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
}

impl QNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        QNetwork {
            fc1: LinearConfig::new(self.state_dim, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            fc3: LinearConfig::new(self.hidden_size, self.action_dim).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> QNetwork<B> {
    /// Forward pass: input [batch, state_dim] -> output [batch, action_dim].
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.fc1.forward(input));
        let x = self.relu.forward(self.fc2.forward(x));
        self.fc3.forward(x)
    }

    /// Polyak-average this (target) network toward `online`:
    /// `self <- tau * online + (1 - tau) * self`, layer by layer.
    pub fn soft_update(mut self, online: &QNetwork<B>, tau: f32) -> Self {
        self.fc1 = blend_linear(self.fc1, &online.fc1, tau);
        self.fc2 = blend_linear(self.fc2, &online.fc2, tau);
        self.fc3 = blend_linear(self.fc3, &online.fc3, tau);
        self
    }
}

fn blend_linear<B: Backend>(mut target: Linear<B>, online: &Linear<B>, tau: f32) -> Linear<B> {
    let weight = online.weight.val();
    target.weight = target.weight.map(move |t| soft_update(t, weight.clone(), tau));

    target.bias = match (target.bias, &online.bias) {
        (Some(t), Some(o)) => {
            let bias = o.val();
            Some(t.map(move |t| soft_update(t, bias.clone(), tau)))
        }
        (bias, _) => bias,
    };
    target
}

/// `tau * online + (1 - tau) * target` for a single parameter tensor.
pub fn soft_update<B: Backend, const D: usize>(
    target: Tensor<B, D>,
    online: Tensor<B, D>,
    tau: f32,
) -> Tensor<B, D> {
    online.mul_scalar(tau) + target.mul_scalar(1.0 - tau)
}
