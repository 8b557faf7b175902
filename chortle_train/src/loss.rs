use burn::config::Config;
use burn::tensor::activation::relu;
use burn::tensor::{Tensor, backend::Backend};
use chortle_core::Error;

#[derive(Config, Debug)]
pub struct TripletLossConfig {
    /// Required gap between anchor-negative and anchor-positive distances.
    #[config(default = 1e-3)]
    pub margin: f64,
}

impl TripletLossConfig {
    pub fn init(&self) -> TripletLoss {
        TripletLoss { margin: self.margin }
    }
}

/// Hinge loss over rows ordered `(anchor, positive, negative)` repeated.
#[derive(Debug, Clone)]
pub struct TripletLoss {
    margin: f64,
}

impl TripletLoss {
    /// `max(0, |a - p|^2 - |a - n|^2 + margin)` for each triple, `[rows / 3]`.
    pub fn hinge_terms<B: Backend>(&self, embeddings: Tensor<B, 2>) -> chortle_core::Result<Tensor<B, 1>> {
        let [rows, dim] = embeddings.dims();
        if rows == 0 || rows % 3 != 0 {
            return Err(Error::MalformedBatch { rows });
        }
        let triples = rows / 3;

        let grouped = embeddings.reshape([triples, 3, dim]);
        let anchor = grouped.clone().narrow(1, 0, 1).reshape([triples, dim]);
        let positive = grouped.clone().narrow(1, 1, 1).reshape([triples, dim]);
        let negative = grouped.narrow(1, 2, 1).reshape([triples, dim]);

        let to_positive = squared_distance(anchor.clone(), positive);
        let to_negative = squared_distance(anchor, negative);

        Ok(relu((to_positive - to_negative).add_scalar(self.margin)))
    }

    /// Sum of the hinge terms, shape `[1]`.
    pub fn forward<B: Backend>(&self, embeddings: Tensor<B, 2>) -> chortle_core::Result<Tensor<B, 1>> {
        Ok(self.hinge_terms(embeddings)?.sum())
    }
}

/// Row-wise `|x - y|^2`, `[n]`.
fn squared_distance<B: Backend>(x: Tensor<B, 2>, y: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, _] = x.dims();
    let diff = x - y;
    (diff.clone() * diff).sum_dim(1).reshape([n])
}
