//! Gradient clipping by the norm of all gradients taken together.
//!
//! burn's `GradientClippingConfig::Norm` clips each parameter tensor on its
//! own. Here every gradient of the module is treated as one vector: when its
//! L2 norm exceeds `max_norm`, all gradients are scaled by the same factor.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleVisitor, ParamId};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use policy::bridge::tensor_to_f64;

struct SquaredNorm<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    total: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) {
            self.total += tensor_to_f64(grad.powf_scalar(2.0).sum());
        }
    }
}

struct Rescale<'a, B: AutodiffBackend> {
    grads: &'a mut GradientsParams,
    scale: f64,
    backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for Rescale<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(id) {
            self.grads
                .register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
        }
    }
}

/// L2 norm of every gradient of `model` in `grads`, flattened into one vector.
pub fn global_grad_norm<B, M>(model: &M, grads: &GradientsParams) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = SquaredNorm::<B> {
        grads,
        total: 0.0,
        backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.total.sqrt()
}

/// Scale all gradients by `max_norm / (norm + 1e-6)` when the global norm exceeds `max_norm`.
///
/// Returns the global norm before clipping.
pub fn clip_grad_norm<B, M>(model: &M, grads: &mut GradientsParams, max_norm: f64) -> f64
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let norm = global_grad_norm::<B, M>(model, grads);
    let scale = max_norm / (norm + 1e-6);
    if scale < 1.0 {
        let mut visitor = Rescale::<B> {
            grads,
            scale,
            backend: PhantomData,
        };
        model.visit(&mut visitor);
    }
    norm
}
