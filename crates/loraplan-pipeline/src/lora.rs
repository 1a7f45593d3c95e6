//! Activation plans
//!
//! An [`ActivationPlan`] is the ordered list of LoRA hooks a resolution
//! produces. Applying it to a live model is the job of a
//! [`WeightPatchSink`]; the plan only decides what reaches the sink.

use loraplan_core::KeyPoint;
use loraplan_lora::TensorDict;
use std::sync::Arc;

/// Strength at a point of the sampling process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    /// Fraction of the sampling process where this strength starts
    pub start_percent: f64,
    /// Strength multiplier
    pub strength: f64,
}

impl From<KeyPoint> for Keyframe {
    fn from(point: KeyPoint) -> Self {
        Self {
            start_percent: point.x,
            strength: point.y,
        }
    }
}

/// One scheduled LoRA application
#[derive(Debug, Clone)]
pub struct Hook {
    /// Name the entry was scheduled under
    pub name: String,
    /// Parameter deltas, already block-weighted
    pub tensors: Arc<TensorDict>,
    pub strength_model: f64,
    pub strength_clip: f64,
    /// Strength curve; empty means constant
    pub keyframes: Vec<Keyframe>,
}

impl Hook {
    /// Create a hook with a constant curve
    pub fn new(
        name: impl Into<String>,
        tensors: Arc<TensorDict>,
        strength_model: f64,
        strength_clip: f64,
    ) -> Self {
        Self {
            name: name.into(),
            tensors,
            strength_model,
            strength_clip,
            keyframes: Vec::new(),
        }
    }

    /// Set the keyframes
    pub fn with_keyframes(mut self, keyframes: impl IntoIterator<Item = Keyframe>) -> Self {
        self.keyframes = keyframes.into_iter().collect();
        self
    }
}

/// Part of the model a patch applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchTarget {
    /// Diffusion model weights
    Model,
    /// Text encoder weights
    Clip,
}

/// A hook bound to one target at a non-zero strength
#[derive(Debug, Clone, Copy)]
pub struct WeightPatch<'a> {
    pub hook: &'a Hook,
    pub target: PatchTarget,
    pub strength: f64,
}

/// Consumer of weight patches, e.g. the host's model patcher
pub trait WeightPatchSink {
    /// Live model handle
    type Model;

    /// Register `patches` on `model`, in order
    fn apply(&mut self, model: &mut Self::Model, patches: &[WeightPatch<'_>]);
}

/// Ordered hooks composed from a resolution
#[derive(Debug, Clone, Default)]
pub struct ActivationPlan {
    hooks: Vec<Hook>,
}

impl ActivationPlan {
    /// Plan from hooks in order
    pub fn from_hooks(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    /// Concatenate `prior` (first) with `hooks`
    pub fn compose(prior: Option<&ActivationPlan>, hooks: Vec<Hook>) -> Self {
        let mut all = prior.map(|p| p.hooks.clone()).unwrap_or_default();
        all.extend(hooks);
        Self { hooks: all }
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hook> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Patches per hook and target, exactly-zero strengths left out
    pub fn patches(&self) -> Vec<WeightPatch<'_>> {
        self.hooks
            .iter()
            .flat_map(|hook| {
                [
                    (PatchTarget::Model, hook.strength_model),
                    (PatchTarget::Clip, hook.strength_clip),
                ]
                .into_iter()
                .filter(|(_, strength)| *strength != 0.0)
                .map(move |(target, strength)| WeightPatch {
                    hook,
                    target,
                    strength,
                })
            })
            .collect()
    }

    /// Hand the non-zero patches to `sink`; returns how many were sent
    pub fn dispatch<S: WeightPatchSink>(&self, sink: &mut S, model: &mut S::Model) -> usize {
        let patches = self.patches();
        if !patches.is_empty() {
            sink.apply(model, &patches);
        }
        patches.len()
    }
}
