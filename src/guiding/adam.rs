// Copyright @yucwang 2026

use crate::math::constants::Float;

const VARIABLE_LIMIT: Float = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamHyperparameters {
    pub learning_rate: Float,
    /// Accumulated statistical weight that triggers one step.
    pub batch_size: Float,
    pub epsilon: Float,
    pub beta1: Float,
    pub beta2: Float,
}

impl Default for AdamHyperparameters {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            batch_size: 1.0,
            epsilon: 1e-8,
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct AdamState {
    iter: i32,
    first_moment: Float,
    second_moment: Float,
    variable: Float,
    batch_accumulation: Float,
    batch_gradient: Float,
}

/// Bias-corrected Adam over a single scalar, fed in weighted mini-batches.
#[derive(Debug, Clone, PartialEq)]
pub struct AdamOptimizer {
    state: AdamState,
    hparams: AdamHyperparameters,
}

impl AdamOptimizer {
    pub fn new(learning_rate: Float) -> Self {
        Self::with_hyperparameters(AdamHyperparameters {
            learning_rate,
            ..AdamHyperparameters::default()
        })
    }

    pub fn with_hyperparameters(hparams: AdamHyperparameters) -> Self {
        Self {
            state: AdamState::default(),
            hparams,
        }
    }

    pub fn hyperparameters(&self) -> &AdamHyperparameters {
        &self.hparams
    }

    /// Adds a weighted gradient to the current batch and steps once the
    /// batch weight exceeds the batch size.
    pub fn append(&mut self, gradient: Float, statistical_weight: Float) {
        self.state.batch_gradient += gradient * statistical_weight;
        self.state.batch_accumulation += statistical_weight;

        if self.state.batch_accumulation > self.hparams.batch_size {
            self.step(self.state.batch_gradient / self.state.batch_accumulation);

            self.state.batch_gradient = 0.0;
            self.state.batch_accumulation = 0.0;
        }
    }

    pub fn step(&mut self, gradient: Float) {
        self.state.iter += 1;

        let hp = &self.hparams;
        let actual_learning_rate = hp.learning_rate
            * (1.0 - hp.beta2.powi(self.state.iter)).sqrt()
            / (1.0 - hp.beta1.powi(self.state.iter));
        self.state.first_moment = hp.beta1 * self.state.first_moment + (1.0 - hp.beta1) * gradient;
        self.state.second_moment =
            hp.beta2 * self.state.second_moment + (1.0 - hp.beta2) * gradient * gradient;
        self.state.variable -= actual_learning_rate * self.state.first_moment
            / (self.state.second_moment.sqrt() + hp.epsilon);

        // Keeps the logistic of the variable away from exact 0 and 1.
        self.state.variable = self.state.variable.max(-VARIABLE_LIMIT).min(VARIABLE_LIMIT);
    }

    pub fn variable(&self) -> Float {
        self.state.variable
    }

    pub fn set_variable(&mut self, variable: Float) {
        self.state.variable = variable.max(-VARIABLE_LIMIT).min(VARIABLE_LIMIT);
    }

    pub fn iterations(&self) -> i32 {
        self.state.iter
    }
}
