/*
 * Recloop
 * Copyright (C) 2020 The recloop developers
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

//! Samplers for the posterior distributions behind the stochastic
//! strategies. Callers own the generator, so the same parameters can be
//! sampled from independent, reproducible streams.

use rand::Rng;

/// Numerical stability floor for the parameters.
pub(crate) const EPSILON: f64 = 1e-10;

/// Bound on rejection rounds in gamma sampling.
const MAX_GAMMA_ITERATIONS: usize = 1000;

/// Gamma distribution, sampled with the Marsaglia-Tsang method.
///
/// Reference: Marsaglia, G., & Tsang, W. W. (2000).
/// "A simple method for generating gamma variables."
#[derive(Clone, Copy, Debug)]
pub struct Gamma {
    shape: f64,
    scale: f64,
}

impl Gamma {

    pub fn new(shape: f64, scale: f64) -> Self {
        Gamma {
            shape: shape.max(EPSILON),
            scale: scale.max(EPSILON),
        }
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.shape < 1.0 {
            // Boost the shape above one and correct with a power of a uniform
            let u: f64 = rng.gen::<f64>().max(EPSILON);
            sample_shape_ge_one(self.shape + 1.0, rng) * self.scale * u.powf(1.0 / self.shape)
        } else {
            sample_shape_ge_one(self.shape, rng) * self.scale
        }
    }
}

fn sample_shape_ge_one<R: Rng>(shape: f64, rng: &mut R) -> f64 {

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    for _ in 0..MAX_GAMMA_ITERATIONS {
        let x = sample_normal(rng);
        let v_term = 1.0 + c * x;

        if v_term <= 0.0 {
            continue;
        }

        let v = v_term.powi(3);
        let u: f64 = rng.gen();
        let x2 = x * x;

        if u < 1.0 - 0.0331 * x2 * x2 {
            return d * v;
        }

        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }

    // Exceeded the iteration cap, fall back to the expected value
    shape
}

// Box-Muller transform
pub(crate) fn sample_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(EPSILON);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Beta distribution over a success probability, the posterior kept per arm
/// by the Thompson strategy and per user pair by the stochastic similarity.
#[derive(Clone, Copy, Debug)]
pub struct Beta {
    alpha: f64,
    beta: f64,
}

impl Beta {

    pub fn new(alpha: f64, beta: f64) -> Self {
        Beta {
            alpha: alpha.max(EPSILON),
            beta: beta.max(EPSILON),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior update with (possibly fractional) success and failure
    /// counts.
    pub fn observe(&mut self, successes: f64, failures: f64) {
        self.alpha += successes;
        self.beta += failures;
    }

    /// Samples via two gamma draws: Beta(a, b) = G_a / (G_a + G_b).
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let x = Gamma::new(self.alpha, 1.0).sample(rng);
        let y = Gamma::new(self.beta, 1.0).sample(rng);

        let sum = x + y;
        if sum > 0.0 && sum.is_finite() {
            x / sum
        } else {
            0.5
        }
    }
}
