//! Next-token sampling: repetition penalty, temperature, top-k, top-p.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::SamplingParams;
use super::ops::softmax;
use super::tokenizer::TokenId;

/// Seeded sampler for one generation call.
pub struct Sampler {
    params: SamplingParams,
    rng: StdRng,
    candidates: Vec<(TokenId, f32)>,
}

impl Sampler {
    pub fn new(params: SamplingParams) -> Self {
        let rng = StdRng::seed_from_u64(params.seed);
        Self { params, rng, candidates: Vec::new() }
    }

    /// Pick the next token. `banned` (end-of-sequence under `ignore_eos`) is
    /// never chosen unless it is the only token. `None` only for empty logits.
    pub fn sample(
        &mut self,
        logits: &[f32],
        recent: &[TokenId],
        banned: Option<TokenId>,
    ) -> Option<TokenId> {
        if logits.is_empty() {
            return None;
        }

        self.candidates.clear();
        self.candidates
            .extend(logits.iter().enumerate().map(|(i, &l)| (i as TokenId, l)));

        self.apply_repeat_penalty(recent);
        if let Some(id) = banned {
            if logits.len() > 1 {
                if let Some(c) = self.candidates.get_mut(id as usize) {
                    c.1 = f32::NEG_INFINITY;
                }
            }
        }

        if self.params.temperature <= 0.0 {
            return Some(self.argmax());
        }
        Some(self.sample_distribution())
    }

    fn apply_repeat_penalty(&mut self, recent: &[TokenId]) {
        let penalty = self.params.repeat_penalty;
        if penalty == 1.0 || self.params.repeat_last_n == 0 {
            return;
        }
        let window = &recent[recent.len().saturating_sub(self.params.repeat_last_n)..];
        let mut seen = vec![false; self.candidates.len()];
        for &id in window {
            let Some(flag) = seen.get_mut(id as usize) else { continue };
            if std::mem::replace(flag, true) {
                continue;
            }
            let logit = &mut self.candidates[id as usize].1;
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }

    /// First index of the maximum logit.
    fn argmax(&self) -> TokenId {
        let mut best = self.candidates[0];
        for &c in &self.candidates[1..] {
            if c.1 > best.1 {
                best = c;
            }
        }
        best.0
    }

    fn sample_distribution(&mut self) -> TokenId {
        let inv_temp = 1.0 / self.params.temperature;
        for c in self.candidates.iter_mut() {
            c.1 *= inv_temp;
        }

        // Highest logit first; ties keep the lower id first.
        self.candidates
            .sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        if self.params.top_k > 0 {
            self.candidates.truncate(self.params.top_k);
        }

        let mut probs: Vec<f32> = self.candidates.iter().map(|c| c.1).collect();
        softmax(&mut probs);

        if self.params.top_p < 1.0 {
            let mut cumulative = 0.0;
            let mut keep = probs.len();
            for (i, p) in probs.iter().enumerate() {
                cumulative += p;
                if cumulative >= self.params.top_p {
                    keep = i + 1;
                    break;
                }
            }
            probs.truncate(keep);
        }

        let total: f32 = probs.iter().sum();
        let mut r = self.rng.gen::<f32>() * total;
        for (i, p) in probs.iter().enumerate() {
            r -= p;
            if r <= 0.0 {
                return self.candidates[i].0;
            }
        }
        self.candidates[probs.len() - 1].0
    }
}
