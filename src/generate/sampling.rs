//! Token sampling: temperature, nucleus (top-p) filtering and a seeded PRNG.

/// xorshift64 generator; deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct XorShift {
    state: u64,
}

impl XorShift {
    pub fn new(seed: u64) -> Self {
        // xorshift never leaves the all-zero state
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Softmax of `logits / temperature`. Non-finite logits get zero mass.
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|x| x.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits
        .iter()
        .map(|&x| {
            if x.is_finite() {
                ((x - max) / temperature).exp()
            } else {
                0.0
            }
        })
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Smallest set of most-probable tokens whose mass reaches `top_p`,
/// renormalised, in descending probability. Never empty for non-empty input.
pub fn nucleus(probs: &[f32], top_p: f32) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept = Vec::new();
    let mut mass = 0.0f32;
    for (idx, p) in ranked {
        kept.push((idx, p));
        mass += p;
        if mass >= top_p {
            break;
        }
    }
    if mass > 0.0 {
        for entry in &mut kept {
            entry.1 /= mass;
        }
    }
    kept
}

pub fn argmax(logits: &[f32]) -> usize {
    logits
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_nan())
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct Sampler {
    temperature: f32,
    top_p: f32,
    rng: XorShift,
}

impl Sampler {
    pub fn new(temperature: f32, top_p: f32, seed: u64) -> Self {
        Self {
            temperature,
            top_p: top_p.clamp(f32::MIN_POSITIVE, 1.0),
            rng: XorShift::new(seed),
        }
    }

    /// Pick the next token id from a row of logits. Temperature 0 is greedy.
    pub fn sample(&mut self, logits: &[f32]) -> usize {
        if self.temperature <= 0.0 {
            return argmax(logits);
        }
        let probs = softmax(logits, self.temperature);
        let candidates = nucleus(&probs, self.top_p);
        let Some(&(fallback, _)) = candidates.first() else {
            return argmax(logits);
        };

        let draw = self.rng.next_f32();
        let mut cumulative = 0.0f32;
        for &(idx, p) in &candidates {
            cumulative += p;
            if draw < cumulative {
                return idx;
            }
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, f32::NEG_INFINITY], 0.7);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(probs[3], 0.0);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn test_nucleus_keeps_smallest_prefix() {
        let kept = nucleus(&[0.05, 0.6, 0.3, 0.05], 0.85);
        let ids: Vec<usize> = kept.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, vec![1, 2]);
        let mass: f32 = kept.iter().map(|(_, p)| p).sum();
        assert!((mass - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_nucleus_always_keeps_one() {
        let kept = nucleus(&[0.9, 0.1], 0.01);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0, 0);
    }

    #[test]
    fn test_greedy_at_zero_temperature() {
        let mut sampler = Sampler::new(0.0, 0.9, 1);
        assert_eq!(sampler.sample(&[0.1, 5.0, 2.0]), 1);
    }

    #[test]
    fn test_sampling_stays_in_nucleus_and_is_seeded() {
        let logits = [10.0, 9.5, -5.0, -5.0, -5.0];
        let mut a = Sampler::new(0.7, 0.9, 42);
        let mut b = Sampler::new(0.7, 0.9, 42);
        for _ in 0..200 {
            let x = a.sample(&logits);
            assert!(x == 0 || x == 1);
            assert_eq!(x, b.sample(&logits));
        }
    }

    #[test]
    fn test_xorshift_unit_interval() {
        let mut rng = XorShift::new(0);
        for _ in 0..1000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
    }
}
