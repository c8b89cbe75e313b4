//! Local text generation with a pretrained causal language model.

pub mod sampling;

#[cfg(feature = "onnx")]
mod model;

#[cfg(feature = "onnx")]
pub use model::{download_model, CausalLm};

use anyhow::Result;

use crate::config::Config;

/// ONNX export of `meta-llama/Llama-3.2-1B`.
pub const DEFAULT_MODEL_REPO: &str = "onnx-community/Llama-3.2-1B";
pub const DEFAULT_MODEL_FILE: &str = "onnx/model.onnx";
pub const DEFAULT_PROMPT: &str = "Explain quantum computing in simple terms:";

#[derive(Debug, Clone)]
pub struct ModelSource {
    /// Hugging Face repository id.
    pub repo: String,
    /// Path of the ONNX graph inside the repository.
    pub model_file: String,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            repo: DEFAULT_MODEL_REPO.to_string(),
            model_file: DEFAULT_MODEL_FILE.to_string(),
        }
    }
}

impl ModelSource {
    /// Local cache directory name, e.g. `onnx-community--Llama-3.2-1B`.
    pub fn cache_dir_name(&self) -> String {
        self.repo.replace('/', "--")
    }

    pub fn model_file_name(&self) -> &str {
        self.model_file.rsplit('/').next().unwrap_or(&self.model_file)
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 150,
            temperature: 0.7,
            top_p: 0.9,
            seed: seed_from_clock(),
        }
    }
}

fn seed_from_clock() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n as u64)
        .unwrap_or(0x5EED)
}

/// Fetch the model if needed, then return prompt plus continuation.
#[cfg(feature = "onnx")]
pub async fn generate(
    config: &Config,
    source: &ModelSource,
    prompt: &str,
    gen: &GenerationConfig,
) -> Result<String> {
    let model_dir = download_model(config, source).await?;
    let model_file = model_dir.join(source.model_file_name());
    let prompt = prompt.to_string();
    let gen = gen.clone();
    tokio::task::spawn_blocking(move || {
        let mut lm = CausalLm::load(&model_dir, &model_file)?;
        lm.generate(&prompt, &gen)
    })
    .await?
}

#[cfg(not(feature = "onnx"))]
pub async fn generate(
    _config: &Config,
    _source: &ModelSource,
    _prompt: &str,
    _gen: &GenerationConfig,
) -> Result<String> {
    anyhow::bail!(
        "text generation needs the `onnx` feature; rebuild with `cargo build --features onnx`"
    )
}
