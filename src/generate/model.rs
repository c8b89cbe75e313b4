use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use serde::Deserialize;

use super::sampling::Sampler;
use super::{GenerationConfig, ModelSource};
use crate::config::Config;
use crate::download;

/// Download the ONNX graph, tokenizer and model config from Hugging Face
/// into `<model_dir>/<repo>`, skipping files already present.
pub async fn download_model(config: &Config, source: &ModelSource) -> Result<PathBuf> {
    let target_dir = config.model_dir.join(source.cache_dir_name());
    std::fs::create_dir_all(&target_dir).context("Failed to create model directory")?;

    let client = config.http_client()?;
    let external_data = format!("{}_data", source.model_file);
    let files: [(&str, bool); 4] = [
        (source.model_file.as_str(), true),
        (external_data.as_str(), false),
        ("tokenizer.json", true),
        ("config.json", true),
    ];

    for (remote, required) in files {
        let file_name = remote.rsplit('/').next().unwrap_or(remote);
        let local = target_dir.join(file_name);
        if local.exists() {
            tracing::debug!("{} already present at {:?}", remote, local);
            continue;
        }

        let url = format!(
            "{}/{}/resolve/main/{}",
            config.huggingface_url.trim_end_matches('/'),
            source.repo,
            remote
        );
        tracing::info!("Downloading {} from {}", remote, url);

        let mut req = client.get(&url);
        if let Some(ref token) = config.hf_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to download {}", remote))?;
        if !required && resp.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("{} not published for this model", remote);
            continue;
        }
        anyhow::ensure!(
            resp.status().is_success(),
            "Download of {} failed with status: {}",
            remote,
            resp.status()
        );

        let bytes = download::save_response(resp, &local)
            .await
            .with_context(|| format!("Failed to write {:?}", local))?;
        tracing::info!("Saved {:?} ({} bytes)", local, bytes);
    }

    Ok(target_dir)
}

#[derive(Debug, Deserialize)]
struct LmConfig {
    num_hidden_layers: usize,
    num_attention_heads: usize,
    num_key_value_heads: Option<usize>,
    hidden_size: usize,
    head_dim: Option<usize>,
    eos_token_id: Option<TokenIds>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

impl TokenIds {
    fn into_vec(self) -> Vec<u32> {
        match self {
            Self::One(id) => vec![id],
            Self::Many(ids) => ids,
        }
    }
}

/// Decoder-only language model exported to ONNX with a KV cache
/// (`past_key_values.{i}.key|value` in, `present.{i}.key|value` out).
pub struct CausalLm {
    session: Session,
    tokenizer: tokenizers::Tokenizer,
    layers: usize,
    kv_heads: usize,
    head_dim: usize,
    eos_ids: Vec<u32>,
}

/// Cached keys or values for one layer, shaped `[1, kv_heads, seq, head_dim]`.
struct KvEntry {
    seq: usize,
    data: Vec<f32>,
}

impl CausalLm {
    pub fn load(model_dir: &Path, model_file: &Path) -> Result<Self> {
        anyhow::ensure!(
            model_file.exists(),
            "ONNX model not found at {:?}. Run download_model() first.",
            model_file
        );

        let raw = std::fs::read_to_string(model_dir.join("config.json"))
            .context("Failed to read config.json")?;
        let lm_config: LmConfig =
            serde_json::from_str(&raw).context("Failed to parse config.json")?;

        let tokenizer = tokenizers::Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_file)
            .context("Failed to load ONNX model")?;

        let kv_heads = lm_config
            .num_key_value_heads
            .unwrap_or(lm_config.num_attention_heads);
        let head_dim = lm_config
            .head_dim
            .unwrap_or(lm_config.hidden_size / lm_config.num_attention_heads);

        let mut eos_ids = lm_config
            .eos_token_id
            .map(TokenIds::into_vec)
            .unwrap_or_default();
        if eos_ids.is_empty() {
            eos_ids.extend(
                ["<|end_of_text|>", "<|eot_id|>", "</s>"]
                    .iter()
                    .filter_map(|t| tokenizer.token_to_id(t)),
            );
        }

        tracing::info!(
            layers = lm_config.num_hidden_layers,
            kv_heads,
            head_dim,
            "loaded causal LM"
        );

        Ok(Self {
            session,
            tokenizer,
            layers: lm_config.num_hidden_layers,
            kv_heads,
            head_dim,
            eos_ids,
        })
    }

    /// Generate a continuation and decode prompt + continuation, skipping special tokens.
    pub fn generate(&mut self, prompt: &str, gen: &GenerationConfig) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        anyhow::ensure!(!tokens.is_empty(), "prompt produced no tokens");

        let mut sampler = Sampler::new(gen.temperature, gen.top_p, gen.seed);
        let mut cache: Vec<KvEntry> = (0..self.layers * 2)
            .map(|_| KvEntry { seq: 0, data: Vec::new() })
            .collect();
        let mut pending: Vec<u32> = tokens.clone();

        for _ in 0..gen.max_new_tokens {
            let next = self.step(&pending, tokens.len(), &mut cache, &mut sampler)?;
            tokens.push(next);
            if self.eos_ids.contains(&next) {
                break;
            }
            pending = vec![next];
        }

        self.tokenizer
            .decode(&tokens, true)
            .map_err(|e| anyhow::anyhow!("Decoding failed: {}", e))
    }

    /// Run one forward pass over `pending` (the last tokens of a sequence of
    /// `total` tokens) and sample the next token id.
    fn step(
        &mut self,
        pending: &[u32],
        total: usize,
        cache: &mut [KvEntry],
        sampler: &mut Sampler,
    ) -> Result<u32> {
        let seq = pending.len();
        let past = total - seq;

        let ids: Vec<i64> = pending.iter().map(|&t| t as i64).collect();
        let positions: Vec<i64> = (past..total).map(|p| p as i64).collect();
        let mask = vec![1i64; total];

        let mut inputs: Vec<(String, DynValue)> = vec![
            (
                "input_ids".to_string(),
                Tensor::from_array(([1usize, seq], ids.into_boxed_slice()))
                    .context("Failed to create input_ids tensor")?
                    .into_dyn(),
            ),
            (
                "attention_mask".to_string(),
                Tensor::from_array(([1usize, total], mask.into_boxed_slice()))
                    .context("Failed to create attention_mask tensor")?
                    .into_dyn(),
            ),
            (
                "position_ids".to_string(),
                Tensor::from_array(([1usize, seq], positions.into_boxed_slice()))
                    .context("Failed to create position_ids tensor")?
                    .into_dyn(),
            ),
        ];
        for layer in 0..self.layers {
            for (slot, kind) in ["key", "value"].iter().enumerate() {
                let entry = &cache[layer * 2 + slot];
                let shape = [1usize, self.kv_heads, entry.seq, self.head_dim];
                let tensor = Tensor::from_array((shape, entry.data.clone().into_boxed_slice()))
                    .context("Failed to create past_key_values tensor")?;
                inputs.push((format!("past_key_values.{}.{}", layer, kind), tensor.into_dyn()));
            }
        }

        let outputs = self.session.run(inputs).context("ONNX inference failed")?;

        let (shape, logits) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .context("Failed to extract logits")?;
        anyhow::ensure!(shape.len() == 3, "Unexpected logits shape: {:?}", shape);
        let vocab = shape[2] as usize;
        let last_row = &logits[logits.len() - vocab..];
        let next = sampler.sample(last_row) as u32;

        for layer in 0..self.layers {
            for (slot, kind) in ["key", "value"].iter().enumerate() {
                let name = format!("present.{}.{}", layer, kind);
                let (shape, data) = outputs[name.as_str()]
                    .try_extract_tensor::<f32>()
                    .with_context(|| format!("Failed to extract {}", name))?;
                anyhow::ensure!(shape.len() == 4, "Unexpected {} shape: {:?}", name, shape);
                cache[layer * 2 + slot] = KvEntry {
                    seq: shape[2] as usize,
                    data: data.to_vec(),
                };
            }
        }

        Ok(next)
    }
}
