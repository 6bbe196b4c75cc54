//! In-process Moondream vision-language model via candle.
//!
//! Weights and tokenizer come from a local directory when `model_path` names
//! one, otherwise from the HuggingFace cache (downloaded on first use).

use crate::backend::{GenerationOptions, InferenceBackend};
use crate::error::{DrishtiError, Result};
use crate::frame::Frame;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::moondream::{Config as MoondreamConfig, Model};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

const HF_REPO: &str = "vikhyatk/moondream2";
/// Revision whose weights match `Config::v2()`.
const HF_REVISION: &str = "2024-03-06";
const WEIGHTS_FILENAME: &str = "model.safetensors";
const TOKENIZER_FILENAME: &str = "tokenizer.json";
/// Side length the vision encoder expects.
const IMAGE_SIZE: u32 = 378;
const END_OF_TEXT: &str = "<|endoftext|>";
const SAMPLING_SEED: u64 = 299792458;

fn model_err(context: &str) -> impl Fn(candle_core::Error) -> DrishtiError + '_ {
    move |e| DrishtiError::Backend {
        message: format!("{context}: {e}"),
    }
}

struct Loaded {
    model: Model,
    tokenizer: Tokenizer,
    device: Device,
    end_of_text: u32,
}

/// Moondream backend. Inference runs on a blocking thread.
pub struct MoondreamBackend {
    inner: Arc<Mutex<Loaded>>,
    options: GenerationOptions,
    name: String,
}

impl MoondreamBackend {
    /// Load weights and tokenizer. Blocking; call off the async runtime.
    pub fn load(model_path: &str, options: GenerationOptions) -> Result<Self> {
        let device = Device::Cpu;
        let (weights, tokenizer_path) = resolve_files(model_path)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            DrishtiError::Backend {
                message: format!("Load tokenizer {}: {e}", tokenizer_path.display()),
            }
        })?;
        let end_of_text = tokenizer
            .get_vocab(true)
            .get(END_OF_TEXT)
            .copied()
            .ok_or_else(|| DrishtiError::Backend {
                message: format!("Tokenizer has no {END_OF_TEXT} token"),
            })?;

        let config = MoondreamConfig::v2();
        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&weights], DType::F32, &device) }
            .map_err(model_err("Map weights"))?;
        let model = Model::new(&config, vb).map_err(model_err("Build Moondream model"))?;

        tracing::info!(weights = %weights.display(), "Moondream model loaded");

        Ok(Self {
            inner: Arc::new(Mutex::new(Loaded {
                model,
                tokenizer,
                device,
                end_of_text,
            })),
            options,
            name: format!("moondream ({})", model_path),
        })
    }
}

/// Find weights and tokenizer locally or in the hub cache.
fn resolve_files(model_path: &str) -> Result<(PathBuf, PathBuf)> {
    let local = Path::new(model_path);
    if local.is_dir() {
        let weights = local.join(WEIGHTS_FILENAME);
        let tokenizer = local.join(TOKENIZER_FILENAME);
        if !weights.exists() {
            return Err(DrishtiError::ModelNotFound {
                path: weights.display().to_string(),
            });
        }
        return Ok((weights, tokenizer));
    }

    let api = Api::new().map_err(|e| DrishtiError::Backend {
        message: format!("HF Hub API init: {e}"),
    })?;
    let repo = api.repo(Repo::with_revision(
        HF_REPO.to_string(),
        RepoType::Model,
        HF_REVISION.to_string(),
    ));
    let weights = repo.get(WEIGHTS_FILENAME).map_err(|e| DrishtiError::ModelNotFound {
        path: format!("{HF_REPO}/{WEIGHTS_FILENAME}: {e}"),
    })?;
    let tokenizer = repo.get(TOKENIZER_FILENAME).map_err(|e| DrishtiError::ModelNotFound {
        path: format!("{HF_REPO}/{TOKENIZER_FILENAME}: {e}"),
    })?;
    Ok((weights, tokenizer))
}

/// Question-answer template the model was tuned on.
fn moondream_prompt(prompt: &str) -> String {
    format!("\n\nQuestion: {prompt}\n\nAnswer:")
}

/// Resize to the encoder's square input and normalise to [-1, 1], CHW.
fn image_tensor(frame: &Frame, device: &Device) -> Result<Tensor> {
    let rgb = frame.to_rgb_image()?;
    let resized = DynamicImage::ImageRgb8(rgb)
        .resize_to_fill(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
        .to_rgb8();
    let side = IMAGE_SIZE as usize;
    let data = Tensor::from_vec(resized.into_raw(), (side, side, 3), device)
        .map_err(model_err("Image tensor"))?
        .permute((2, 0, 1))
        .map_err(model_err("Permute image"))?;
    let half = Tensor::new(&[0.5f32, 0.5, 0.5], device)
        .and_then(|t| t.reshape((3, 1, 1)))
        .map_err(model_err("Normalisation constants"))?;
    (data.to_dtype(DType::F32).map_err(model_err("Image dtype"))? / 255.)
        .and_then(|t| t.broadcast_sub(&half))
        .and_then(|t| t.broadcast_div(&half))
        .map_err(model_err("Normalise image"))
}

impl Loaded {
    fn generate(
        &mut self,
        frame: &Frame,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        self.model.text_model.clear_kv_cache();

        let image = image_tensor(frame, &self.device)?
            .unsqueeze(0)
            .map_err(model_err("Batch image"))?;
        let image_embeds = image
            .apply(&self.model.vision_encoder)
            .map_err(model_err("Vision encoder"))?;

        let encoding = self
            .tokenizer
            .encode(moondream_prompt(prompt), true)
            .map_err(|e| DrishtiError::Backend {
                message: format!("Tokenize: {e}"),
            })?;
        let mut tokens: Vec<u32> = encoding.get_ids().to_vec();
        let prompt_len = tokens.len();

        let temperature = (options.temperature > 0.0).then_some(f64::from(options.temperature));
        let mut sampler = LogitsProcessor::new(SAMPLING_SEED, temperature, None);
        let bos = Tensor::new(&[self.end_of_text], &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(model_err("BOS tensor"))?;

        for index in 0..options.n_predict.max(1) as usize {
            let context = if index > 0 { 1 } else { tokens.len() };
            let start = tokens.len().saturating_sub(context);
            let input = Tensor::new(&tokens[start..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(model_err("Input tensor"))?;

            let logits = if index > 0 {
                self.model.text_model.forward(&input)
            } else {
                self.model
                    .text_model
                    .forward_with_img(&bos, &input, &image_embeds)
            }
            .map_err(model_err("Text model forward"))?;

            let logits = logits
                .squeeze(0)
                .and_then(|t| t.to_dtype(DType::F32))
                .map_err(model_err("Logits"))?;
            let next = sampler.sample(&logits).map_err(model_err("Sample"))?;
            if next == self.end_of_text {
                break;
            }
            tokens.push(next);
        }

        self.tokenizer
            .decode(&tokens[prompt_len..], true)
            .map(|text| text.trim().to_string())
            .map_err(|e| DrishtiError::Backend {
                message: format!("Detokenize: {e}"),
            })
    }
}

#[async_trait::async_trait]
impl InferenceBackend for MoondreamBackend {
    async fn infer(&self, frame: &Frame, prompt: &str) -> Result<String> {
        self.infer_with(frame, prompt, self.options).await
    }

    async fn infer_with(
        &self,
        frame: &Frame,
        prompt: &str,
        options: GenerationOptions,
    ) -> Result<String> {
        let inner = Arc::clone(&self.inner);
        let frame = frame.clone();
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || {
            let mut loaded = inner.lock().unwrap_or_else(|e| e.into_inner());
            loaded.generate(&frame, &prompt, options)
        })
        .await
        .map_err(|e| DrishtiError::Backend {
            message: format!("Inference task failed: {e}"),
        })?
    }

    async fn reset(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .model
                .text_model
                .clear_kv_cache();
        })
        .await
        .map_err(|e| DrishtiError::Backend {
            message: format!("Reset task failed: {e}"),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
