use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5;
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::inference::{GenerationConfig, SummarizationEngine};

// T5 treats summarization as a prefixed text-to-text task.
const TASK_PREFIX: &str = "summarize: ";
// Encoder positional capacity of the t5-small checkpoint; longer inputs are
// truncated at the token level.
const MAX_INPUT_TOKENS: usize = 512;

// Taken from
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/t5/main.rs
pub struct SummaryPipeline {
    model: t5::T5ForConditionalGeneration,
    device: Device,
    tokenizer: Tokenizer,
    logits_processor: LogitsProcessor,
    eos_suppress: Tensor,
    config: t5::Config,
    gen_config: GenerationConfig,
}

impl Clone for SummaryPipeline {
    fn clone(&self) -> SummaryPipeline {
        SummaryPipeline {
            model: self.model.clone(),
            device: self.device.clone(),
            tokenizer: self.tokenizer.clone(),
            logits_processor: LogitsProcessor::new(
                self.gen_config.seed,
                self.gen_config.temperature,
                self.gen_config.top_p,
            ),
            eos_suppress: self.eos_suppress.clone(),
            config: self.config.clone(),
            gen_config: self.gen_config,
        }
    }
}

impl SummaryPipeline {
    pub fn with_safetensors(
        repo_id: &str,
        revision: &str,
        gen_config: GenerationConfig,
    ) -> Result<SummaryPipeline> {
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        let config_file = repo.get("config.json")?;
        let tokenizer_file = repo.get("tokenizer.json")?;
        let weights_file = repo.get("model.safetensors")?;

        let device = Device::Cpu;
        let config: t5::Config = serde_json::from_str(&std::fs::read_to_string(config_file)?)?;
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, &device)? };
        let model = t5::T5ForConditionalGeneration::load(vb, &config)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file)
            .map_err(|err| anyhow!("Cannot load tokenizer: {err}"))?;

        // Added to the raw logits while the output is still below min_length,
        // pinning the end-of-sequence token at -inf.
        let mut mask = vec![0f32; config.vocab_size];
        mask[config.eos_token_id] = f32::NEG_INFINITY;
        let eos_suppress = Tensor::new(mask.as_slice(), &device)?;

        let logits_processor =
            LogitsProcessor::new(gen_config.seed, gen_config.temperature, gen_config.top_p);

        Ok(SummaryPipeline {
            model,
            device,
            tokenizer,
            logits_processor,
            eos_suppress,
            config,
            gen_config,
        })
    }

    pub fn generate(
        &mut self,
        text: &str,
        max_length: usize,
        min_length: usize,
    ) -> Result<(String, f64)> {
        self.model.clear_kv_cache();

        let prompt = format!("{TASK_PREFIX}{text}");
        let mut input_ids = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|err| anyhow!("Cannot encode input: {err}"))?
            .get_ids()
            .to_vec();
        if input_ids.is_empty() {
            bail!("Input is empty");
        }
        input_ids.truncate(MAX_INPUT_TOKENS);

        let input = Tensor::new(input_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input)?;

        let start_token = self
            .config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32;
        let mut output_token_ids = vec![start_token];

        let start_gen = Instant::now();
        for index in 0..max_length {
            let decoder_tokens = if index == 0 || !self.config.use_cache {
                Tensor::new(output_token_ids.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last_token = *output_token_ids.last().unwrap();
                Tensor::new(&[last_token], &self.device)?.unsqueeze(0)?
            };
            let logits = self
                .model
                .decode(&decoder_tokens, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            let logits = if (self.gen_config.repeat_penalty - 1.).abs() < f32::EPSILON {
                logits
            } else {
                let start_at = output_token_ids
                    .len()
                    .saturating_sub(self.gen_config.repeat_context_size);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.gen_config.repeat_penalty,
                    &output_token_ids[start_at..],
                )?
            };
            // output_token_ids holds the decoder start token plus everything
            // generated so far.
            let logits = if output_token_ids.len() <= min_length {
                logits.broadcast_add(&self.eos_suppress)?
            } else {
                logits
            };

            let next_token = self.logits_processor.sample(&logits)?;
            if next_token as usize == self.config.eos_token_id {
                break;
            }
            output_token_ids.push(next_token);
        }
        let inference_time = start_gen.elapsed().as_secs_f64();

        let summary = self
            .tokenizer
            .decode(&output_token_ids[1..], true)
            .map_err(|err| anyhow!("Cannot decode tokens: {err}"))?;

        Ok((summary.trim().to_string(), inference_time))
    }
}

pub struct T5SummaryModel {
    pipeline: SummaryPipeline,
}

impl T5SummaryModel {
    pub fn new(repo_id: &str, revision: &str, gen_config: GenerationConfig) -> Result<Self> {
        let pipeline = SummaryPipeline::with_safetensors(repo_id, revision, gen_config)?;
        Ok(T5SummaryModel { pipeline })
    }
}

impl SummarizationEngine for T5SummaryModel {
    fn summarize(
        &self,
        text: &str,
        max_length: usize,
        min_length: usize,
        deterministic: bool,
    ) -> Result<String> {
        // Each call runs on its own clone of the pipeline so concurrent
        // requests never share decoder state; the handle itself is never
        // mutated after startup.
        let mut pipeline = self.pipeline.clone();
        if deterministic {
            pipeline.logits_processor = LogitsProcessor::new(pipeline.gen_config.seed, None, None);
        }

        let (summary, inference_time) = pipeline.generate(text, max_length, min_length)?;
        debug!(
            "summarized {} chars in {inference_time:.2}s",
            text.chars().count()
        );
        Ok(summary)
    }
}
