//! The decoding controller.
//!
//! Drives the autoregressive loop: prefill, warp, sample, append, check
//! stop, repeat. The predictor call is the only suspension point; all
//! warper and sampler work is synchronous and CPU-bound. One `Generator`
//! can serve concurrent sessions since every call owns its token sequence
//! and its RNG.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_stream::try_stream;
use futures_core::stream::Stream;
use futures_util::TryStreamExt;
use log::{debug, info};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::common::{
    CancellationToken, DecodingStrategy, GenerationConfig, GenerationError, GenerationResult,
};
use crate::sampler::sample_token;
use crate::traits::{NextTokenPredictor, Tokenizer};
use crate::warpers::{apply_pipeline, pipeline_for};

use super::types::{GenerationOutput, Phase, StopReason, StreamedToken, TokenType};

/// Orchestrates autoregressive text generation.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use spuni::{GenerationConfig, Generator, NextTokenPredictor, Tokenizer};
///
/// # async fn example(
/// #     predictor: Arc<dyn NextTokenPredictor>,
/// #     tokenizer: Arc<dyn Tokenizer>,
/// # ) -> anyhow::Result<()> {
/// let generator = Generator::new(predictor, tokenizer);
/// let config = GenerationConfig {
///     max_new_tokens: 50,
///     ..Default::default()
/// };
/// let output = generator.generate("Rust is", &config).await?;
/// println!("{}", output.text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Generator {
    predictor: Arc<dyn NextTokenPredictor>,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Generator {
    pub fn new(predictor: Arc<dyn NextTokenPredictor>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            predictor,
            tokenizer,
        }
    }

    /// Generates a completion for `prompt` and returns the full output.
    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> GenerationResult<GenerationOutput> {
        let tokens = self.encode(prompt)?;
        self.decode_loop(tokens, config, &CancellationToken::never(), |_, _| {})
            .await
    }

    /// Like [`Generator::generate`], but stops cleanly when `cancel` fires,
    /// returning the tokens generated so far.
    pub async fn generate_cancellable(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        cancel: CancellationToken,
    ) -> GenerationResult<GenerationOutput> {
        let tokens = self.encode(prompt)?;
        self.decode_loop(tokens, config, &cancel, |_, _| {}).await
    }

    /// Generates with a synchronous streaming callback.
    ///
    /// The callback fires once per generated token, never batched, with the
    /// *cumulative* decoded text. On a mid-generation predictor failure the
    /// call returns an error, but the callback has already observed every
    /// token produced before the failure.
    pub async fn generate_with_callback(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        cancel: CancellationToken,
        mut on_text: impl FnMut(&str),
    ) -> GenerationResult<GenerationOutput> {
        let tokens = self.encode(prompt)?;
        self.decode_loop(tokens, config, &cancel, |_, text| on_text(text))
            .await
    }

    /// Generates from an already-encoded prompt, skipping tokenization.
    pub async fn generate_from_tokens(
        &self,
        tokens: Vec<u32>,
        config: &GenerationConfig,
        cancel: CancellationToken,
    ) -> GenerationResult<GenerationOutput> {
        self.decode_loop(tokens, config, &cancel, |_, _| {}).await
    }

    /// Generates a stream of tokens.
    ///
    /// The stream first echoes the prompt tokens, then yields each generated
    /// token as it is produced. A predictor failure surfaces as the final
    /// `Err` item after every earlier token has been yielded.
    ///
    /// # Example
    /// ```no_run
    /// use futures_util::StreamExt;
    /// # async fn example(
    /// #     generator: spuni::Generator,
    /// #     config: spuni::GenerationConfig,
    /// # ) -> anyhow::Result<()> {
    /// let stream = generator.generate_stream("Once upon a time", &config, None).await?;
    /// futures_util::pin_mut!(stream);
    /// while let Some(token) = stream.next().await {
    ///     print!("{}", token?.text);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        cancel: Option<CancellationToken>,
    ) -> GenerationResult<impl Stream<Item = GenerationResult<StreamedToken>>> {
        config.validate()?;

        let prompt_tokens = self.encode(prompt)?;
        let cancel = cancel.unwrap_or_default();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let this = self.clone();
        let config = config.clone();
        let loop_tokens = prompt_tokens.clone();
        tokio::spawn(async move {
            let result = this
                .decode_loop(loop_tokens, &config, &cancel, |token, _| {
                    let _ = tx.send(Ok(token));
                })
                .await;
            if let Err(e) = result {
                let _ = tx.send(Err(e));
            }
            // tx drops here, terminating the stream.
        });

        let tokenizer = self.tokenizer.clone();
        Ok(try_stream! {
            for &id in &prompt_tokens {
                let text = tokenizer
                    .decode(&[id])
                    .map_err(|e| GenerationError::Tokenization { source: e })?;
                yield StreamedToken {
                    text,
                    id,
                    token_type: TokenType::Prompt,
                };
            }
            while let Some(item) = rx.recv().await {
                yield item?;
            }
        })
    }

    /// Convenience wrapper collecting [`Generator::generate_stream`] into a
    /// single string (prompt echo included).
    pub async fn generate_text(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> GenerationResult<String> {
        let stream = self.generate_stream(prompt, config, None).await?;
        let tokens: Vec<StreamedToken> = stream.try_collect().await?;
        Ok(tokens.iter().map(|t| t.text.as_str()).collect())
    }

    // ------------------------------------------------------------------
    // Core loop
    // ------------------------------------------------------------------

    /// The decoding state machine: `Prefill -> Decode -> Stopped`.
    ///
    /// `on_step` fires once per generated token with the newly decoded
    /// suffix and the cumulative generated text.
    async fn decode_loop(
        &self,
        mut tokens: Vec<u32>,
        config: &GenerationConfig,
        cancel: &CancellationToken,
        mut on_step: impl FnMut(StreamedToken, &str),
    ) -> GenerationResult<GenerationOutput> {
        config.validate()?;

        let prompt_len = tokens.len();
        let mut rng = match &config.strategy {
            DecodingStrategy::Sample(params) => match params.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            DecodingStrategy::Greedy => StdRng::from_entropy(),
        };

        let finished = |tokens: Vec<u32>, stop_reason| GenerationOutput {
            tokens,
            text: String::new(),
            generated: 0,
            stop_reason,
        };

        // Nothing to generate: don't burn a prefill call.
        if config.max_new_tokens == 0 {
            return Ok(finished(tokens, StopReason::MaxNewTokens));
        }
        if let Some(max_length) = config.max_length {
            if prompt_len >= max_length {
                return Ok(finished(tokens, StopReason::MaxLength));
            }
        }
        if cancel.is_cancelled() {
            return Ok(finished(tokens, StopReason::Cancelled));
        }

        let mut phase = Phase::Prefill;
        debug!("session phase: {:?}, {} prompt tokens", phase, prompt_len);

        let t_prefill = Instant::now();
        let mut next_logits = self.predict(&tokens).await?;
        info!(
            "prefill complete in {:.2}ms",
            t_prefill.elapsed().as_secs_f64() * 1000.0
        );

        phase = Phase::Decode;
        debug!("session phase: {:?}", phase);

        let warpers = pipeline_for(config);
        let mut generated = 0usize;
        let mut text = String::new();
        // Explicit step state for streaming: byte length of the text already
        // emitted, threaded through the loop instead of captured elsewhere.
        let mut emitted_len = 0usize;

        let mut total_sampling_time = Duration::ZERO;
        let mut total_predict_time = Duration::ZERO;
        let generation_start = Instant::now();

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let t_sampling = Instant::now();
            let warped = apply_pipeline(&warpers, &tokens, next_logits);
            let next_token = sample_token(&warped, &config.strategy, &mut rng)
                .map_err(|e| GenerationError::Prediction { source: e })?;
            total_sampling_time += t_sampling.elapsed();

            tokens.push(next_token);
            generated += 1;

            text = self.decode(&tokens[prompt_len..])?;
            let delta = if text.len() >= emitted_len && text.is_char_boundary(emitted_len) {
                text[emitted_len..].to_string()
            } else {
                // A late token rewrote earlier text; re-emit everything.
                text.clone()
            };
            emitted_len = text.len();
            on_step(
                StreamedToken {
                    text: delta,
                    id: next_token,
                    token_type: TokenType::Generated,
                },
                &text,
            );

            // EOS is appended first, then stops the loop.
            if config.eos_token_id == Some(next_token) {
                debug!("eos token {} generated, stopping", next_token);
                break StopReason::EosToken;
            }
            if generated >= config.max_new_tokens {
                break StopReason::MaxNewTokens;
            }
            if let Some(max_length) = config.max_length {
                if tokens.len() >= max_length {
                    info!("generation reached max length ({})", max_length);
                    break StopReason::MaxLength;
                }
            }

            let t_predict = Instant::now();
            next_logits = self.predict(&tokens).await?;
            total_predict_time += t_predict.elapsed();
        };

        phase = Phase::Stopped(stop_reason);
        debug!("session phase: {:?}", phase);

        let total_time = generation_start.elapsed();
        if generated > 0 && total_time.as_secs_f64() > 0.0 {
            info!(
                "generated {} tokens in {:.3}s ({:.2} tok/s; sampling {:?}, predictor {:?})",
                generated,
                total_time.as_secs_f64(),
                generated as f64 / total_time.as_secs_f64(),
                total_sampling_time / generated as u32,
                total_predict_time / generated.max(1) as u32,
            );
        }

        Ok(GenerationOutput {
            tokens,
            text,
            generated,
            stop_reason,
        })
    }

    // ------------------------------------------------------------------
    // Collaborator plumbing
    // ------------------------------------------------------------------

    fn encode(&self, prompt: &str) -> GenerationResult<Vec<u32>> {
        self.tokenizer
            .encode(prompt)
            .map_err(|e| GenerationError::Tokenization { source: e })
    }

    fn decode(&self, tokens: &[u32]) -> GenerationResult<String> {
        self.tokenizer
            .decode(tokens)
            .map_err(|e| GenerationError::Tokenization { source: e })
    }

    async fn predict(&self, tokens: &[u32]) -> GenerationResult<Array1<f32>> {
        let logits = self
            .predictor
            .predict(tokens)
            .await
            .map_err(|e| GenerationError::Prediction { source: e })?;

        let vocab_size = self.predictor.vocab_size();
        if logits.len() != vocab_size {
            return Err(GenerationError::Prediction {
                source: anyhow!(
                    "predictor returned {} logits, expected vocab size {}",
                    logits.len(),
                    vocab_size
                ),
            });
        }
        Ok(logits)
    }
}
