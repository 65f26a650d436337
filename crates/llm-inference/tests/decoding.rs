use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView1};
use stablegen_llm::{
    generate, generate_detailed, Checkpoint, GenerateError, GenerationParams, ModelConfig,
    MultinomialSampler, Sampler, Scorer, StopReason, WindowPolicy,
};
use std::collections::VecDeque;

/// Returns the same logits for every position and records each context it sees.
struct FixedScorer {
    logits: Array1<f32>,
    contexts: Vec<Vec<usize>>,
}

impl FixedScorer {
    fn uniform(vocab: usize) -> Self {
        Self::new(vec![0.0; vocab])
    }

    fn new(logits: Vec<f32>) -> Self {
        Self {
            logits: Array1::from(logits),
            contexts: Vec::new(),
        }
    }
}

impl Scorer for FixedScorer {
    fn vocab_size(&self) -> usize {
        self.logits.len()
    }

    fn forward(&mut self, context: &[usize]) -> Result<Array2<f32>> {
        self.contexts.push(context.to_vec());
        let rows = context.len();
        let mut out = Array2::zeros((rows, self.logits.len()));
        for mut row in out.rows_mut() {
            row.assign(&self.logits);
        }
        Ok(out)
    }
}

/// Plays back a fixed list of token ids, repeating the last one.
struct ScriptedSampler {
    script: VecDeque<usize>,
    last: usize,
    seen: Vec<Array1<f32>>,
}

impl ScriptedSampler {
    fn new(script: &[usize]) -> Self {
        Self {
            script: script.iter().copied().collect(),
            last: *script.last().unwrap_or(&0),
            seen: Vec::new(),
        }
    }
}

impl Sampler for ScriptedSampler {
    fn sample(&mut self, probs: ArrayView1<'_, f32>) -> usize {
        self.seen.push(probs.to_owned());
        match self.script.pop_front() {
            Some(token) => token,
            None => self.last,
        }
    }
}

#[test]
fn worked_example_appends_sampled_tokens() -> Result<()> {
    let mut scorer = FixedScorer::uniform(16);
    let mut sampler = ScriptedSampler::new(&[7]);
    let params = GenerationParams::new(2, 10);

    let out = generate(&mut scorer, &mut sampler, &[5, 9, 2], &params)?;
    assert_eq!(out, vec![5, 9, 2, 7, 7]);
    assert_eq!(scorer.contexts, vec![vec![5, 9, 2], vec![5, 9, 2, 7]]);
    Ok(())
}

#[test]
fn scripted_sampler_makes_output_deterministic() -> Result<()> {
    let script = [3, 1, 4, 1, 5, 9, 2, 6];
    let params = GenerationParams::new(8, 64).with_top_k(Some(4));

    let first = generate(
        &mut FixedScorer::uniform(10),
        &mut ScriptedSampler::new(&script),
        &[0, 0],
        &params,
    )?;
    let second = generate(
        &mut FixedScorer::uniform(10),
        &mut ScriptedSampler::new(&script),
        &[0, 0],
        &params,
    )?;
    assert_eq!(first, second);
    assert_eq!(&first[2..], &script);
    Ok(())
}

#[test]
fn output_length_and_prefix_hold_without_eos() -> Result<()> {
    let prompts: [&[usize]; 3] = [&[1], &[4, 2], &[9, 8, 7, 6, 5]];
    for prompt in prompts {
        for max_new in [0usize, 1, 3, 12] {
            let mut sampler = MultinomialSampler::seeded(17);
            let params = GenerationParams::new(max_new, 4).with_temperature(0.7);
            let out = generate(&mut FixedScorer::uniform(10), &mut sampler, prompt, &params)?;
            assert_eq!(out.len(), prompt.len() + max_new);
            assert_eq!(&out[..prompt.len()], prompt);
        }
    }
    Ok(())
}

#[test]
fn eos_truncates_and_is_kept() -> Result<()> {
    let prompt = [4, 4, 4];
    let eos = 2;
    // EOS at absolute position k = 5.
    let mut sampler = ScriptedSampler::new(&[6, 7, eos, 8]);
    let params = GenerationParams::new(10, 32).with_eos_id(Some(eos));

    let generation = generate_detailed(&mut FixedScorer::uniform(10), &mut sampler, &prompt, &params)?;
    assert_eq!(generation.tokens, vec![4, 4, 4, 6, 7, eos]);
    assert_eq!(generation.tokens.len(), 5 + 1);
    assert_eq!(generation.stop_reason, StopReason::Eos);
    Ok(())
}

#[test]
fn eos_never_sampled_runs_to_the_budget() -> Result<()> {
    let params = GenerationParams::new(4, 32).with_eos_id(Some(2));
    let generation = generate_detailed(
        &mut FixedScorer::uniform(10),
        &mut ScriptedSampler::new(&[5]),
        &[1],
        &params,
    )?;
    assert_eq!(generation.tokens, vec![1, 5, 5, 5, 5]);
    assert_eq!(generation.stop_reason, StopReason::MaxNewTokens);
    Ok(())
}

#[test]
fn top_k_leaves_only_the_highest_logits_eligible() -> Result<()> {
    let mut scorer = FixedScorer::new(vec![0.1, 2.0, -1.0, 3.5, 0.7, 2.5]);
    let mut sampler = ScriptedSampler::new(&[3]);
    let params = GenerationParams::new(1, 8).with_top_k(Some(3));
    generate(&mut scorer, &mut sampler, &[0], &params)?;

    let probs = &sampler.seen[0];
    let eligible: Vec<usize> = (0..probs.len()).filter(|&i| probs[i] > 0.0).collect();
    assert_eq!(eligible, vec![1, 3, 5]);
    assert!((probs.sum() - 1.0).abs() < 1e-5);
    Ok(())
}

#[test]
fn top_k_above_vocab_size_is_clamped() -> Result<()> {
    let mut sampler = ScriptedSampler::new(&[0]);
    let params = GenerationParams::new(1, 8).with_top_k(Some(1000));
    generate(&mut FixedScorer::new(vec![1.0, 2.0, 3.0]), &mut sampler, &[0], &params)?;
    assert!(sampler.seen[0].iter().all(|p| *p > 0.0));
    Ok(())
}

#[test]
fn low_temperature_converges_to_argmax() -> Result<()> {
    let logits = vec![0.3, 1.2, 0.9, 1.1];
    let mut sampler = MultinomialSampler::seeded(1234);
    let params = GenerationParams::new(200, 512).with_temperature(1e-3);

    let out = generate(&mut FixedScorer::new(logits), &mut sampler, &[0], &params)?;
    assert!(out[1..].iter().all(|&t| t == 1));
    Ok(())
}

#[test]
fn long_prompt_is_cropped_from_the_first_step() -> Result<()> {
    let prompt: Vec<usize> = (0..10).collect();
    let mut scorer = FixedScorer::uniform(16);
    let params = GenerationParams::new(5, 4);
    let out = generate(&mut scorer, &mut ScriptedSampler::new(&[11, 12, 13, 14, 15]), &prompt, &params)?;

    assert_eq!(out.len(), 15);
    assert!(scorer.contexts.iter().all(|c| c.len() <= 4));
    assert_eq!(scorer.contexts[0], vec![6, 7, 8, 9]);
    assert_eq!(scorer.contexts[3], vec![9, 11, 12, 13]);
    assert_eq!(scorer.contexts[4], vec![11, 12, 13, 14]);
    Ok(())
}

#[test]
fn short_prompt_window_slides_once_generation_outgrows_it() -> Result<()> {
    let mut scorer = FixedScorer::uniform(8);
    let params = GenerationParams::new(6, 3);
    generate(&mut scorer, &mut MultinomialSampler::seeded(3), &[1, 2], &params)?;

    let lengths: Vec<usize> = scorer.contexts.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![2, 3, 3, 3, 3, 3]);
    Ok(())
}

#[test]
fn prompt_length_policy_keeps_growing_context() -> Result<()> {
    let mut scorer = FixedScorer::uniform(8);
    let params = GenerationParams::new(4, 3).with_window(WindowPolicy::PromptLength);
    generate(&mut scorer, &mut MultinomialSampler::seeded(3), &[1, 2], &params)?;

    let lengths: Vec<usize> = scorer.contexts.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![2, 3, 4, 5]);
    Ok(())
}

#[test]
fn zero_new_tokens_returns_prompt_without_scoring() -> Result<()> {
    let mut scorer = FixedScorer::uniform(8);
    let out = generate(
        &mut scorer,
        &mut ScriptedSampler::new(&[1]),
        &[3, 1, 4],
        &GenerationParams::new(0, 8),
    )?;
    assert_eq!(out, vec![3, 1, 4]);
    assert!(scorer.contexts.is_empty());
    Ok(())
}

struct FailingScorer;

impl Scorer for FailingScorer {
    fn vocab_size(&self) -> usize {
        4
    }

    fn forward(&mut self, _context: &[usize]) -> Result<Array2<f32>> {
        bail!("out of memory")
    }
}

#[test]
fn scorer_failures_propagate() {
    let err = generate(
        &mut FailingScorer,
        &mut ScriptedSampler::new(&[0]),
        &[1],
        &GenerationParams::new(3, 8),
    )
    .unwrap_err();
    assert!(matches!(err, GenerateError::Scorer(_)));
    assert!(err.to_string().contains("out of memory"));
}

#[test]
fn nan_logits_are_reported_not_sampled() {
    let mut scorer = FixedScorer::new(vec![f32::NAN, 1.0, 2.0]);
    let err = generate(
        &mut scorer,
        &mut MultinomialSampler::seeded(1),
        &[1],
        &GenerationParams::new(3, 8),
    )
    .unwrap_err();
    assert!(matches!(err, GenerateError::DegenerateDistribution { position: 1 }));
}

#[test]
fn fully_masked_logits_are_reported_not_sampled() {
    let mut scorer = FixedScorer::new(vec![f32::NEG_INFINITY; 3]);
    let mut sampler = ScriptedSampler::new(&[0]);
    let err = generate(&mut scorer, &mut sampler, &[1, 2], &GenerationParams::new(3, 8))
        .unwrap_err();
    assert!(matches!(err, GenerateError::DegenerateDistribution { position: 2 }));
    assert!(sampler.seen.is_empty());
}

struct OneRowScorer;

impl Scorer for OneRowScorer {
    fn vocab_size(&self) -> usize {
        4
    }

    fn forward(&mut self, _context: &[usize]) -> Result<Array2<f32>> {
        Ok(Array2::zeros((1, 4)))
    }
}

#[test]
fn wrongly_shaped_logits_are_rejected() {
    let err = generate(
        &mut OneRowScorer,
        &mut ScriptedSampler::new(&[0]),
        &[1, 2],
        &GenerationParams::new(1, 8),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GenerateError::LogitShape {
            rows: 2,
            vocab: 4,
            got: (1, 4)
        }
    ));
}

#[test]
fn reference_transformer_generates_reproducibly() -> Result<()> {
    let config = ModelConfig {
        block_size: 8,
        ..ModelConfig::tiny()
    };
    let (mut scorer, tokenizer) = Checkpoint::random(config, 21).into_parts()?;
    let prompt = tokenizer.encode("hello my name is");
    let params = GenerationParams::new(12, 8)
        .with_temperature(0.8)
        .with_top_k(Some(20));

    let a = generate(&mut scorer, &mut MultinomialSampler::seeded(1234), &prompt, &params)?;
    let b = generate(&mut scorer, &mut MultinomialSampler::seeded(1234), &prompt, &params)?;
    assert_eq!(a, b);
    assert_eq!(a.len(), prompt.len() + 12);
    assert!(a.iter().all(|&t| t < 128));
    Ok(())
}
