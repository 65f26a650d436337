//! Weight structures and safetensors loader.

use crate::config::ModelConfig;
use anyhow::{ensure, Context, Result};
use ndarray::{Array1, Array2};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct BlockWeights {
    // Attention
    pub q_proj: Array2<f32>,
    pub k_proj: Array2<f32>,
    pub v_proj: Array2<f32>,
    pub out_proj: Array2<f32>,

    // LayerNorm (pre-attention)
    pub ln1_weight: Array1<f32>,
    pub ln1_bias: Array1<f32>,

    // MLP
    pub mlp_up: Array2<f32>,
    pub mlp_down: Array2<f32>,

    // LayerNorm (pre-MLP)
    pub ln2_weight: Array1<f32>,
    pub ln2_bias: Array1<f32>,
}

#[derive(Debug, Clone)]
pub struct ModelWeights {
    pub token_embeddings: Array2<f32>, // (vocab_size, d_model)
    pub layers: Vec<BlockWeights>,
    pub final_ln_weight: Array1<f32>,
    pub final_ln_bias: Array1<f32>,
    pub lm_head: Array2<f32>, // (d_model, vocab_size)
}

impl ModelWeights {
    /// Load f32 weights from a safetensors file, checking every shape against `config`.
    ///
    /// Expected tensor naming: `token_embeddings`, `lm_head`, `final_ln.{weight,bias}`
    /// and `layers.{i}.{component}`.
    pub fn load_safetensors(path: impl AsRef<Path>, config: &ModelConfig) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("failed to read safetensors file {}", path.display()))?;
        let tensors = SafeTensors::deserialize(&data).context("failed to parse safetensors")?;

        let (v, d, f) = (config.vocab_size, config.d_model, config.d_ff);
        let matrix = |name: &str, shape: (usize, usize)| load_tensor_2d(&tensors, name, shape);
        let vector = |name: &str, len: usize| load_tensor_1d(&tensors, name, len);

        let mut layers = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            let prefix = format!("layers.{}", i);
            layers.push(BlockWeights {
                q_proj: matrix(&format!("{}.q_proj", prefix), (d, d))?,
                k_proj: matrix(&format!("{}.k_proj", prefix), (d, d))?,
                v_proj: matrix(&format!("{}.v_proj", prefix), (d, d))?,
                out_proj: matrix(&format!("{}.out_proj", prefix), (d, d))?,
                ln1_weight: vector(&format!("{}.ln1.weight", prefix), d)?,
                ln1_bias: vector(&format!("{}.ln1.bias", prefix), d)?,
                mlp_up: matrix(&format!("{}.mlp_up", prefix), (d, f))?,
                mlp_down: matrix(&format!("{}.mlp_down", prefix), (f, d))?,
                ln2_weight: vector(&format!("{}.ln2.weight", prefix), d)?,
                ln2_bias: vector(&format!("{}.ln2.bias", prefix), d)?,
            });
        }

        Ok(Self {
            token_embeddings: matrix("token_embeddings", (v, d))?,
            layers,
            final_ln_weight: vector("final_ln.weight", d)?,
            final_ln_bias: vector("final_ln.bias", d)?,
            lm_head: matrix("lm_head", (d, v))?,
        })
    }

    /// Small random weights for demos and tests (not for real inference).
    pub fn random(config: &ModelConfig, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut random_array = |shape: (usize, usize)| {
            Array2::from_shape_fn(shape, |_| (rng.f32() - 0.5) * 0.04)
        };
        let (v, d, f) = (config.vocab_size, config.d_model, config.d_ff);

        let token_embeddings = random_array((v, d));
        let lm_head = random_array((d, v));

        let layers = (0..config.n_layers)
            .map(|_| BlockWeights {
                q_proj: random_array((d, d)),
                k_proj: random_array((d, d)),
                v_proj: random_array((d, d)),
                out_proj: random_array((d, d)),
                ln1_weight: Array1::ones(d),
                ln1_bias: Array1::zeros(d),
                mlp_up: random_array((d, f)),
                mlp_down: random_array((f, d)),
                ln2_weight: Array1::ones(d),
                ln2_bias: Array1::zeros(d),
            })
            .collect();

        Self {
            token_embeddings,
            layers,
            final_ln_weight: Array1::ones(d),
            final_ln_bias: Array1::zeros(d),
            lm_head,
        }
    }

    /// Write every tensor as f32 little-endian under the names `load_safetensors` expects.
    pub fn save_safetensors(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let blobs = self.named_tensors();
        let views = blobs
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.as_str(), view))
                    .with_context(|| format!("failed to stage tensor '{}'", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let serialized = safetensors::serialize(views, &None).context("failed to serialize weights")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn named_tensors(&self) -> Vec<(String, Vec<usize>, Vec<u8>)> {
        fn entry<D: ndarray::Dimension>(
            name: String,
            array: &ndarray::Array<f32, D>,
        ) -> (String, Vec<usize>, Vec<u8>) {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name, array.shape().to_vec(), bytes)
        }

        let mut out = vec![
            entry("token_embeddings".into(), &self.token_embeddings),
            entry("lm_head".into(), &self.lm_head),
            entry("final_ln.weight".into(), &self.final_ln_weight),
            entry("final_ln.bias".into(), &self.final_ln_bias),
        ];
        for (i, layer) in self.layers.iter().enumerate() {
            let prefix = format!("layers.{}", i);
            out.extend([
                entry(format!("{}.q_proj", prefix), &layer.q_proj),
                entry(format!("{}.k_proj", prefix), &layer.k_proj),
                entry(format!("{}.v_proj", prefix), &layer.v_proj),
                entry(format!("{}.out_proj", prefix), &layer.out_proj),
                entry(format!("{}.ln1.weight", prefix), &layer.ln1_weight),
                entry(format!("{}.ln1.bias", prefix), &layer.ln1_bias),
                entry(format!("{}.mlp_up", prefix), &layer.mlp_up),
                entry(format!("{}.mlp_down", prefix), &layer.mlp_down),
                entry(format!("{}.ln2.weight", prefix), &layer.ln2_weight),
                entry(format!("{}.ln2.bias", prefix), &layer.ln2_bias),
            ]);
        }
        out
    }
}

fn tensor_f32(tensors: &SafeTensors<'_>, name: &str, expected: &[usize]) -> Result<Vec<f32>> {
    let view = tensors
        .tensor(name)
        .with_context(|| format!("tensor '{}' not found", name))?;

    ensure!(
        view.dtype() == Dtype::F32,
        "tensor '{}' has dtype {:?}, expected F32",
        name,
        view.dtype()
    );
    ensure!(
        view.shape() == expected,
        "tensor '{}' has shape {:?}, expected {:?}",
        name,
        view.shape(),
        expected
    );

    Ok(view
        .data()
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn load_tensor_2d(tensors: &SafeTensors<'_>, name: &str, shape: (usize, usize)) -> Result<Array2<f32>> {
    let floats = tensor_f32(tensors, name, &[shape.0, shape.1])?;
    Array2::from_shape_vec(shape, floats).context("failed to reshape tensor")
}

fn load_tensor_1d(tensors: &SafeTensors<'_>, name: &str, len: usize) -> Result<Array1<f32>> {
    Ok(Array1::from(tensor_f32(tensors, name, &[len])?))
}
