//! Layer normalization kernels.

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2, Axis};
use rayon::prelude::*;

pub fn layer_norm_inplace(
    mut data: ArrayViewMut2<'_, f32>,
    gamma: ArrayView1<'_, f32>,
    beta: ArrayView1<'_, f32>,
    epsilon: f32,
) -> Result<()> {
    let feature_dim = data.len_of(Axis(1));
    ensure!(
        gamma.len() == feature_dim,
        "gamma length {} must equal feature dimension {}",
        gamma.len(),
        feature_dim
    );
    ensure!(
        beta.len() == feature_dim,
        "beta length {} must equal feature dimension {}",
        beta.len(),
        feature_dim
    );

    data.axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let len = row.len() as f32;
            let mean = row.iter().sum::<f32>() / len;
            let var = row.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / len;
            let inv_std = 1.0 / (var + epsilon).sqrt();

            for ((value, g), b) in row.iter_mut().zip(gamma.iter()).zip(beta.iter()) {
                *value = (*value - mean) * inv_std * g + b;
            }
        });

    Ok(())
}

/// Non-mutating layer norm that returns a new array.
pub fn layer_norm(
    data: ArrayView2<'_, f32>,
    gamma: ArrayView1<'_, f32>,
    beta: ArrayView1<'_, f32>,
    epsilon: f32,
) -> Result<Array2<f32>> {
    let mut output = data.to_owned();
    layer_norm_inplace(output.view_mut(), gamma, beta, epsilon)?;
    Ok(output)
}
