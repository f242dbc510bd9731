use crate::data::WindowedDataset;
use crate::models::lstm::PriceRegressor;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Optimizer, ParamsAdamW, VarMap};
use rand::seq::SliceRandom;
use tracing::{debug, info};

pub struct TrainParams {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

/// Stack the windows selected by `indices` into a `[batch, window, 1]` tensor.
pub fn batch_features(dataset: &WindowedDataset, indices: &[usize], device: &Device) -> Result<Tensor> {
    let window = dataset.features.first().map(Vec::len).unwrap_or(0);
    let flat: Vec<f32> = indices
        .iter()
        .flat_map(|&idx| dataset.features[idx].iter().map(|&v| v as f32))
        .collect();
    Ok(Tensor::from_vec(flat, (indices.len(), window, 1), device)?)
}

fn batch_targets(dataset: &WindowedDataset, indices: &[usize], device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = indices.iter().map(|&idx| dataset.targets[idx] as f32).collect();
    Ok(Tensor::from_vec(flat, (indices.len(), 1), device)?)
}

/// Fit `model` (whose variables live in `varmap`) to every example in `dataset`.
///
/// Returns the mean loss of the last epoch.
pub fn fit(
    model: &PriceRegressor,
    varmap: &VarMap,
    dataset: &WindowedDataset,
    params: &TrainParams,
    device: &Device,
) -> Result<f64> {
    if dataset.is_empty() {
        return Err(anyhow::anyhow!("No training data available."));
    }

    let mut opt = candle_nn::AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: params.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )?;

    let num_samples = dataset.len();
    let batch_size = params.batch_size.max(1);
    let mut indices: Vec<usize> = (0..num_samples).collect();
    let mut rng = rand::thread_rng();
    let mut last_loss = 0.0;

    info!(samples = num_samples, epochs = params.epochs, batch_size, "Training started");

    for epoch in 0..params.epochs {
        indices.shuffle(&mut rng);
        let mut total_loss = 0.0;
        let mut num_batches = 0usize;

        // The final batch may be short.
        for batch_indices in indices.chunks(batch_size) {
            let x = batch_features(dataset, batch_indices, device)?;
            let y = batch_targets(dataset, batch_indices, device)?;

            let pred = model.forward(&x)?;
            let loss = candle_nn::loss::mse(&pred, &y)?;
            opt.backward_step(&loss)?;

            total_loss += loss.to_dtype(DType::F64)?.to_scalar::<f64>()?;
            num_batches += 1;
        }

        last_loss = total_loss / num_batches as f64;
        debug!("Epoch {}: Loss = {:.6}", epoch + 1, last_loss);
    }

    info!(loss = last_loss, "Training finished");
    Ok(last_loss)
}

/// Run `model` over every window in order, `batch_size` windows at a time.
pub fn predict(
    model: &PriceRegressor,
    dataset: &WindowedDataset,
    batch_size: usize,
    device: &Device,
) -> Result<Vec<f64>> {
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut predictions = Vec::with_capacity(dataset.len());

    for batch_indices in indices.chunks(batch_size.max(1)) {
        let x = batch_features(dataset, batch_indices, device)?;
        let y = model.forward(&x)?.flatten_all()?.to_vec1::<f32>()?;
        predictions.extend(y.into_iter().map(f64::from));
    }

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::build_windows;
    use candle_nn::VarBuilder;

    fn ramp_dataset(len: usize, window: usize) -> WindowedDataset {
        let series: Vec<f64> = (0..len).map(|i| i as f64 / len as f64).collect();
        build_windows(&series, window)
    }

    #[test]
    fn batch_tensor_has_window_shape() -> Result<()> {
        let ds = ramp_dataset(20, 5);
        let x = batch_features(&ds, &[0, 3, 7], &Device::Cpu)?;
        assert_eq!(x.dims(), &[3, 5, 1]);

        let row = x.get(1)?.flatten_all()?.to_vec1::<f32>()?;
        let expected: Vec<f32> = ds.features[3].iter().map(|&v| v as f32).collect();
        assert_eq!(row, expected);
        Ok(())
    }

    #[test]
    fn training_reduces_loss_and_prediction_covers_every_window() -> Result<()> {
        let device = Device::Cpu;
        let ds = ramp_dataset(70, 10);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PriceRegressor::new(8, vb)?;

        let before = predict(&model, &ds, 16, &device)?;
        let mse_before = before
            .iter()
            .zip(&ds.targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / ds.len() as f64;

        let params = TrainParams {
            epochs: 40,
            batch_size: 16,
            learning_rate: 1e-2,
        };
        let loss = fit(&model, &varmap, &ds, &params, &device)?;
        assert!(loss.is_finite());

        let after = predict(&model, &ds, 16, &device)?;
        assert_eq!(after.len(), ds.len());
        let mse_after = after
            .iter()
            .zip(&ds.targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / ds.len() as f64;
        assert!(mse_after < mse_before, "{mse_after} >= {mse_before}");
        Ok(())
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PriceRegressor::new(4, vb).unwrap();
        let ds = ramp_dataset(5, 10);
        let params = TrainParams {
            epochs: 1,
            batch_size: 4,
            learning_rate: 1e-3,
        };
        assert!(fit(&model, &varmap, &ds, &params, &device).is_err());
    }
}
