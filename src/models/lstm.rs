use candle_core::{Module, Result, Tensor};
use candle_nn::{Linear, LSTMConfig, VarBuilder, LSTM, RNN};

// --- Stacked LSTM regressor ---
// Maps a [batch, window, 1] sequence of scaled closes to a [batch, 1] next-close estimate.
pub struct PriceRegressor {
    first: LSTM,
    second: LSTM,
    head: Linear,
}

impl PriceRegressor {
    pub fn new(hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let first = candle_nn::lstm(
            1,
            hidden_dim,
            LSTMConfig {
                layer_idx: 0,
                ..Default::default()
            },
            vb.pp("lstm"),
        )?;
        let second = candle_nn::lstm(
            hidden_dim,
            hidden_dim,
            LSTMConfig {
                layer_idx: 1,
                ..Default::default()
            },
            vb.pp("lstm"),
        )?;
        let head = candle_nn::linear(hidden_dim, 1, vb.pp("head"))?;
        Ok(Self { first, second, head })
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        // x: [batch, seq_len, 1]
        // The first layer hands its whole sequence to the second.
        let states = self.first.seq(x)?;
        let sequence = self.first.states_to_tensor(&states)?; // [batch, seq_len, hidden]

        let states = self.second.seq(&sequence)?;
        let last_state = states
            .last()
            .ok_or_else(|| candle_core::Error::Msg("Empty LSTM sequence".into()))?;
        self.head.forward(&last_state.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn output_is_one_value_per_sequence() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = PriceRegressor::new(8, vb)?;

        let x = Tensor::zeros((3, 12, 1), DType::F32, &device)?;
        let y = model.forward(&x)?;
        assert_eq!(y.dims(), &[3, 1]);
        Ok(())
    }

    #[test]
    fn weights_use_layer_indexed_names() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let _model = PriceRegressor::new(4, vb)?;

        let data = varmap.data().lock().map_err(|e| candle_core::Error::Msg(e.to_string()))?;
        for name in [
            "lstm.weight_ih_l0",
            "lstm.weight_hh_l0",
            "lstm.weight_ih_l1",
            "lstm.weight_hh_l1",
            "head.weight",
            "head.bias",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        Ok(())
    }
}
