use burn::nn::attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

/// Configuration for the ScoreHead.
///
/// Scores every candidate slot against the query, letting candidates of the
/// same row attend to each other:
///
/// ```text
/// query (B, H) ──broadcast──┐
/// docs  (B, P, H) ──────────┴─ concat (B, P, 2H)
///   → Linear(2H→H) → ReLU → LayerNorm                        mixer
///   → MHA(key padding = !mask) + residual → LayerNorm        attention
///   → Linear(H→4H) → ReLU → Linear(4H→H) + residual → LN     feed-forward
///   → Linear(H→dh) → Tanh → Linear(dh→1) → Sigmoid → (B, P)  decoder
///   → padded slots set to 0
/// ```
#[derive(Config, Debug)]
pub struct ScoreHeadConfig {
    /// Encoder embedding dimension H. Must be divisible by `num_heads`.
    pub hidden_size: usize,
    #[config(default = 8)]
    pub num_heads: usize,
    /// Width of the decoder's hidden layer.
    #[config(default = 256)]
    pub decoder_hidden_size: usize,
}

/// Trainable scoring head. The encoder that produces its inputs is frozen
/// and lives outside this module.
#[derive(Module, Debug)]
pub struct ScoreHead<B: Backend> {
    mixer: Linear<B>,
    mixer_norm: LayerNorm<B>,
    attn: MultiHeadAttention<B>,
    attn_norm: LayerNorm<B>,
    ffn_in: Linear<B>,
    ffn_out: Linear<B>,
    ffn_norm: LayerNorm<B>,
    decoder_hidden: Linear<B>,
    decoder_out: Linear<B>,
}

impl ScoreHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ScoreHead<B> {
        let h = self.hidden_size;
        ScoreHead {
            mixer: LinearConfig::new(2 * h, h).init(device),
            mixer_norm: LayerNormConfig::new(h).init(device),
            attn: MultiHeadAttentionConfig::new(h, self.num_heads)
                .with_dropout(0.0)
                .init(device),
            attn_norm: LayerNormConfig::new(h).init(device),
            ffn_in: LinearConfig::new(h, 4 * h).init(device),
            ffn_out: LinearConfig::new(4 * h, h).init(device),
            ffn_norm: LayerNormConfig::new(h).init(device),
            decoder_hidden: LinearConfig::new(h, self.decoder_hidden_size).init(device),
            decoder_out: LinearConfig::new(self.decoder_hidden_size, 1).init(device),
        }
    }
}

impl<B: Backend> ScoreHead<B> {
    /// Selection likelihoods for every slot.
    ///
    /// - `query`: `(batch, hidden)`
    /// - `documents`: `(batch, slots, hidden)`, zeros at padded slots
    /// - `mask`: `(batch, slots)`, `true` where the slot holds a real candidate
    ///
    /// Returns `(batch, slots)` in `[0, 1]`, exactly `0.0` wherever `mask` is
    /// false. A row with no valid slot attends uniformly over padding and is
    /// then zeroed, so it never produces NaN.
    pub fn forward(
        &self,
        query: Tensor<B, 2>,
        documents: Tensor<B, 3>,
        mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 2> {
        let [batch, slots, _] = documents.dims();
        if slots == 0 {
            return Tensor::zeros([batch, 0], &documents.device());
        }
        let padding = mask.bool_not();

        let query = query.unsqueeze_dim::<3>(1).repeat_dim(1, slots);
        let x = Tensor::cat(vec![query, documents], 2);
        let x = self.mixer_norm.forward(relu(self.mixer.forward(x)));

        let attended = self
            .attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(padding.clone()))
            .context;
        let x = self.attn_norm.forward(x + attended);

        let ff = self.ffn_out.forward(relu(self.ffn_in.forward(x.clone())));
        let x = self.ffn_norm.forward(x + ff);

        let logits = self
            .decoder_out
            .forward(self.decoder_hidden.forward(x).tanh());
        let likelihoods: Tensor<B, 2> = sigmoid(logits).squeeze::<2>(2);
        likelihoods.mask_fill(padding, 0.0)
    }
}
