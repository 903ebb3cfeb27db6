use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{log_softmax, relu},
};

use crate::infra::vocabulary::PAD_ID;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ImageCaptioningConfig {
    pub vocab_size: usize,
    pub seq_length: usize,
    pub embed_dim:  usize,
    pub ff_dim:     usize,
    pub num_heads:  usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    /// Channels of the first convolution; doubled at every stage
    #[config(default = 32)]
    pub cnn_channels: usize,
    /// The CNN feature map is pooled to grid_size × grid_size image tokens
    #[config(default = 8)]
    pub grid_size: usize,
}

impl ImageCaptioningConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageCaptioningModel<B> {
        ImageCaptioningModel {
            cnn:     self.build_cnn(device),
            encoder: self.build_encoder_block(device),
            decoder: self.build_decoder_block(device),
        }
    }

    fn build_cnn<B: Backend>(&self, device: &B::Device) -> CnnEncoder<B> {
        let c = self.cnn_channels;
        let conv = |i: usize, o: usize| {
            Conv2dConfig::new([i, o], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        CnnEncoder {
            conv1:      conv(3, c),
            conv2:      conv(c, 2 * c),
            conv3:      conv(2 * c, 4 * c),
            conv4:      conv(4 * c, 8 * c),
            pool:       AdaptiveAvgPool2dConfig::new([self.grid_size, self.grid_size]).init(),
            projection: LinearConfig::new(8 * c, self.embed_dim).init(device),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> TransformerEncoderBlock<B> {
        TransformerEncoderBlock {
            dense_proj: LinearConfig::new(self.embed_dim, self.embed_dim).init(device),
            attention:  MultiHeadAttentionConfig::new(self.embed_dim, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            norm:       LayerNormConfig::new(self.embed_dim).init(device),
        }
    }

    fn build_decoder_block<B: Backend>(&self, device: &B::Device) -> TransformerDecoderBlock<B> {
        let mha = || {
            MultiHeadAttentionConfig::new(self.embed_dim, self.num_heads)
                .with_dropout(self.dropout)
                .init(device)
        };
        TransformerDecoderBlock {
            token_embedding:    EmbeddingConfig::new(self.vocab_size, self.embed_dim).init(device),
            position_embedding: EmbeddingConfig::new(self.seq_length, self.embed_dim).init(device),
            self_attention:     mha(),
            cross_attention:    mha(),
            ffn_linear1:        LinearConfig::new(self.embed_dim, self.ff_dim).init(device),
            ffn_linear2:        LinearConfig::new(self.ff_dim, self.embed_dim).init(device),
            norm1:              LayerNormConfig::new(self.embed_dim).init(device),
            norm2:              LayerNormConfig::new(self.embed_dim).init(device),
            norm3:              LayerNormConfig::new(self.embed_dim).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
            output:             LinearConfig::new(self.embed_dim, self.vocab_size).init(device),
            embed_dim:          self.embed_dim,
        }
    }
}

// ─── CNN image encoder ────────────────────────────────────────────────────────
// Four stride-2 convolutions, then adaptive pooling to a fixed grid.
// Every grid cell becomes one "image token" of size embed_dim.
#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    pub conv1:      Conv2d<B>,
    pub conv2:      Conv2d<B>,
    pub conv3:      Conv2d<B>,
    pub conv4:      Conv2d<B>,
    pub pool:       AdaptiveAvgPool2d,
    pub projection: Linear<B>,
}

impl<B: Backend> CnnEncoder<B> {
    /// images: [batch, 3, H, W] → features: [batch, grid², embed_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = relu(self.conv1.forward(images));
        let x = relu(self.conv2.forward(x));
        let x = relu(self.conv3.forward(x));
        let x = relu(self.conv4.forward(x));
        let x = self.pool.forward(x);

        let [batch, channels, h, w] = x.dims();
        let x = x.reshape([batch, channels, h * w]).swap_dims(1, 2);
        relu(self.projection.forward(x))
    }
}

// ─── Transformer encoder ──────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TransformerEncoderBlock<B: Backend> {
    pub dense_proj: Linear<B>,
    pub attention:  MultiHeadAttention<B>,
    pub norm:       LayerNorm<B>,
}

impl<B: Backend> TransformerEncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x    = relu(self.dense_proj.forward(x));
        let attn = self.attention.forward(MhaInput::self_attn(x.clone())).context;
        self.norm.forward(x + attn)
    }
}

// ─── Transformer decoder ──────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TransformerDecoderBlock<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub self_attention:     MultiHeadAttention<B>,
    pub cross_attention:    MultiHeadAttention<B>,
    pub ffn_linear1:        Linear<B>,
    pub ffn_linear2:        Linear<B>,
    pub norm1:              LayerNorm<B>,
    pub norm2:              LayerNorm<B>,
    pub norm3:              LayerNorm<B>,
    pub dropout:            Dropout,
    pub output:             Linear<B>,
    pub embed_dim:          usize,
}

impl<B: Backend> TransformerDecoderBlock<B> {
    /// tokens: [batch, T], encoded: [batch, P, embed_dim] → logits [batch, T, vocab]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, encoded: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = tokens.dims();
        let device = tokens.device();

        let pad_mask    = tokens.clone().equal_elem(PAD_ID as i32);
        let causal_mask = generate_autoregressive_mask::<B>(batch_size, seq_len, &device);

        let tok_emb = self.token_embedding.forward(tokens) * (self.embed_dim as f64).sqrt();
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let x = tok_emb + self.position_embedding.forward(positions);

        // Masked self-attention: no peeking at later words or at padding
        let self_attn = self.self_attention.forward(
            MhaInput::self_attn(x.clone())
                .mask_attn(causal_mask)
                .mask_pad(pad_mask),
        ).context;
        let x = self.norm1.forward(x + self_attn);

        // Cross-attention over the image tokens
        let cross = self.cross_attention.forward(
            MhaInput::new(x.clone(), encoded.clone(), encoded),
        ).context;
        let x = self.norm2.forward(x + cross);

        let ffn = self.ffn_linear2.forward(relu(self.ffn_linear1.forward(x.clone())));
        let x   = self.norm3.forward(x + ffn);

        self.output.forward(self.dropout.forward(x))
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ImageCaptioningModel<B: Backend> {
    pub cnn:     CnnEncoder<B>,
    pub encoder: TransformerEncoderBlock<B>,
    pub decoder: TransformerDecoderBlock<B>,
}

/// Loss and masked token accuracy for one batch.
pub struct CaptionStep<B: Backend> {
    pub loss:    Tensor<B, 1>,
    /// Correctly predicted non-padding target tokens
    pub correct: usize,
    /// Non-padding target tokens
    pub total:   usize,
}

impl<B: Backend> ImageCaptioningModel<B> {
    /// images: [batch, 3, H, W] → image tokens [batch, grid², embed_dim]
    pub fn encode_images(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        self.encoder.forward(self.cnn.forward(images))
    }

    /// Next-word logits for every position of `tokens`.
    pub fn decode(&self, tokens: Tensor<B, 2, Int>, encoded: Tensor<B, 3>) -> Tensor<B, 3> {
        self.decoder.forward(tokens, encoded)
    }

    pub fn forward(&self, images: Tensor<B, 4>, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let encoded = self.encode_images(images);
        self.decode(tokens, encoded)
    }

    /// Teacher forcing: predict tokens[:, 1..] from tokens[:, ..T-1].
    /// Padding targets are ignored by both the loss and the accuracy: the
    /// loss is the mean negative log-likelihood over non-padding targets.
    pub fn forward_loss(&self, images: Tensor<B, 4>, tokens: Tensor<B, 2, Int>) -> CaptionStep<B> {
        let [batch_size, seq_len] = tokens.dims();
        let steps = seq_len - 1;

        let inputs  = tokens.clone().slice([0..batch_size, 0..steps]);
        let targets = tokens.slice([0..batch_size, 1..seq_len]).reshape([batch_size * steps]);

        let logits = self.forward(images, inputs);
        let [_, _, vocab] = logits.dims();
        let logits = logits.reshape([batch_size * steps, vocab]);

        // Cross entropy averaged over real targets only
        let mask      = targets.clone().equal_elem(PAD_ID as i32).bool_not().int();
        let mask_f    = mask.clone().float();
        let log_probs = log_softmax(logits.clone(), 1);
        let nll = log_probs
            .gather(1, targets.clone().reshape([batch_size * steps, 1]))
            .reshape([batch_size * steps])
            .neg();
        let loss = (nll * mask_f.clone()).sum() / mask_f.sum().clamp_min(1.0);

        let predicted = logits.argmax(1).flatten::<1>(0, 1);
        let correct: i64 = predicted
            .equal(targets)
            .int()
            .mul(mask.clone())
            .sum()
            .into_scalar()
            .elem::<i64>();
        let total: i64 = mask.sum().into_scalar().elem::<i64>();

        CaptionStep { loss, correct: correct as usize, total: total as usize }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> ImageCaptioningConfig {
        ImageCaptioningConfig::new(20, 6, 16, 32, 2)
            .with_cnn_channels(4)
            .with_grid_size(2)
            .with_dropout(0.0)
    }

    #[test]
    fn test_encoder_output_shape() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        assert_eq!(model.encode_images(images).dims(), [2, 4, 16]);
    }

    #[test]
    fn test_decoder_logits_shape() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let tokens = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 6, 3, 0, 2, 7, 3, 0, 0], &device)
            .reshape([2, 5]);
        assert_eq!(model.forward(images, tokens).dims(), [2, 5, 20]);
    }

    #[test]
    fn test_forward_loss_counts_only_real_targets() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        // targets (shifted by one): [5, 6, 3, 0, 0] and [7, 8, 9, 3, 0] → 7 real tokens
        let tokens = Tensor::<TestBackend, 1, Int>::from_ints(
            [2, 5, 6, 3, 0, 0, 2, 7, 8, 9, 3, 0],
            &device,
        ).reshape([2, 6]);

        let step = model.forward_loss(images, tokens);
        assert_eq!(step.total, 7);
        assert!(step.correct <= step.total);

        let loss: f32 = step.loss.into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn test_loss_is_mean_over_real_targets() {
        let device = Default::default();
        let model  = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);
        // targets: [5, 3, 0, 0, 0] → 2 real of 5
        let tokens = Tensor::<TestBackend, 1, Int>::from_ints([2, 5, 3, 0, 0, 0], &device)
            .reshape([1, 6]);

        let logits = model.forward(images.clone(), tokens.clone().slice([0..1, 0..5]));
        let log_probs: Vec<f32> = log_softmax(logits.reshape([5, 20]), 1)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let expected = -(log_probs[5] + log_probs[20 + 3]) / 2.0;

        let step = model.forward_loss(images, tokens);
        let loss: f32 = step.loss.into_scalar().elem();
        assert_eq!(step.total, 2);
        assert!((loss - expected).abs() < 1e-4, "loss {loss} != masked mean {expected}");
    }
}
