//! all-MiniLM-L6-v2 sentence encoder on candle (CPU).
//!
//! A 6-layer BERT with post-norm residual blocks. Sentence vectors are the mean
//! of the last hidden states, L2-normalized, so cosine similarity reduces to a
//! dot product.

use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};
use std::path::Path;
use tracing::debug;

use crate::embed::EmbeddingProvider;

pub const MINILM_MODEL_ID: &str = "all-MiniLM-L6-v2";

const HIDDEN: usize = 384;
const INTERMEDIATE: usize = 1536;
const HEADS: usize = 12;
const HEAD_DIM: usize = HIDDEN / HEADS;
const LAYERS: usize = 6;
const VOCAB: usize = 30522;
const MAX_POSITIONS: usize = 512;
const TYPE_VOCAB: usize = 2;
const LN_EPS: f64 = 1e-12;

struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attn_out: Linear,
    attn_norm: LayerNorm,
    ffn_up: Linear,
    ffn_down: Linear,
    ffn_norm: LayerNorm,
}

impl EncoderLayer {
    fn load(vb: VarBuilder) -> Result<Self> {
        let attn = vb.pp("attention");
        let self_attn = attn.pp("self");
        Ok(Self {
            query: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("query"))?,
            key: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("key"))?,
            value: candle_nn::linear(HIDDEN, HIDDEN, self_attn.pp("value"))?,
            attn_out: candle_nn::linear(HIDDEN, HIDDEN, attn.pp("output").pp("dense"))?,
            attn_norm: candle_nn::layer_norm(HIDDEN, LN_EPS, attn.pp("output").pp("LayerNorm"))?,
            ffn_up: candle_nn::linear(HIDDEN, INTERMEDIATE, vb.pp("intermediate").pp("dense"))?,
            ffn_down: candle_nn::linear(INTERMEDIATE, HIDDEN, vb.pp("output").pp("dense"))?,
            ffn_norm: candle_nn::layer_norm(HIDDEN, LN_EPS, vb.pp("output").pp("LayerNorm"))?,
        })
    }

    fn split_heads(x: &Tensor, batch: usize, seq_len: usize) -> Result<Tensor> {
        Ok(x.reshape((batch, seq_len, HEADS, HEAD_DIM))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;

        let q = Self::split_heads(&self.query.forward(x)?, batch, seq_len)?;
        let k = Self::split_heads(&self.key.forward(x)?, batch, seq_len)?;
        let v = Self::split_heads(&self.value.forward(x)?, batch, seq_len)?;

        let scores = q
            .matmul(&k.t()?.contiguous()?)?
            .affine(1.0 / (HEAD_DIM as f64).sqrt(), 0.0)?;
        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, HIDDEN))?;

        let x = self.attn_norm.forward(&(x + self.attn_out.forward(&context)?)?)?;

        let h = self.ffn_up.forward(&x)?.gelu_erf()?;
        let h = self.ffn_down.forward(&h)?;
        Ok(self.ffn_norm.forward(&(x + h)?)?)
    }
}

struct MiniLmEncoder {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    embed_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    device: Device,
}

impl MiniLmEncoder {
    fn load(path: &Path, device: Device) -> Result<Self> {
        // SAFETY: the weights file is opened read-only and must not be modified
        // while the mapping is alive.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)? };

        let emb = vb.pp("embeddings");
        let layers = (0..LAYERS)
            .map(|i| EncoderLayer::load(vb.pp("encoder").pp("layer").pp(i.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            word: candle_nn::embedding(VOCAB, HIDDEN, emb.pp("word_embeddings"))?,
            position: candle_nn::embedding(MAX_POSITIONS, HIDDEN, emb.pp("position_embeddings"))?,
            token_type: candle_nn::embedding(TYPE_VOCAB, HIDDEN, emb.pp("token_type_embeddings"))?,
            embed_norm: candle_nn::layer_norm(HIDDEN, LN_EPS, emb.pp("LayerNorm"))?,
            layers,
            device,
        })
    }

    fn encode(&self, token_ids: &[u32]) -> Result<Vec<f32>> {
        let seq_len = token_ids.len();
        let ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let positions = Tensor::arange(0u32, seq_len as u32, &self.device)?.unsqueeze(0)?;
        let types = Tensor::zeros((1, seq_len), DType::U32, &self.device)?;

        let embedded = ((self.word.forward(&ids)? + self.position.forward(&positions)?)?
            + self.token_type.forward(&types)?)?;
        let mut hidden = self.embed_norm.forward(&embedded)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden)?;
        }

        let pooled = hidden.mean(1)?.squeeze(0)?;
        let norm: f32 = pooled.sqr()?.sum_all()?.sqrt()?.to_scalar()?;
        let pooled = if norm > 0.0 {
            pooled.affine(1.0 / norm as f64, 0.0)?
        } else {
            pooled
        };

        Ok(pooled.to_vec1::<f32>()?)
    }
}

pub struct MiniLmEmbeddingProvider {
    encoder: MiniLmEncoder,
    tokenizer: tokenizers::Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let encoder = MiniLmEncoder::load(model_path, Device::Cpu)?;
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("load tokenizer {}: {e}", tokenizer_path.display()))?;
        Ok(Self { encoder, tokenizer })
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("tokenize: {e}"))?;
        let ids = encoding.get_ids();
        if ids.len() > MAX_POSITIONS {
            debug!(tokens = ids.len(), "truncating input to {MAX_POSITIONS} tokens");
        }
        self.encoder.encode(&ids[..ids.len().min(MAX_POSITIONS)])
    }

    fn model_id(&self) -> &str {
        MINILM_MODEL_ID
    }

    fn dimension(&self) -> usize {
        HIDDEN
    }
}
