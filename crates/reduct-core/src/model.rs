//! Model persistence
//!
//! File layout (little-endian):
//!
//! ```text
//! b"RDCT" | version u32 | header_len u32 | JSON PersistedOptions | count u64 | count x f32
//! ```
//!
//! The options carry everything needed to rebuild identical weight addressing
//! (bit precision and replicate count), so a reloaded model lines up with the
//! weights it was trained with.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::learner::Learner;
use crate::sgd::SgdParams;
use crate::stats::LossFunction;
use crate::weights::{MAX_BITS, WeightSpace, WeightVector};

pub const MAGIC: &[u8; 4] = b"RDCT";
pub const MODEL_VERSION: u32 = 1;
const MAX_HEADER_LEN: u32 = 1 << 20;

/// Options stored alongside the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedOptions {
    pub bits: u32,
    pub replicas: u32,
    /// Confidence level the interval was configured with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
    pub sgd: SgdParams,
    #[serde(default)]
    pub loss: LossFunction,
}

impl PersistedOptions {
    /// Weight count implied by the options; `None` if it does not fit.
    pub fn weight_len(&self) -> Option<usize> {
        if self.bits > MAX_BITS {
            return None;
        }
        let mut space = WeightSpace::new(self.bits, 1);
        space.replicate(self.replicas).ok()?;
        usize::try_from(space.base_span().checked_mul(space.weights_per_problem())?).ok()
    }
}

pub fn write_model<W: Write>(w: &mut W, options: &PersistedOptions, weights: &WeightVector) -> ModelResult<()> {
    let header = serde_json::to_vec(options)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "model header too large"))?;

    w.write_all(MAGIC)?;
    w.write_u32::<LittleEndian>(MODEL_VERSION)?;
    w.write_u32::<LittleEndian>(header_len)?;
    w.write_all(&header)?;
    w.write_u64::<LittleEndian>(weights.len() as u64)?;
    for &x in weights.as_slice() {
        w.write_f32::<LittleEndian>(x)?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_model<R: Read>(r: &mut R) -> ModelResult<(PersistedOptions, WeightVector)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ModelError::BadMagic);
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != MODEL_VERSION {
        return Err(ModelError::UnsupportedVersion(version));
    }
    let header_len = r.read_u32::<LittleEndian>()?;
    if header_len > MAX_HEADER_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!("Unreasonable header length: {header_len}")).into());
    }
    let mut header = vec![0u8; header_len as usize];
    r.read_exact(&mut header)?;
    let options: PersistedOptions = serde_json::from_slice(&header)?;

    let count = r.read_u64::<LittleEndian>()?;
    let expected = options.weight_len().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("model options describe an unaddressable weight table (bits {})", options.bits),
        )
    })?;
    if count != expected as u64 {
        return Err(ModelError::DimensionMismatch {
            expected,
            actual: count as usize,
        });
    }
    let mut data = vec![0f32; expected];
    r.read_f32_into::<LittleEndian>(&mut data)?;
    Ok((options, WeightVector::from_vec(data)))
}

pub fn save_model<P: AsRef<Path>>(path: P, options: &PersistedOptions, weights: &WeightVector) -> ModelResult<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write_model(&mut w, options, weights)?;
    log::info!(
        "saved model to {} ({} weights, {} replicates)",
        path.as_ref().display(),
        weights.len(),
        options.replicas
    );
    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> ModelResult<(PersistedOptions, WeightVector)> {
    let mut r = BufReader::new(File::open(path.as_ref())?);
    let loaded = read_model(&mut r)?;
    log::info!("loaded model from {} ({} weights)", path.as_ref().display(), loaded.1.len());
    Ok(loaded)
}

/// Save the weights owned somewhere below `learner`.
pub fn save_learner<P: AsRef<Path>>(path: P, options: &PersistedOptions, learner: &dyn Learner) -> ModelResult<()> {
    let weights = learner.weights().ok_or(ModelError::NoWeights)?;
    save_model(path, options, weights)
}

/// Copy loaded weights into the stack's weight vector.
pub fn load_into(learner: &mut dyn Learner, weights: &WeightVector) -> ModelResult<()> {
    let target = learner.weights_mut().ok_or(ModelError::NoWeights)?;
    if target.len() != weights.len() {
        return Err(ModelError::DimensionMismatch {
            expected: target.len(),
            actual: weights.len(),
        });
    }
    target.as_mut_slice().copy_from_slice(weights.as_slice());
    Ok(())
}
