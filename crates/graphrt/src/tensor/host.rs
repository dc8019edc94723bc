//! Reference-counted host tensors with explicit disposal.
//!
//! The executor frees intermediate tensors eagerly once their last consumer
//! has run, so a tensor is a small handle around a shared buffer slot that can
//! be emptied independently of Rust ownership. `Clone` yields the same logical
//! tensor (same id, same slot); [`Tensor::alias`] and [`Tensor::reshaped`]
//! mint new logical tensors that share the underlying storage cheaply.
//!
//! A global live-tensor counter tracks every logical tensor created and every
//! explicit disposal. Tests use the counter to prove the executor neither
//! leaks intermediates nor frees tensors the caller still owns.

use anyhow::{anyhow, bail, ensure, Result};
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::{DType, Shape};

static NEXT_TENSOR_ID: AtomicUsize = AtomicUsize::new(0);
static LIVE_TENSORS: AtomicIsize = AtomicIsize::new(0);

/// Number of logical tensors created and not yet disposed, process wide.
pub fn live_tensor_count() -> isize {
    LIVE_TENSORS.load(Ordering::SeqCst)
}

/// Immutable element storage. Cloning shares the allocation.
#[derive(Debug, Clone)]
pub enum TensorData {
    F32(Arc<[f32]>),
    I32(Arc<[i32]>),
    Bool(Arc<[bool]>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::Float32,
            TensorData::I32(_) => DType::Int32,
            TensorData::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::I32(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A logical tensor: id, dtype, shape, and a disposable storage slot.
#[derive(Debug, Clone)]
pub struct Tensor {
    id: usize,
    dtype: DType,
    shape: Shape,
    buffer: Arc<RwLock<Option<TensorData>>>,
}

impl Tensor {
    fn alloc(dtype: DType, shape: Shape, data: TensorData) -> Self {
        let id = NEXT_TENSOR_ID.fetch_add(1, Ordering::SeqCst);
        LIVE_TENSORS.fetch_add(1, Ordering::SeqCst);
        Tensor { id, dtype, shape, buffer: Arc::new(RwLock::new(Some(data))) }
    }

    pub fn from_f32(shape: impl Into<Shape>, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            data.len() == shape.num_elements(),
            "data length {} does not match shape {}",
            data.len(),
            shape
        );
        Ok(Self::alloc(DType::Float32, shape, TensorData::F32(data.into())))
    }

    pub fn from_i32(shape: impl Into<Shape>, data: Vec<i32>) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            data.len() == shape.num_elements(),
            "data length {} does not match shape {}",
            data.len(),
            shape
        );
        Ok(Self::alloc(DType::Int32, shape, TensorData::I32(data.into())))
    }

    pub fn from_bool(shape: impl Into<Shape>, data: Vec<bool>) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            data.len() == shape.num_elements(),
            "data length {} does not match shape {}",
            data.len(),
            shape
        );
        Ok(Self::alloc(DType::Bool, shape, TensorData::Bool(data.into())))
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self::alloc(DType::Float32, Shape::scalar(), TensorData::F32(vec![value].into()))
    }

    pub fn scalar_i32(value: i32) -> Self {
        Self::alloc(DType::Int32, Shape::scalar(), TensorData::I32(vec![value].into()))
    }

    pub fn scalar_bool(value: bool) -> Self {
        Self::alloc(DType::Bool, Shape::scalar(), TensorData::Bool(vec![value].into()))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Snapshot of the storage. Fails if the tensor was disposed.
    pub fn data(&self) -> Result<TensorData> {
        self.buffer
            .read()
            .expect("tensor buffer lock poisoned")
            .clone()
            .ok_or_else(|| anyhow!("tensor {} has been disposed", self.id))
    }

    pub fn f32_data(&self) -> Result<Arc<[f32]>> {
        match self.data()? {
            TensorData::F32(v) => Ok(v),
            other => bail!("tensor {} holds {} data, expected float32", self.id, other.dtype()),
        }
    }

    pub fn i32_data(&self) -> Result<Arc<[i32]>> {
        match self.data()? {
            TensorData::I32(v) => Ok(v),
            other => bail!("tensor {} holds {} data, expected int32", self.id, other.dtype()),
        }
    }

    pub fn bool_data(&self) -> Result<Arc<[bool]>> {
        match self.data()? {
            TensorData::Bool(v) => Ok(v),
            other => bail!("tensor {} holds {} data, expected bool", self.id, other.dtype()),
        }
    }

    /// Reads a rank-0 (or single-element) tensor as one f32.
    pub fn scalar_value_f32(&self) -> Result<f32> {
        let data = self.f32_data()?;
        ensure!(data.len() == 1, "tensor {} has {} elements, expected a scalar", self.id, data.len());
        Ok(data[0])
    }

    pub fn scalar_value_i32(&self) -> Result<i32> {
        let data = self.i32_data()?;
        ensure!(data.len() == 1, "tensor {} has {} elements, expected a scalar", self.id, data.len());
        Ok(data[0])
    }

    pub fn scalar_value_bool(&self) -> Result<bool> {
        let data = self.bool_data()?;
        ensure!(data.len() == 1, "tensor {} has {} elements, expected a scalar", self.id, data.len());
        Ok(data[0])
    }

    /// Reads any numeric tensor as a vector of i64, casting as needed. Index
    /// and size parameters arrive this way from the graph.
    pub fn int_vec(&self) -> Result<Vec<i64>> {
        match self.data()? {
            TensorData::I32(v) => Ok(v.iter().map(|&x| x as i64).collect()),
            TensorData::F32(v) => Ok(v.iter().map(|&x| x as i64).collect()),
            TensorData::Bool(_) => bail!("tensor {} holds bool data, expected numeric", self.id),
        }
    }

    /// New logical tensor (fresh id) sharing this tensor's storage.
    pub fn alias(&self) -> Result<Self> {
        Ok(Self::alloc(self.dtype, self.shape.clone(), self.data()?))
    }

    /// New logical tensor with the same elements laid out under a new shape.
    pub fn reshaped(&self, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        ensure!(
            shape.num_elements() == self.shape.num_elements(),
            "cannot reshape tensor of shape {} into {}",
            self.shape,
            shape
        );
        Ok(Self::alloc(self.dtype, shape, self.data()?))
    }

    /// Releases this logical tensor's storage slot. Idempotent: disposing a
    /// tensor twice (or via another handle to the same id) is a no-op.
    pub fn dispose(&self) {
        let mut slot = self.buffer.write().expect("tensor buffer lock poisoned");
        if slot.take().is_some() {
            LIVE_TENSORS.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.buffer.read().expect("tensor buffer lock poisoned").is_none()
    }
}
