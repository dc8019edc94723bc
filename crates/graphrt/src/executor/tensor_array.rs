//! Mutable tensor list addressed by graph-level `TensorArray*V3` ops.
//!
//! An array is created by `TensorArrayV3` and then referenced by its id,
//! which travels through the graph as a scalar int32 tensor. Slots are write
//! once; reads optionally clear the slot; the element shape can be pinned at
//! construction or adopted from the first write. Gather, concat, scatter and
//! split lean on the kernel seam for the actual data movement.

use anyhow::{ensure, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::TensorArrayError;
use crate::kernels::Kernels;
use crate::tensor::{DType, Shape, Tensor};

static NEXT_ARRAY_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Default)]
struct Slot {
    tensor: Option<Tensor>,
    written: bool,
    read: bool,
    cleared: bool,
}

/// One TensorArray instance, owned by an [`ExecutionContext`]
/// (super::ExecutionContext).
#[derive(Debug)]
pub struct TensorArray {
    id: usize,
    name: String,
    dtype: DType,
    max_size: usize,
    /// Declared element shape with `-1` wildcards. Empty means unknown until
    /// the first write adopts a shape.
    element_shape: Vec<i64>,
    identical_element_shapes: bool,
    dynamic_size: bool,
    clear_after_read: bool,
    closed: bool,
    slots: Vec<Slot>,
}

impl TensorArray {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        dtype: DType,
        max_size: usize,
        element_shape: Vec<i64>,
        identical_element_shapes: bool,
        dynamic_size: bool,
        clear_after_read: bool,
    ) -> Self {
        TensorArray {
            id: NEXT_ARRAY_ID.fetch_add(1, Ordering::SeqCst),
            name: name.into(),
            dtype,
            max_size,
            element_shape,
            identical_element_shapes,
            dynamic_size,
            clear_after_read,
            closed: false,
            slots: Vec::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of slots touched so far, not the declared capacity.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TensorArrayError::Closed(self.name.clone()).into());
        }
        Ok(())
    }

    fn check_element_shape(&mut self, index: usize, shape: &Shape) -> Result<()> {
        if self.size() == 0 && self.element_shape.is_empty() {
            self.element_shape = shape.dims().iter().map(|&d| d as i64).collect();
        }
        if !shape.is_compatible_with(&self.element_shape) {
            return Err(TensorArrayError::ShapeMismatch {
                name: self.name.clone(),
                index,
                expected: self.element_shape.clone(),
                actual: shape.clone(),
            }
            .into());
        }
        if self.size() == 0 && self.identical_element_shapes {
            // The first element pins any wildcard dimensions for the rest.
            self.element_shape = shape.dims().iter().map(|&d| d as i64).collect();
        }
        Ok(())
    }

    /// Writes to one slot. Each slot accepts exactly one write, and only
    /// before it has been read.
    pub fn write(&mut self, index: i64, tensor: Tensor) -> Result<()> {
        self.ensure_open()?;
        if index < 0 || (!self.dynamic_size && index as usize >= self.max_size) {
            return Err(TensorArrayError::WriteOutOfBounds {
                name: self.name.clone(),
                index,
                size: self.max_size,
            }
            .into());
        }
        if tensor.dtype() != self.dtype {
            return Err(TensorArrayError::DTypeMismatch {
                name: self.name.clone(),
                expected: self.dtype,
                actual: tensor.dtype(),
            }
            .into());
        }
        let index = index as usize;
        self.check_element_shape(index, tensor.shape())?;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, Slot::default);
        }
        let slot = &mut self.slots[index];
        if slot.read {
            return Err(TensorArrayError::WriteAfterRead { name: self.name.clone(), index }.into());
        }
        if slot.written {
            return Err(TensorArrayError::AlreadyWritten { name: self.name.clone(), index }.into());
        }
        slot.tensor = Some(tensor);
        slot.written = true;
        Ok(())
    }

    /// Reads one slot. With `clear_after_read` the slot is poisoned for
    /// further reads, though the stored tensor stays alive.
    pub fn read(&mut self, index: i64) -> Result<Tensor> {
        self.ensure_open()?;
        if index < 0 || index as usize >= self.size() {
            return Err(TensorArrayError::ReadOutOfBounds {
                name: self.name.clone(),
                index,
                size: self.size(),
            }
            .into());
        }
        let clear_after_read = self.clear_after_read;
        let name = self.name.clone();
        let index = index as usize;
        let slot = &mut self.slots[index];
        if !slot.written {
            return Err(TensorArrayError::NeverWritten { name, index }.into());
        }
        if slot.cleared {
            return Err(TensorArrayError::ReadAfterClear { name, index }.into());
        }
        if clear_after_read {
            slot.cleared = true;
        }
        slot.read = true;
        match &slot.tensor {
            Some(tensor) => Ok(tensor.clone()),
            None => Err(TensorArrayError::NeverWritten { name, index }.into()),
        }
    }

    fn read_many(&mut self, indices: &[i64]) -> Result<Vec<Tensor>> {
        indices.iter().map(|&i| self.read(i)).collect()
    }

    fn empty_batch(&self) -> Result<Tensor> {
        let mut dims = vec![0usize];
        dims.extend(self.element_shape.iter().map(|&d| d.max(0) as usize));
        match self.dtype {
            DType::Float32 => Tensor::from_f32(dims, Vec::new()),
            DType::Int32 => Tensor::from_i32(dims, Vec::new()),
            DType::Bool => Tensor::from_bool(dims, Vec::new()),
        }
    }

    /// Stacks the selected slots (all of them by default) along a new
    /// leading axis.
    pub fn gather(
        &mut self,
        indices: Option<Vec<i64>>,
        dtype: Option<DType>,
        kernels: &dyn Kernels,
    ) -> Result<Tensor> {
        self.ensure_open()?;
        if let Some(dtype) = dtype {
            if dtype != self.dtype {
                return Err(TensorArrayError::DTypeMismatch {
                    name: self.name.clone(),
                    expected: self.dtype,
                    actual: dtype,
                }
                .into());
            }
        }
        let indices = indices.unwrap_or_else(|| (0..self.size() as i64).collect());
        if indices.is_empty() {
            return self.empty_batch();
        }
        let tensors = self.read_many(&indices)?;
        let expanded = tensors
            .iter()
            .map(|t| {
                let mut dims = vec![1usize];
                dims.extend_from_slice(t.shape().dims());
                t.reshaped(dims)
            })
            .collect::<Result<Vec<_>>>()?;
        let stacked = kernels.concat(&expanded, 0)?;
        for t in &expanded {
            t.dispose();
        }
        Ok(stacked)
    }

    /// Concatenates every slot along the existing leading axis.
    pub fn concat(&mut self, dtype: Option<DType>, kernels: &dyn Kernels) -> Result<Tensor> {
        self.ensure_open()?;
        if let Some(dtype) = dtype {
            if dtype != self.dtype {
                return Err(TensorArrayError::DTypeMismatch {
                    name: self.name.clone(),
                    expected: self.dtype,
                    actual: dtype,
                }
                .into());
            }
        }
        if self.size() == 0 {
            return self.empty_batch();
        }
        let indices: Vec<i64> = (0..self.size() as i64).collect();
        let tensors = self.read_many(&indices)?;
        kernels.concat(&tensors, 0)
    }

    /// Unstacks `tensor` along its leading axis and writes each piece to the
    /// corresponding index.
    pub fn scatter(&mut self, indices: &[i64], tensor: &Tensor, kernels: &dyn Kernels) -> Result<()> {
        self.ensure_open()?;
        let rows = tensor.shape().dims().first().copied().unwrap_or(0);
        if indices.len() != rows {
            return Err(TensorArrayError::BadScatter {
                name: self.name.clone(),
                expected: indices.len(),
                actual: rows,
            }
            .into());
        }
        if !self.dynamic_size {
            if let Some(&max_index) = indices.iter().max() {
                if max_index < 0 || max_index as usize >= self.max_size {
                    return Err(TensorArrayError::WriteOutOfBounds {
                        name: self.name.clone(),
                        index: max_index,
                        size: self.max_size,
                    }
                    .into());
                }
            }
        }
        if rows == 0 {
            return Ok(());
        }
        let pieces = kernels.split(tensor, &vec![1; rows], 0)?;
        for (&index, piece) in indices.iter().zip(&pieces) {
            let element = piece.reshaped(tensor.shape().dims()[1..].to_vec())?;
            piece.dispose();
            self.write(index, element)?;
        }
        Ok(())
    }

    /// Splits `tensor` along its leading axis into `lengths` rows per slot.
    pub fn split(&mut self, lengths: &[i64], tensor: &Tensor, kernels: &dyn Kernels) -> Result<()> {
        self.ensure_open()?;
        let rows = tensor.shape().dims().first().copied().unwrap_or(0);
        let total: i64 = lengths.iter().sum();
        if total != rows as i64 {
            return Err(TensorArrayError::BadSplit {
                name: self.name.clone(),
                lengths: total.max(0) as usize,
                actual: rows,
            }
            .into());
        }
        ensure!(
            self.dynamic_size || lengths.len() == self.max_size,
            "TensorArray {}: size {} does not match the number of split lengths {}",
            self.name,
            self.max_size,
            lengths.len()
        );
        let sizes: Vec<usize> = lengths.iter().map(|&l| l.max(0) as usize).collect();
        let pieces = kernels.split(tensor, &sizes, 0)?;
        for (index, piece) in pieces.into_iter().enumerate() {
            self.write(index as i64, piece)?;
        }
        Ok(())
    }

    /// Disposes every stored tensor not in `keep_ids`, empties the array,
    /// and rejects all further operations.
    pub fn clear_and_close(&mut self, keep_ids: &HashSet<usize>) {
        for slot in &self.slots {
            if let Some(tensor) = &slot.tensor {
                if !keep_ids.contains(&tensor.id()) {
                    tensor.dispose();
                }
            }
        }
        self.slots.clear();
        self.closed = true;
    }
}
