//! Growable tensor container addressed by graph-level `TensorList*` ops.
//!
//! Unlike a TensorArray, a list has no write-once discipline: elements can be
//! set, replaced, pushed and popped. A list is created empty
//! (`EmptyTensorList`, `TensorListReserve`) or from an existing tensor
//! (`TensorListFromTensor`, `TensorListScatter`, `TensorListSplit`), and is
//! then referenced by its id, which travels through the graph as a scalar
//! int32 tensor. `max_num_elements` of `-1` means the list is unbounded.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::TensorListError;
use crate::kernels::Kernels;
use crate::tensor::{DType, Tensor};

static NEXT_LIST_ID: AtomicUsize = AtomicUsize::new(1);

/// One TensorList instance, owned by an [`ExecutionContext`]
/// (super::ExecutionContext).
#[derive(Debug)]
pub struct TensorList {
    id: usize,
    dtype: DType,
    /// Declared element shape with `-1` wildcards. Empty means unknown until
    /// the first element fixes it.
    element_shape: Vec<i64>,
    /// Maximum number of elements, `-1` meaning unbounded.
    max_num_elements: i64,
    elements: Vec<Option<Tensor>>,
}

impl TensorList {
    pub fn new(dtype: DType, element_shape: Vec<i64>, max_num_elements: i64) -> Self {
        TensorList {
            id: NEXT_LIST_ID.fetch_add(1, Ordering::SeqCst),
            dtype,
            element_shape,
            max_num_elements,
            elements: Vec::new(),
        }
    }

    /// Unstacks `tensor` along its leading axis into a fresh unbounded list.
    pub fn from_tensor(
        tensor: &Tensor,
        element_shape: Vec<i64>,
        kernels: &dyn Kernels,
    ) -> Result<TensorList> {
        let dims = tensor.shape().dims().to_vec();
        if dims.is_empty() {
            return Err(TensorListError::NotAVector(tensor.shape().clone()).into());
        }
        let mut list = TensorList::new(tensor.dtype(), element_shape, -1);
        if dims[0] == 0 {
            return Ok(list);
        }
        let pieces = kernels.split(tensor, &vec![1; dims[0]], 0)?;
        for piece in &pieces {
            let element = piece.reshaped(dims[1..].to_vec())?;
            piece.dispose();
            list.push_back(element)?;
        }
        Ok(list)
    }

    /// Unstacks `tensor` and places each row at the corresponding index of a
    /// fresh list.
    pub fn scatter(
        tensor: &Tensor,
        indices: &[i64],
        element_shape: Vec<i64>,
        max_num_elements: i64,
        kernels: &dyn Kernels,
    ) -> Result<TensorList> {
        let rows = tensor.shape().dims().first().copied().unwrap_or(0);
        if indices.len() != rows {
            return Err(TensorListError::BadScatter { expected: indices.len(), actual: rows }.into());
        }
        if let Some(&max_index) = indices.iter().max() {
            if max_num_elements != -1 && max_index >= max_num_elements {
                return Err(TensorListError::ScatterOutOfBounds {
                    index: max_index,
                    max: max_num_elements,
                }
                .into());
            }
        }
        let mut list = TensorList::new(tensor.dtype(), element_shape, max_num_elements);
        if rows == 0 {
            return Ok(list);
        }
        let pieces = kernels.split(tensor, &vec![1; rows], 0)?;
        for (&index, piece) in indices.iter().zip(&pieces) {
            let element = piece.reshaped(tensor.shape().dims()[1..].to_vec())?;
            piece.dispose();
            list.set_item(index, element)?;
        }
        Ok(list)
    }

    /// Splits `tensor` along its leading axis into `lengths` rows per
    /// element of a fresh list.
    pub fn split(
        tensor: &Tensor,
        element_shape: Vec<i64>,
        lengths: &[i64],
        kernels: &dyn Kernels,
    ) -> Result<TensorList> {
        let rows = tensor.shape().dims().first().copied().unwrap_or(0);
        let total: i64 = lengths.iter().sum();
        if total != rows as i64 {
            return Err(TensorListError::BadSplit { lengths: total, actual: rows }.into());
        }
        let mut list = TensorList::new(tensor.dtype(), element_shape, lengths.len() as i64);
        let sizes: Vec<usize> = lengths.iter().map(|&l| l.max(0) as usize).collect();
        let pieces = kernels.split(tensor, &sizes, 0)?;
        for (index, piece) in pieces.into_iter().enumerate() {
            list.set_item(index as i64, piece)?;
        }
        Ok(list)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    fn check_dtype(&self, dtype: Option<DType>) -> Result<()> {
        if let Some(dtype) = dtype {
            if dtype != self.dtype {
                return Err(TensorListError::DTypeMismatch {
                    expected: dtype,
                    actual: self.dtype,
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_element(&mut self, tensor: &Tensor) -> Result<()> {
        if tensor.dtype() != self.dtype {
            return Err(TensorListError::DTypeMismatch {
                expected: tensor.dtype(),
                actual: self.dtype,
            }
            .into());
        }
        if self.element_shape.is_empty() && self.elements.iter().all(Option::is_none) {
            self.element_shape = tensor.shape().dims().iter().map(|&d| d as i64).collect();
        }
        if !self.element_shape.is_empty() && !tensor.shape().is_compatible_with(&self.element_shape)
        {
            return Err(TensorListError::ShapeMismatch {
                expected: self.element_shape.clone(),
                actual: tensor.shape().clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Places `tensor` at `index`, growing the list as needed. A previously
    /// set element at the same index is disposed.
    pub fn set_item(&mut self, index: i64, tensor: Tensor) -> Result<()> {
        if index < 0 || (self.max_num_elements != -1 && index >= self.max_num_elements) {
            return Err(TensorListError::SetOutOfBounds {
                index,
                max: self.max_num_elements,
            }
            .into());
        }
        self.check_element(&tensor)?;
        let index = index as usize;
        if self.elements.len() <= index {
            self.elements.resize_with(index + 1, || None);
        }
        if let Some(old) = self.elements[index].replace(tensor) {
            old.dispose();
        }
        Ok(())
    }

    pub fn get_item(&self, index: i64, dtype: Option<DType>) -> Result<Tensor> {
        self.check_dtype(dtype)?;
        if index < 0 || index as usize >= self.elements.len() {
            return Err(TensorListError::IndexOutOfBounds {
                index,
                size: self.elements.len(),
            }
            .into());
        }
        match &self.elements[index as usize] {
            Some(tensor) => Ok(tensor.clone()),
            None => Err(TensorListError::ElementUnset(index as usize).into()),
        }
    }

    pub fn push_back(&mut self, tensor: Tensor) -> Result<()> {
        if self.max_num_elements != -1 && self.elements.len() as i64 == self.max_num_elements {
            return Err(TensorListError::Full(self.max_num_elements).into());
        }
        self.check_element(&tensor)?;
        self.elements.push(Some(tensor));
        Ok(())
    }

    pub fn pop_back(&mut self, dtype: Option<DType>) -> Result<Tensor> {
        self.check_dtype(dtype)?;
        match self.elements.pop() {
            Some(Some(tensor)) => Ok(tensor),
            Some(None) => Err(TensorListError::ElementUnset(self.elements.len()).into()),
            None => Err(TensorListError::EmptyList.into()),
        }
    }

    fn element(&self, index: i64) -> Result<&Tensor> {
        match self.elements.get(index as usize) {
            Some(Some(tensor)) if index >= 0 => Ok(tensor),
            Some(None) => Err(TensorListError::ElementUnset(index as usize).into()),
            _ => Err(TensorListError::IndexOutOfBounds {
                index,
                size: self.elements.len(),
            }
            .into()),
        }
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

    fn stack_elements(&self, tensors: &[&Tensor], kernels: &dyn Kernels) -> Result<Tensor> {
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

    /// Stacks every element along a new leading axis. With `num_elements`
    /// other than `-1` the list must hold exactly that many elements.
    pub fn stack(
        &self,
        num_elements: i64,
        dtype: Option<DType>,
        kernels: &dyn Kernels,
    ) -> Result<Tensor> {
        self.check_dtype(dtype)?;
        if num_elements != -1 && self.elements.len() as i64 != num_elements {
            return Err(TensorListError::WrongSize {
                expected: num_elements,
                actual: self.elements.len(),
            }
            .into());
        }
        if self.elements.is_empty() {
            return self.empty_batch();
        }
        let tensors = (0..self.elements.len() as i64)
            .map(|i| self.element(i))
            .collect::<Result<Vec<_>>>()?;
        self.stack_elements(&tensors, kernels)
    }

    /// Stacks the selected elements along a new leading axis. Indices beyond
    /// the current size are dropped rather than rejected.
    pub fn gather(
        &self,
        indices: &[i64],
        dtype: Option<DType>,
        kernels: &dyn Kernels,
    ) -> Result<Tensor> {
        self.check_dtype(dtype)?;
        let indices: Vec<i64> = indices.iter().copied().take(self.size()).collect();
        if indices.is_empty() {
            return self.empty_batch();
        }
        let tensors = indices.iter().map(|&i| self.element(i)).collect::<Result<Vec<_>>>()?;
        self.stack_elements(&tensors, kernels)
    }

    /// Concatenates every element along the existing leading axis.
    pub fn concat(&self, dtype: Option<DType>, kernels: &dyn Kernels) -> Result<Tensor> {
        self.check_dtype(dtype)?;
        if self.elements.is_empty() {
            return self.empty_batch();
        }
        let tensors = (0..self.elements.len() as i64)
            .map(|i| self.element(i).cloned())
            .collect::<Result<Vec<_>>>()?;
        kernels.concat(&tensors, 0)
    }

    /// Disposes every stored element not in `keep_ids` and empties the list.
    pub fn clear(&mut self, keep_ids: &HashSet<usize>) {
        for tensor in self.elements.drain(..).flatten() {
            if !keep_ids.contains(&tensor.id()) {
                tensor.dispose();
            }
        }
    }
}
