//! Naive kernel implementations.
//!
//! Numeric work happens in f64 regardless of the tensor dtype and is cast
//! back when the output is built. That costs precision guarantees nothing in
//! this crate needs, and keeps every kernel a plain loop over indices.

use anyhow::{anyhow, bail, ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use graphrt::kernels::{
    BinaryOp, CompareOp, Kernels, LogicalOp, PoolKind, ReduceOp, ResizeMethod, UnaryOp,
};
use graphrt::tensor::{broadcast_shape, DType, Shape, Tensor, TensorData};

/// The reference backend. Random ops draw from an internal generator so a
/// seeded instance is fully deterministic.
pub struct CpuKernels {
    rng: Mutex<StdRng>,
}

impl CpuKernels {
    pub fn new() -> Self {
        CpuKernels { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn seeded(seed: u64) -> Self {
        CpuKernels { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for CpuKernels {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads any tensor as f64 values; bools become 0.0 / 1.0.
fn values(t: &Tensor) -> Result<Vec<f64>> {
    Ok(match t.data()? {
        TensorData::F32(v) => v.iter().map(|&x| x as f64).collect(),
        TensorData::I32(v) => v.iter().map(|&x| x as f64).collect(),
        TensorData::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
    })
}

fn numeric_values(t: &Tensor) -> Result<Vec<f64>> {
    ensure!(t.dtype() != DType::Bool, "expected a numeric tensor, got bool");
    values(t)
}

fn bool_values(t: &Tensor) -> Result<Vec<bool>> {
    match t.data()? {
        TensorData::Bool(v) => Ok(v.to_vec()),
        other => bail!("expected a bool tensor, got {}", other.dtype()),
    }
}

/// Builds a tensor of `dtype` from f64 values, truncating for int32 and
/// treating non-zero as true for bool.
fn build(dtype: DType, dims: Vec<usize>, data: Vec<f64>) -> Result<Tensor> {
    match dtype {
        DType::Float32 => Tensor::from_f32(dims, data.iter().map(|&x| x as f32).collect()),
        DType::Int32 => Tensor::from_i32(dims, data.iter().map(|&x| x as i32).collect()),
        DType::Bool => Tensor::from_bool(dims, data.iter().map(|&x| x != 0.0).collect()),
    }
}

fn promote(a: DType, b: DType) -> Result<DType> {
    ensure!(a != DType::Bool && b != DType::Bool, "arithmetic over bool tensors");
    if a == DType::Float32 || b == DType::Float32 {
        Ok(DType::Float32)
    } else {
        Ok(DType::Int32)
    }
}

fn unravel(mut flat: usize, dims: &[usize]) -> Vec<usize> {
    let mut index = vec![0usize; dims.len()];
    for i in (0..dims.len()).rev() {
        index[i] = flat % dims[i];
        flat /= dims[i];
    }
    index
}

fn ravel(index: &[usize], dims: &[usize]) -> usize {
    let mut flat = 0;
    for (i, &d) in dims.iter().enumerate() {
        flat = flat * d + index[i];
    }
    flat
}

/// Maps an output multi-index onto a flat index of a broadcast operand,
/// aligning trailing dimensions and pinning size-1 dimensions to zero.
fn broadcast_src(out_index: &[usize], src_dims: &[usize]) -> usize {
    let offset = out_index.len() - src_dims.len();
    let mut flat = 0;
    for (i, &d) in src_dims.iter().enumerate() {
        let coord = if d == 1 { 0 } else { out_index[offset + i] };
        flat = flat * d + coord;
    }
    flat
}

/// Broadcasts two operands to their common shape, as f64.
fn broadcast_values(a: &Tensor, b: &Tensor) -> Result<(Vec<usize>, Vec<f64>, Vec<f64>)> {
    let shape = broadcast_shape(a.shape(), b.shape())
        .ok_or_else(|| anyhow!("cannot broadcast {} with {}", a.shape(), b.shape()))?;
    let dims = shape.dims().to_vec();
    let av = values(a)?;
    let bv = values(b)?;
    let n = shape.num_elements();
    let mut out_a = Vec::with_capacity(n);
    let mut out_b = Vec::with_capacity(n);
    for flat in 0..n {
        let index = unravel(flat, &dims);
        out_a.push(av[broadcast_src(&index, a.shape().dims())]);
        out_b.push(bv[broadcast_src(&index, b.shape().dims())]);
    }
    Ok((dims, out_a, out_b))
}

fn reduced_dims(dims: &[usize], axes: &[usize], keep_dims: bool) -> Vec<usize> {
    dims.iter()
        .enumerate()
        .filter_map(|(i, &d)| {
            if axes.contains(&i) {
                if keep_dims {
                    Some(1)
                } else {
                    None
                }
            } else {
                Some(d)
            }
        })
        .collect()
}

/// SAME/VALID output extent and the padding applied before the window.
fn conv_extent(input: usize, window: usize, stride: usize, same: bool) -> (usize, usize) {
    if same {
        let out = input.div_ceil(stride);
        let needed = (out - 1) * stride + window;
        let pad_total = needed.saturating_sub(input);
        (out, pad_total / 2)
    } else {
        ((input - window) / stride + 1, 0)
    }
}

impl Kernels for CpuKernels {
    fn unary(&self, op: UnaryOp, x: &Tensor) -> Result<Tensor> {
        const SELU_SCALE: f64 = 1.0507009873554805;
        const SELU_ALPHA: f64 = 1.6732632423543772;
        let data = numeric_values(x)?
            .into_iter()
            .map(|v| match op {
                UnaryOp::Abs => v.abs(),
                UnaryOp::Neg => -v,
                UnaryOp::Exp => v.exp(),
                UnaryOp::Log => v.ln(),
                UnaryOp::Sqrt => v.sqrt(),
                UnaryOp::Rsqrt => 1.0 / v.sqrt(),
                UnaryOp::Square => v * v,
                UnaryOp::Reciprocal => 1.0 / v,
                UnaryOp::Relu => v.max(0.0),
                UnaryOp::Relu6 => v.clamp(0.0, 6.0),
                UnaryOp::Elu => {
                    if v > 0.0 {
                        v
                    } else {
                        v.exp() - 1.0
                    }
                }
                UnaryOp::Selu => {
                    if v > 0.0 {
                        SELU_SCALE * v
                    } else {
                        SELU_SCALE * SELU_ALPHA * (v.exp() - 1.0)
                    }
                }
                UnaryOp::Sigmoid => 1.0 / (1.0 + (-v).exp()),
                UnaryOp::Tanh => v.tanh(),
                UnaryOp::Floor => v.floor(),
                UnaryOp::Ceil => v.ceil(),
                UnaryOp::Round => v.round(),
                UnaryOp::Sign => {
                    if v > 0.0 {
                        1.0
                    } else if v < 0.0 {
                        -1.0
                    } else {
                        0.0
                    }
                }
            })
            .collect();
        build(x.dtype(), x.shape().dims().to_vec(), data)
    }

    fn binary(&self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let dtype = promote(a.dtype(), b.dtype())?;
        let (dims, av, bv) = broadcast_values(a, b)?;
        let data = av
            .into_iter()
            .zip(bv)
            .map(|(x, y)| match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                BinaryOp::FloorDiv => (x / y).floor(),
                BinaryOp::Mod => x - (x / y).floor() * y,
                BinaryOp::Pow => x.powf(y),
                BinaryOp::Maximum => x.max(y),
                BinaryOp::Minimum => x.min(y),
                BinaryOp::SquaredDifference => (x - y) * (x - y),
            })
            .collect();
        build(dtype, dims, data)
    }

    fn compare(&self, op: CompareOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let (dims, av, bv) = broadcast_values(a, b)?;
        let data = av
            .into_iter()
            .zip(bv)
            .map(|(x, y)| {
                let hit = match op {
                    CompareOp::Equal => x == y,
                    CompareOp::NotEqual => x != y,
                    CompareOp::Greater => x > y,
                    CompareOp::GreaterEqual => x >= y,
                    CompareOp::Less => x < y,
                    CompareOp::LessEqual => x <= y,
                };
                if hit {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        build(DType::Bool, dims, data)
    }

    fn logical(&self, op: LogicalOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        ensure!(
            a.dtype() == DType::Bool && b.dtype() == DType::Bool,
            "logical ops need bool operands"
        );
        let (dims, av, bv) = broadcast_values(a, b)?;
        let data = av
            .into_iter()
            .zip(bv)
            .map(|(x, y)| {
                let hit = match op {
                    LogicalOp::And => x != 0.0 && y != 0.0,
                    LogicalOp::Or => x != 0.0 || y != 0.0,
                };
                if hit {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        build(DType::Bool, dims, data)
    }

    fn logical_not(&self, x: &Tensor) -> Result<Tensor> {
        let data = bool_values(x)?.into_iter().map(|v| !v).collect();
        Tensor::from_bool(x.shape().dims().to_vec(), data)
    }

    fn select(&self, cond: &Tensor, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        ensure!(cond.dtype() == DType::Bool, "select condition must be bool");
        ensure!(a.dtype() == b.dtype(), "select branches must share a dtype");
        let branch_shape = broadcast_shape(a.shape(), b.shape())
            .ok_or_else(|| anyhow!("cannot broadcast {} with {}", a.shape(), b.shape()))?;
        let shape = broadcast_shape(cond.shape(), &branch_shape).ok_or_else(|| {
            anyhow!("cannot broadcast condition {} with {}", cond.shape(), branch_shape)
        })?;
        let dims = shape.dims().to_vec();
        let cv = values(cond)?;
        let av = values(a)?;
        let bv = values(b)?;
        let mut data = Vec::with_capacity(shape.num_elements());
        for flat in 0..shape.num_elements() {
            let index = unravel(flat, &dims);
            let taken = cv[broadcast_src(&index, cond.shape().dims())] != 0.0;
            let src = if taken { &av } else { &bv };
            let src_dims = if taken { a.shape().dims() } else { b.shape().dims() };
            data.push(src[broadcast_src(&index, src_dims)]);
        }
        build(a.dtype(), dims, data)
    }

    fn clip_by_value(&self, x: &Tensor, min: f32, max: f32) -> Result<Tensor> {
        let data =
            numeric_values(x)?.into_iter().map(|v| v.clamp(min as f64, max as f64)).collect();
        build(x.dtype(), x.shape().dims().to_vec(), data)
    }

    fn matmul(
        &self,
        a: &Tensor,
        b: &Tensor,
        transpose_a: bool,
        transpose_b: bool,
    ) -> Result<Tensor> {
        let dtype = promote(a.dtype(), b.dtype())?;
        ensure!(
            (2..=3).contains(&a.rank()) && (2..=3).contains(&b.rank()),
            "matmul expects rank 2 or 3 operands, got {} and {}",
            a.shape(),
            b.shape()
        );
        let a_dims = a.shape().dims();
        let b_dims = b.shape().dims();
        let batch_a = if a.rank() == 3 { a_dims[0] } else { 1 };
        let batch_b = if b.rank() == 3 { b_dims[0] } else { 1 };
        ensure!(
            batch_a == batch_b || batch_a == 1 || batch_b == 1,
            "matmul batch dimensions {batch_a} and {batch_b} do not broadcast"
        );
        let batch = batch_a.max(batch_b);
        let (m, ka) = {
            let rows = a_dims[a.rank() - 2];
            let cols = a_dims[a.rank() - 1];
            if transpose_a {
                (cols, rows)
            } else {
                (rows, cols)
            }
        };
        let (kb, n) = {
            let rows = b_dims[b.rank() - 2];
            let cols = b_dims[b.rank() - 1];
            if transpose_b {
                (cols, rows)
            } else {
                (rows, cols)
            }
        };
        ensure!(ka == kb, "matmul inner dimensions {ka} and {kb} do not agree");

        let av = numeric_values(a)?;
        let bv = numeric_values(b)?;
        let (a_rows, a_cols) = (a_dims[a.rank() - 2], a_dims[a.rank() - 1]);
        let (b_rows, b_cols) = (b_dims[b.rank() - 2], b_dims[b.rank() - 1]);
        let a_batch_len = a_rows * a_cols;
        let b_batch_len = b_rows * b_cols;

        let mut data = vec![0.0f64; batch * m * n];
        for batch_i in 0..batch {
            let a_off = if batch_a == 1 { 0 } else { batch_i * a_batch_len };
            let b_off = if batch_b == 1 { 0 } else { batch_i * b_batch_len };
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0;
                    for k in 0..ka {
                        let lhs = if transpose_a {
                            av[a_off + k * a_cols + i]
                        } else {
                            av[a_off + i * a_cols + k]
                        };
                        let rhs = if transpose_b {
                            bv[b_off + j * b_cols + k]
                        } else {
                            bv[b_off + k * b_cols + j]
                        };
                        acc += lhs * rhs;
                    }
                    data[(batch_i * m + i) * n + j] = acc;
                }
            }
        }
        let dims =
            if a.rank() == 2 && b.rank() == 2 { vec![m, n] } else { vec![batch, m, n] };
        build(dtype, dims, data)
    }

    fn transpose(&self, x: &Tensor, perm: &[usize]) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(perm.len() == dims.len(), "perm must name every axis once");
        let mut seen = vec![false; dims.len()];
        for &p in perm {
            ensure!(p < dims.len() && !seen[p], "invalid permutation {perm:?}");
            seen[p] = true;
        }
        let out_dims: Vec<usize> = perm.iter().map(|&p| dims[p]).collect();
        let xv = values(x)?;
        let mut data = vec![0.0f64; xv.len()];
        for (flat, slot) in data.iter_mut().enumerate() {
            let out_index = unravel(flat, &out_dims);
            let mut in_index = vec![0usize; dims.len()];
            for (o, &p) in perm.iter().enumerate() {
                in_index[p] = out_index[o];
            }
            *slot = xv[ravel(&in_index, dims)];
        }
        build(x.dtype(), out_dims, data)
    }

    fn reduce(&self, op: ReduceOp, x: &Tensor, axes: &[usize], keep_dims: bool) -> Result<Tensor> {
        let dims = x.shape().dims();
        for &axis in axes {
            ensure!(axis < dims.len().max(1), "reduce axis {axis} out of range for {}", x.shape());
        }
        let boolean = matches!(op, ReduceOp::All | ReduceOp::Any);
        let out_dtype = if boolean { DType::Bool } else { x.dtype() };
        let xv = if boolean { values(x)? } else { numeric_values(x)? };

        let kept_dims = reduced_dims(dims, axes, true);
        let out_len: usize = kept_dims.iter().product::<usize>().max(1);
        let init = match op {
            ReduceOp::Sum | ReduceOp::Mean => 0.0,
            ReduceOp::Prod => 1.0,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::Min => f64::INFINITY,
            ReduceOp::All => 1.0,
            ReduceOp::Any => 0.0,
        };
        let mut acc = vec![init; out_len];
        let mut counts = vec![0usize; out_len];
        for (flat, &v) in xv.iter().enumerate() {
            let mut index = unravel(flat, dims);
            for &axis in axes {
                index[axis] = 0;
            }
            let out = ravel(&index, &kept_dims);
            counts[out] += 1;
            acc[out] = match op {
                ReduceOp::Sum | ReduceOp::Mean => acc[out] + v,
                ReduceOp::Prod => acc[out] * v,
                ReduceOp::Max => acc[out].max(v),
                ReduceOp::Min => acc[out].min(v),
                ReduceOp::All => {
                    if acc[out] != 0.0 && v != 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
                ReduceOp::Any => {
                    if acc[out] != 0.0 || v != 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
        }
        if op == ReduceOp::Mean {
            for (a, &c) in acc.iter_mut().zip(&counts) {
                if c > 0 {
                    *a /= c as f64;
                }
            }
        }
        build(out_dtype, reduced_dims(dims, axes, keep_dims), acc)
    }

    fn arg_extreme(&self, x: &Tensor, axis: usize, largest: bool) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(axis < dims.len(), "axis {axis} out of range for {}", x.shape());
        ensure!(dims[axis] > 0, "cannot reduce an empty axis");
        let xv = numeric_values(x)?;
        let out_dims = reduced_dims(dims, &[axis], false);
        let kept_dims = reduced_dims(dims, &[axis], true);
        let out_len = kept_dims.iter().product::<usize>().max(1);
        let mut best = vec![(0i32, if largest { f64::NEG_INFINITY } else { f64::INFINITY }); out_len];
        for (flat, &v) in xv.iter().enumerate() {
            let mut index = unravel(flat, dims);
            let pos = index[axis] as i32;
            index[axis] = 0;
            let out = ravel(&index, &kept_dims);
            let better = if largest { v > best[out].1 } else { v < best[out].1 };
            if better {
                best[out] = (pos, v);
            }
        }
        Tensor::from_i32(out_dims, best.into_iter().map(|(i, _)| i).collect())
    }

    fn top_k(&self, x: &Tensor, k: usize, sorted: bool) -> Result<(Tensor, Tensor)> {
        let _ = sorted;
        let dims = x.shape().dims();
        ensure!(!dims.is_empty(), "top_k needs at least rank 1");
        let last = dims[dims.len() - 1];
        ensure!(k <= last, "k {k} larger than the last dimension {last}");
        let xv = numeric_values(x)?;
        let rows = xv.len() / last.max(1);
        let mut out_values = Vec::with_capacity(rows * k);
        let mut out_indices = Vec::with_capacity(rows * k);
        for row in 0..rows {
            let slice = &xv[row * last..(row + 1) * last];
            let mut order: Vec<usize> = (0..last).collect();
            order.sort_by(|&i, &j| {
                slice[j].partial_cmp(&slice[i]).unwrap_or(std::cmp::Ordering::Equal).then(i.cmp(&j))
            });
            for &i in order.iter().take(k) {
                out_values.push(slice[i]);
                out_indices.push(i as i32);
            }
        }
        let mut out_dims = dims.to_vec();
        let last_axis = out_dims.len() - 1;
        out_dims[last_axis] = k;
        let values_t = build(x.dtype(), out_dims.clone(), out_values)?;
        let indices_t = Tensor::from_i32(out_dims, out_indices)?;
        Ok((values_t, indices_t))
    }

    fn softmax(&self, x: &Tensor, log: bool) -> Result<Tensor> {
        ensure!(x.dtype() == DType::Float32, "softmax expects float32");
        let dims = x.shape().dims();
        ensure!(!dims.is_empty(), "softmax needs at least rank 1");
        let last = dims[dims.len() - 1];
        let xv = values(x)?;
        let mut data = vec![0.0f64; xv.len()];
        for row in 0..xv.len() / last.max(1) {
            let slice = &xv[row * last..(row + 1) * last];
            let max = slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = slice.iter().map(|&v| (v - max).exp()).sum();
            for (i, &v) in slice.iter().enumerate() {
                data[row * last + i] =
                    if log { v - max - sum.ln() } else { (v - max).exp() / sum };
            }
        }
        build(DType::Float32, dims.to_vec(), data)
    }

    fn concat(&self, tensors: &[Tensor], axis: usize) -> Result<Tensor> {
        ensure!(!tensors.is_empty(), "concat of zero tensors");
        let first = &tensors[0];
        let rank = first.rank();
        ensure!(axis < rank.max(1), "concat axis {axis} out of range for rank {rank}");
        let mut axis_total = 0;
        for t in tensors {
            ensure!(t.dtype() == first.dtype(), "concat operands must share a dtype");
            ensure!(t.rank() == rank, "concat operands must share a rank");
            for (i, (&a, &b)) in t.shape().dims().iter().zip(first.shape().dims()).enumerate() {
                ensure!(
                    i == axis || a == b,
                    "concat operand shapes differ outside axis {axis}: {} vs {}",
                    t.shape(),
                    first.shape()
                );
            }
            axis_total += t.shape().dims().get(axis).copied().unwrap_or(1);
        }
        let mut out_dims = first.shape().dims().to_vec();
        if out_dims.is_empty() {
            out_dims = vec![axis_total];
        } else {
            out_dims[axis] = axis_total;
        }
        let outer: usize = out_dims[..axis].iter().product();
        let inner: usize = out_dims[axis + 1..].iter().product();
        let mut data = Vec::with_capacity(out_dims.iter().product());
        let all_values: Vec<Vec<f64>> = tensors.iter().map(values).collect::<Result<_>>()?;
        for o in 0..outer {
            for (t, tv) in tensors.iter().zip(&all_values) {
                let mid = t.shape().dims().get(axis).copied().unwrap_or(1);
                let start = o * mid * inner;
                data.extend_from_slice(&tv[start..start + mid * inner]);
            }
        }
        build(first.dtype(), out_dims, data)
    }

    fn slice(&self, x: &Tensor, begin: &[usize], size: &[usize]) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(
            begin.len() == dims.len() && size.len() == dims.len(),
            "slice needs one begin/size pair per dimension"
        );
        for i in 0..dims.len() {
            ensure!(
                begin[i] + size[i] <= dims[i],
                "slice [{}, {}) exceeds dimension {} of size {}",
                begin[i],
                begin[i] + size[i],
                i,
                dims[i]
            );
        }
        let xv = values(x)?;
        let out_len: usize = size.iter().product();
        let mut data = Vec::with_capacity(out_len);
        for flat in 0..out_len {
            let out_index = unravel(flat, size);
            let in_index: Vec<usize> =
                out_index.iter().zip(begin).map(|(&o, &b)| o + b).collect();
            data.push(xv[ravel(&in_index, dims)]);
        }
        build(x.dtype(), size.to_vec(), data)
    }

    fn split(&self, x: &Tensor, sizes: &[usize], axis: usize) -> Result<Vec<Tensor>> {
        let dims = x.shape().dims();
        ensure!(axis < dims.len(), "split axis {axis} out of range for {}", x.shape());
        let total: usize = sizes.iter().sum();
        ensure!(
            total == dims[axis],
            "split sizes sum to {total}, but axis {axis} has {} elements",
            dims[axis]
        );
        let mut begin = vec![0usize; dims.len()];
        let mut out = Vec::with_capacity(sizes.len());
        for &size in sizes {
            let mut piece_size = dims.to_vec();
            piece_size[axis] = size;
            out.push(self.slice(x, &begin, &piece_size)?);
            begin[axis] += size;
        }
        Ok(out)
    }

    fn gather(&self, x: &Tensor, indices: &Tensor, axis: usize) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(axis < dims.len(), "gather axis {axis} out of range for {}", x.shape());
        let idx = indices.int_vec()?;
        for &i in &idx {
            ensure!(
                i >= 0 && (i as usize) < dims[axis],
                "gather index {i} out of range for axis {axis} of size {}",
                dims[axis]
            );
        }
        let mut out_dims = dims[..axis].to_vec();
        out_dims.extend_from_slice(indices.shape().dims());
        out_dims.extend_from_slice(&dims[axis + 1..]);
        let xv = values(x)?;
        let inner: usize = dims[axis + 1..].iter().product();
        let outer: usize = dims[..axis].iter().product();
        let mut data = Vec::with_capacity(outer * idx.len() * inner);
        for o in 0..outer {
            for &i in &idx {
                let start = (o * dims[axis] + i as usize) * inner;
                data.extend_from_slice(&xv[start..start + inner]);
            }
        }
        build(x.dtype(), out_dims, data)
    }

    fn tile(&self, x: &Tensor, reps: &[usize]) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(reps.len() == dims.len(), "tile needs one repetition count per dimension");
        let out_dims: Vec<usize> = dims.iter().zip(reps).map(|(&d, &r)| d * r).collect();
        let xv = values(x)?;
        let out_len: usize = out_dims.iter().product();
        let mut data = Vec::with_capacity(out_len);
        for flat in 0..out_len {
            let out_index = unravel(flat, &out_dims);
            let in_index: Vec<usize> =
                out_index.iter().zip(dims).map(|(&o, &d)| if d == 0 { 0 } else { o % d }).collect();
            data.push(xv[ravel(&in_index, dims)]);
        }
        build(x.dtype(), out_dims, data)
    }

    fn reverse(&self, x: &Tensor, axes: &[usize]) -> Result<Tensor> {
        let dims = x.shape().dims();
        for &axis in axes {
            ensure!(axis < dims.len(), "reverse axis {axis} out of range for {}", x.shape());
        }
        let xv = values(x)?;
        let mut data = vec![0.0f64; xv.len()];
        for (flat, slot) in data.iter_mut().enumerate() {
            let mut index = unravel(flat, dims);
            for &axis in axes {
                index[axis] = dims[axis] - 1 - index[axis];
            }
            *slot = xv[ravel(&index, dims)];
        }
        build(x.dtype(), dims.to_vec(), data)
    }

    fn pad(&self, x: &Tensor, paddings: &[(usize, usize)], constant: f32) -> Result<Tensor> {
        let dims = x.shape().dims();
        ensure!(paddings.len() == dims.len(), "pad needs one before/after pair per dimension");
        let out_dims: Vec<usize> =
            dims.iter().zip(paddings).map(|(&d, &(b, a))| d + b + a).collect();
        let xv = values(x)?;
        let out_len: usize = out_dims.iter().product();
        let mut data = vec![constant as f64; out_len];
        for (flat, slot) in data.iter_mut().enumerate() {
            let out_index = unravel(flat, &out_dims);
            let mut in_index = Vec::with_capacity(dims.len());
            let mut interior = true;
            for ((&o, &(before, _)), &d) in out_index.iter().zip(paddings).zip(dims) {
                if o < before || o >= before + d {
                    interior = false;
                    break;
                }
                in_index.push(o - before);
            }
            if interior {
                *slot = xv[ravel(&in_index, dims)];
            }
        }
        build(x.dtype(), out_dims, data)
    }

    fn cast(&self, x: &Tensor, dtype: DType) -> Result<Tensor> {
        build(dtype, x.shape().dims().to_vec(), values(x)?)
    }

    fn fill(&self, shape: &Shape, value: f32, dtype: DType) -> Result<Tensor> {
        build(dtype, shape.dims().to_vec(), vec![value as f64; shape.num_elements()])
    }

    fn range(&self, start: f32, stop: f32, step: f32, dtype: DType) -> Result<Tensor> {
        ensure!(step != 0.0, "range step must be non-zero");
        ensure!(
            (step > 0.0) == (stop >= start) || start == stop,
            "range from {start} to {stop} never terminates with step {step}"
        );
        let count = ((stop - start) as f64 / step as f64).ceil().max(0.0) as usize;
        let data: Vec<f64> =
            (0..count).map(|i| start as f64 + i as f64 * step as f64).collect();
        build(dtype, vec![count], data)
    }

    fn random_uniform(&self, shape: &Shape, min: f32, max: f32) -> Result<Tensor> {
        ensure!(min <= max, "random_uniform bounds are inverted");
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        let data: Vec<f32> =
            (0..shape.num_elements()).map(|_| rng.gen::<f32>() * (max - min) + min).collect();
        Tensor::from_f32(shape.dims().to_vec(), data)
    }

    fn random_standard_normal(&self, shape: &Shape) -> Result<Tensor> {
        let mut rng = self.rng.lock().expect("rng mutex poisoned");
        let data: Vec<f32> = (0..shape.num_elements())
            .map(|_| {
                // Box-Muller transform over two uniforms.
                let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
                let u2: f64 = rng.gen();
                ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
            })
            .collect();
        Tensor::from_f32(shape.dims().to_vec(), data)
    }

    fn conv2d(
        &self,
        x: &Tensor,
        filter: &Tensor,
        strides: [usize; 2],
        same_pad: bool,
    ) -> Result<Tensor> {
        ensure!(x.rank() == 4, "conv2d input must be NHWC, got {}", x.shape());
        ensure!(filter.rank() == 4, "conv2d filter must be HWIO, got {}", filter.shape());
        let [n, h, w, c_in] = [
            x.shape().dims()[0],
            x.shape().dims()[1],
            x.shape().dims()[2],
            x.shape().dims()[3],
        ];
        let [kh, kw, f_in, c_out] = [
            filter.shape().dims()[0],
            filter.shape().dims()[1],
            filter.shape().dims()[2],
            filter.shape().dims()[3],
        ];
        ensure!(c_in == f_in, "conv2d channel mismatch: input {c_in}, filter {f_in}");
        ensure!(strides[0] > 0 && strides[1] > 0, "conv2d strides must be positive");
        let (out_h, pad_top) = conv_extent(h, kh, strides[0], same_pad);
        let (out_w, pad_left) = conv_extent(w, kw, strides[1], same_pad);

        let xv = numeric_values(x)?;
        let fv = numeric_values(filter)?;
        let mut data = vec![0.0f64; n * out_h * out_w * c_out];
        for b in 0..n {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    for oc in 0..c_out {
                        let mut acc = 0.0;
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let iy = (oy * strides[0] + ky) as isize - pad_top as isize;
                                let ix = (ox * strides[1] + kx) as isize - pad_left as isize;
                                if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                                    continue;
                                }
                                for ic in 0..c_in {
                                    let xi = ((b * h + iy as usize) * w + ix as usize) * c_in + ic;
                                    let fi = ((ky * kw + kx) * c_in + ic) * c_out + oc;
                                    acc += xv[xi] * fv[fi];
                                }
                            }
                        }
                        data[((b * out_h + oy) * out_w + ox) * c_out + oc] = acc;
                    }
                }
            }
        }
        build(DType::Float32, vec![n, out_h, out_w, c_out], data)
    }

    fn pool2d(
        &self,
        x: &Tensor,
        kind: PoolKind,
        window: [usize; 2],
        strides: [usize; 2],
        same_pad: bool,
    ) -> Result<Tensor> {
        ensure!(x.rank() == 4, "pool2d input must be NHWC, got {}", x.shape());
        let [n, h, w, c] = [
            x.shape().dims()[0],
            x.shape().dims()[1],
            x.shape().dims()[2],
            x.shape().dims()[3],
        ];
        ensure!(strides[0] > 0 && strides[1] > 0, "pool2d strides must be positive");
        let (out_h, pad_top) = conv_extent(h, window[0], strides[0], same_pad);
        let (out_w, pad_left) = conv_extent(w, window[1], strides[1], same_pad);

        let xv = numeric_values(x)?;
        let mut data = vec![0.0f64; n * out_h * out_w * c];
        for b in 0..n {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    for ch in 0..c {
                        let mut acc = match kind {
                            PoolKind::Max => f64::NEG_INFINITY,
                            PoolKind::Avg => 0.0,
                        };
                        let mut count = 0usize;
                        for ky in 0..window[0] {
                            for kx in 0..window[1] {
                                let iy = (oy * strides[0] + ky) as isize - pad_top as isize;
                                let ix = (ox * strides[1] + kx) as isize - pad_left as isize;
                                if iy < 0 || ix < 0 || iy as usize >= h || ix as usize >= w {
                                    continue;
                                }
                                let v = xv[((b * h + iy as usize) * w + ix as usize) * c + ch];
                                match kind {
                                    PoolKind::Max => acc = acc.max(v),
                                    PoolKind::Avg => acc += v,
                                }
                                count += 1;
                            }
                        }
                        // Average pooling divides by the visible window only.
                        if kind == PoolKind::Avg && count > 0 {
                            acc /= count as f64;
                        }
                        data[((b * out_h + oy) * out_w + ox) * c + ch] = acc;
                    }
                }
            }
        }
        build(x.dtype(), vec![n, out_h, out_w, c], data)
    }

    fn resize2d(
        &self,
        x: &Tensor,
        method: ResizeMethod,
        size: [usize; 2],
        align_corners: bool,
    ) -> Result<Tensor> {
        ensure!(x.rank() == 4, "resize2d input must be NHWC, got {}", x.shape());
        let [n, h, w, c] = [
            x.shape().dims()[0],
            x.shape().dims()[1],
            x.shape().dims()[2],
            x.shape().dims()[3],
        ];
        let [out_h, out_w] = size;
        ensure!(out_h > 0 && out_w > 0, "resize2d target size must be positive");
        let scale = |input: usize, output: usize| -> f64 {
            if align_corners && output > 1 {
                (input - 1) as f64 / (output - 1) as f64
            } else {
                input as f64 / output as f64
            }
        };
        let scale_y = scale(h, out_h);
        let scale_x = scale(w, out_w);
        let xv = numeric_values(x)?;
        let at = |b: usize, y: usize, x_: usize, ch: usize| xv[((b * h + y) * w + x_) * c + ch];

        let mut data = vec![0.0f64; n * out_h * out_w * c];
        for b in 0..n {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let src_y = oy as f64 * scale_y;
                    let src_x = ox as f64 * scale_x;
                    for ch in 0..c {
                        let v = match method {
                            ResizeMethod::NearestNeighbor => {
                                let y = if align_corners {
                                    src_y.round() as usize
                                } else {
                                    src_y.floor() as usize
                                }
                                .min(h - 1);
                                let xcol = if align_corners {
                                    src_x.round() as usize
                                } else {
                                    src_x.floor() as usize
                                }
                                .min(w - 1);
                                at(b, y, xcol, ch)
                            }
                            ResizeMethod::Bilinear => {
                                let y0 = src_y.floor() as usize;
                                let x0 = src_x.floor() as usize;
                                let y1 = (y0 + 1).min(h - 1);
                                let x1 = (x0 + 1).min(w - 1);
                                let dy = src_y - y0 as f64;
                                let dx = src_x - x0 as f64;
                                let top = at(b, y0, x0, ch) * (1.0 - dx) + at(b, y0, x1, ch) * dx;
                                let bottom =
                                    at(b, y1, x0, ch) * (1.0 - dx) + at(b, y1, x1, ch) * dx;
                                top * (1.0 - dy) + bottom * dy
                            }
                        };
                        data[((b * out_h + oy) * out_w + ox) * c + ch] = v;
                    }
                }
            }
        }
        build(x.dtype(), vec![n, out_h, out_w, c], data)
    }

    fn where_true(&self, cond: &Tensor) -> Result<Tensor> {
        let dims = cond.shape().dims().to_vec();
        let rank = dims.len().max(1);
        let cv = values(cond)?;
        let mut coords: Vec<i32> = Vec::new();
        let mut count = 0usize;
        for (flat, &v) in cv.iter().enumerate() {
            if v != 0.0 {
                count += 1;
                if dims.is_empty() {
                    coords.push(0);
                } else {
                    coords.extend(unravel(flat, &dims).into_iter().map(|i| i as i32));
                }
            }
        }
        Tensor::from_i32(vec![count, rank], coords)
    }

    fn list_diff(&self, x: &Tensor, y: &Tensor) -> Result<(Tensor, Tensor)> {
        ensure!(x.rank() == 1 && y.rank() == 1, "list_diff expects rank 1 operands");
        ensure!(x.dtype() == y.dtype(), "list_diff operands must share a dtype");
        let xv = numeric_values(x)?;
        let yv = numeric_values(y)?;
        let mut out = Vec::new();
        let mut indices = Vec::new();
        for (i, &v) in xv.iter().enumerate() {
            if !yv.iter().any(|&w| w == v) {
                out.push(v);
                indices.push(i as i32);
            }
        }
        let n = out.len();
        let out_t = build(x.dtype(), vec![n], out)?;
        let idx_t = Tensor::from_i32(vec![n], indices)?;
        Ok((out_t, idx_t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(dims: Vec<usize>, data: Vec<f32>) -> Tensor {
        Tensor::from_f32(dims, data).unwrap()
    }

    #[test]
    fn binary_broadcasts_trailing_dims() {
        let k = CpuKernels::new();
        let a = t(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let b = t(vec![2], vec![10.0, 20.0]);
        let out = k.binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(out.f32_data().unwrap().as_ref(), &[11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn int_and_float_promote_to_float() {
        let k = CpuKernels::new();
        let a = Tensor::from_i32(vec![2], vec![1, 2]).unwrap();
        let b = t(vec![2], vec![0.5, 0.5]);
        let out = k.binary(BinaryOp::Mul, &a, &b).unwrap();
        assert_eq!(out.dtype(), DType::Float32);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[0.5, 1.0]);
    }

    #[test]
    fn matmul_with_transposes() {
        let k = CpuKernels::new();
        let a = t(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = t(vec![2, 3], vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let out = k.matmul(&a, &b, false, true).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[4.0, 5.0, 10.0, 11.0]);
    }

    #[test]
    fn reduce_mean_over_one_axis() {
        let k = CpuKernels::new();
        let x = t(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let out = k.reduce(ReduceOp::Mean, &x, &[1], false).unwrap();
        assert_eq!(out.shape().dims(), &[2]);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[2.0, 5.0]);
        let kept = k.reduce(ReduceOp::Sum, &x, &[0], true).unwrap();
        assert_eq!(kept.shape().dims(), &[1, 3]);
    }

    #[test]
    fn concat_and_split_round_trip() {
        let k = CpuKernels::new();
        let a = t(vec![1, 2], vec![1.0, 2.0]);
        let b = t(vec![2, 2], vec![3.0, 4.0, 5.0, 6.0]);
        let joined = k.concat(&[a, b], 0).unwrap();
        assert_eq!(joined.shape().dims(), &[3, 2]);
        let pieces = k.split(&joined, &[1, 2], 0).unwrap();
        assert_eq!(pieces[0].f32_data().unwrap().as_ref(), &[1.0, 2.0]);
        assert_eq!(pieces[1].f32_data().unwrap().as_ref(), &[3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn gather_along_axis_one() {
        let k = CpuKernels::new();
        let x = t(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let idx = Tensor::from_i32(vec![2], vec![2, 0]).unwrap();
        let out = k.gather(&x, &idx, 1).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[3.0, 1.0, 6.0, 4.0]);
        let bad = Tensor::from_i32(vec![1], vec![3]).unwrap();
        assert!(k.gather(&x, &bad, 1).is_err());
    }

    #[test]
    fn top_k_orders_descending_with_stable_ties() {
        let k = CpuKernels::new();
        let x = t(vec![5], vec![1.0, 5.0, 5.0, 2.0, 4.0]);
        let (vals, idx) = k.top_k(&x, 3, true).unwrap();
        assert_eq!(vals.f32_data().unwrap().as_ref(), &[5.0, 5.0, 4.0]);
        assert_eq!(idx.i32_data().unwrap().as_ref(), &[1, 2, 4]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let k = CpuKernels::new();
        let x = t(vec![2, 3], vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0]);
        let out = k.softmax(&x, false).unwrap();
        let data = out.f32_data().unwrap();
        let row0: f32 = data[..3].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-5);
        assert!((data[3] - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn conv2d_valid_matches_hand_result() {
        let k = CpuKernels::new();
        // 1x3x3x1 input, 2x2x1x1 filter of ones: windowed sums.
        let x = t(vec![1, 3, 3, 1], (1..=9).map(|v| v as f32).collect());
        let f = t(vec![2, 2, 1, 1], vec![1.0; 4]);
        let out = k.conv2d(&x, &f, [1, 1], false).unwrap();
        assert_eq!(out.shape().dims(), &[1, 2, 2, 1]);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn max_pool_same_padding() {
        let k = CpuKernels::new();
        let x = t(vec![1, 2, 2, 1], vec![1.0, 2.0, 3.0, 4.0]);
        let out = k.pool2d(&x, PoolKind::Max, [2, 2], [1, 1], true).unwrap();
        assert_eq!(out.shape().dims(), &[1, 2, 2, 1]);
        assert_eq!(out.f32_data().unwrap().as_ref(), &[4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn where_true_yields_coordinates() {
        let k = CpuKernels::new();
        let cond = Tensor::from_bool(vec![2, 2], vec![true, false, false, true]).unwrap();
        let out = k.where_true(&cond).unwrap();
        assert_eq!(out.shape().dims(), &[2, 2]);
        assert_eq!(out.i32_data().unwrap().as_ref(), &[0, 0, 1, 1]);
    }

    #[test]
    fn list_diff_reports_values_and_indices() {
        let k = CpuKernels::new();
        let x = Tensor::from_i32(vec![5], vec![1, 2, 3, 4, 5]).unwrap();
        let y = Tensor::from_i32(vec![2], vec![2, 4]).unwrap();
        let (out, idx) = k.list_diff(&x, &y).unwrap();
        assert_eq!(out.i32_data().unwrap().as_ref(), &[1, 3, 5]);
        assert_eq!(idx.i32_data().unwrap().as_ref(), &[0, 2, 4]);
    }

    #[test]
    fn seeded_random_is_deterministic() {
        let a = CpuKernels::seeded(7);
        let b = CpuKernels::seeded(7);
        let shape = Shape::new(vec![8]);
        let ta = a.random_uniform(&shape, 0.0, 1.0).unwrap();
        let tb = b.random_uniform(&shape, 0.0, 1.0).unwrap();
        assert_eq!(ta.f32_data().unwrap().as_ref(), tb.f32_data().unwrap().as_ref());
        assert!(ta.f32_data().unwrap().iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn range_counts_like_half_open_interval() {
        let k = CpuKernels::new();
        let out = k.range(0.0, 5.0, 2.0, DType::Int32).unwrap();
        assert_eq!(out.i32_data().unwrap().as_ref(), &[0, 2, 4]);
        assert!(k.range(0.0, 1.0, 0.0, DType::Float32).is_err());
    }
}
