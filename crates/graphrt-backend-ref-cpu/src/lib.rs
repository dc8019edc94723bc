//! Reference CPU backend for `graphrt`.
//!
//! Straightforward, allocation-heavy implementations of every kernel,
//! written for clarity and used as the correctness baseline by the executor
//! tests. Nothing here is tuned; optimized backends implement the same
//! [`graphrt::kernels::Kernels`] trait.

mod cpu;

pub use cpu::CpuKernels;
