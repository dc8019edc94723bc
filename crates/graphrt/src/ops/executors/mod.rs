pub(crate) mod arithmetic;
pub(crate) mod basic_math;
pub(crate) mod control;
pub(crate) mod convolution;
pub(crate) mod creation;
pub(crate) mod dynamic;
pub(crate) mod evaluation;
pub(crate) mod graph_ops;
pub(crate) mod image;
pub(crate) mod logical;
pub(crate) mod matrices;
pub(crate) mod normalization;
pub(crate) mod reduction;
pub(crate) mod slice_join;
pub(crate) mod transformation;
pub(crate) mod utils;
