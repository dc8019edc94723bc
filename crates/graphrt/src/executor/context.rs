//! Per-run execution context: loop frames and TensorArray registry.
//!
//! Control flow executes nodes once per loop iteration, so a tensor produced
//! inside a loop is keyed by the node name plus the frame path that was
//! current when it was produced. [`ContextPath`] is that key component: a
//! stack of named frames with iteration counters, structural identity, root
//! being the empty path. Lookups fall back from the innermost frame to the
//! root, which is how loop bodies see loop-invariant values produced outside
//! the loop.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

use super::error::{TensorArrayError, TensorListError};
use super::tensor_array::TensorArray;
use super::tensor_list::TensorList;

/// One active loop frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    pub name: String,
    pub iteration: u32,
}

/// A stack of frames identifying one dynamic execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContextPath(Vec<Frame>);

impl ContextPath {
    pub fn root() -> Self {
        ContextPath(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    /// All prefixes of this path, innermost first, ending with the root.
    /// This is the search order for tensor lookups.
    pub fn lookup_chain(&self) -> Vec<ContextPath> {
        let mut chain = Vec::with_capacity(self.0.len() + 1);
        let mut frames = self.0.clone();
        loop {
            chain.push(ContextPath(frames.clone()));
            if frames.pop().is_none() {
                break;
            }
        }
        chain
    }

    fn pushed(&self, name: &str) -> ContextPath {
        let mut frames = self.0.clone();
        frames.push(Frame { name: name.to_owned(), iteration: 0 });
        ContextPath(frames)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for frame in &self.0 {
            write!(f, "/{}-{}", frame.name, frame.iteration)?;
        }
        Ok(())
    }
}

/// Mutable state threaded through one execution: the current frame path and
/// the tables of live TensorArrays and TensorLists, keyed by their
/// process-unique ids.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    current: ContextPath,
    tensor_arrays: HashMap<usize, TensorArray>,
    tensor_lists: HashMap<usize, TensorList>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_path(&self) -> &ContextPath {
        &self.current
    }

    pub fn set_current_path(&mut self, path: ContextPath) {
        self.current = path;
    }

    /// Pushes a new frame at iteration zero. Driven by `Enter`.
    pub fn enter_frame(&mut self, name: &str) {
        self.current = self.current.pushed(name);
    }

    /// Pops the innermost frame. Driven by `Exit`.
    pub fn exit_frame(&mut self) -> Result<()> {
        let mut frames = self.current.0.clone();
        if frames.pop().is_none() {
            bail!("cannot exit frame, the context stack is empty");
        }
        self.current = ContextPath(frames);
        Ok(())
    }

    /// Bumps the innermost frame's iteration counter. Driven by
    /// `NextIteration`.
    pub fn next_iteration(&mut self) -> Result<()> {
        let mut frames = self.current.0.clone();
        match frames.last_mut() {
            Some(frame) => frame.iteration += 1,
            None => bail!("cannot advance iteration, the context stack is empty"),
        }
        self.current = ContextPath(frames);
        Ok(())
    }

    pub fn register_tensor_array(&mut self, array: TensorArray) {
        self.tensor_arrays.insert(array.id(), array);
    }

    pub fn tensor_array(&self, id: usize) -> Result<&TensorArray, TensorArrayError> {
        self.tensor_arrays.get(&id).ok_or(TensorArrayError::NotFound(id))
    }

    pub fn tensor_array_mut(&mut self, id: usize) -> Result<&mut TensorArray, TensorArrayError> {
        self.tensor_arrays.get_mut(&id).ok_or(TensorArrayError::NotFound(id))
    }

    pub fn register_tensor_list(&mut self, list: TensorList) {
        self.tensor_lists.insert(list.id(), list);
    }

    pub fn tensor_list(&self, id: usize) -> Result<&TensorList, TensorListError> {
        self.tensor_lists.get(&id).ok_or(TensorListError::NotFound(id))
    }

    pub fn tensor_list_mut(&mut self, id: usize) -> Result<&mut TensorList, TensorListError> {
        self.tensor_lists.get_mut(&id).ok_or(TensorListError::NotFound(id))
    }

    /// Closes every TensorArray and TensorList, disposing stored tensors
    /// except those whose ids the caller still hands out.
    pub fn dispose(&mut self, keep_ids: &HashSet<usize>) {
        for array in self.tensor_arrays.values_mut() {
            array.clear_and_close(keep_ids);
        }
        for list in self.tensor_lists.values_mut() {
            list.clear(keep_ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_stack_round_trip() {
        let mut ctx = ExecutionContext::new();
        assert!(ctx.current_path().is_root());
        ctx.enter_frame("while");
        ctx.next_iteration().unwrap();
        ctx.next_iteration().unwrap();
        assert_eq!(ctx.current_path().to_string(), "/while-2");
        ctx.enter_frame("inner");
        assert_eq!(ctx.current_path().to_string(), "/while-2/inner-0");
        ctx.exit_frame().unwrap();
        ctx.exit_frame().unwrap();
        assert!(ctx.current_path().is_root());
        assert!(ctx.exit_frame().is_err());
        assert!(ctx.next_iteration().is_err());
    }

    #[test]
    fn lookup_chain_widens_to_root() {
        let mut ctx = ExecutionContext::new();
        ctx.enter_frame("outer");
        ctx.enter_frame("inner");
        let chain = ctx.current_path().lookup_chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].to_string(), "/outer-0/inner-0");
        assert_eq!(chain[1].to_string(), "/outer-0");
        assert!(chain[2].is_root());
    }

    #[test]
    fn iterations_are_distinct_paths() {
        let mut ctx = ExecutionContext::new();
        ctx.enter_frame("loop");
        let first = ctx.current_path().clone();
        ctx.next_iteration().unwrap();
        assert_ne!(&first, ctx.current_path());
    }
}
