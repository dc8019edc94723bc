use std::collections::HashSet;

use graphrt::executor::TensorListError;
use graphrt::{DType, Tensor, TensorList};
use graphrt_backend_ref_cpu::CpuKernels;

fn float_list(max: i64) -> TensorList {
    TensorList::new(DType::Float32, Vec::new(), max)
}

#[test]
fn ids_are_unique() {
    let a = float_list(-1);
    let b = float_list(-1);
    assert_ne!(a.id(), b.id());
}

#[test]
fn set_and_get_round_trip() {
    let mut list = float_list(-1);
    list.set_item(1, Tensor::scalar_f32(7.0)).unwrap();
    assert_eq!(list.size(), 2);
    assert_eq!(list.get_item(1, None).unwrap().scalar_value_f32().unwrap(), 7.0);
    let err = list.get_item(0, None).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::ElementUnset(0)) => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn replaced_elements_are_disposed() {
    let mut list = float_list(-1);
    let first = Tensor::scalar_f32(1.0);
    list.set_item(0, first.clone()).unwrap();
    list.set_item(0, Tensor::scalar_f32(2.0)).unwrap();
    assert!(first.is_disposed());
    assert_eq!(list.get_item(0, None).unwrap().scalar_value_f32().unwrap(), 2.0);
}

#[test]
fn bounded_lists_reject_overflow() {
    let mut list = float_list(1);
    list.push_back(Tensor::scalar_f32(1.0)).unwrap();
    let err = list.push_back(Tensor::scalar_f32(2.0)).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::Full(1)) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(list.set_item(1, Tensor::scalar_f32(2.0)).is_err());
}

#[test]
fn push_and_pop_are_lifo() {
    let mut list = float_list(-1);
    list.push_back(Tensor::scalar_f32(1.0)).unwrap();
    list.push_back(Tensor::scalar_f32(2.0)).unwrap();
    assert_eq!(list.pop_back(None).unwrap().scalar_value_f32().unwrap(), 2.0);
    assert!(list.pop_back(Some(DType::Int32)).is_err());
    assert_eq!(list.pop_back(None).unwrap().scalar_value_f32().unwrap(), 1.0);
    let err = list.pop_back(None).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::EmptyList) => {}
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn element_shape_is_enforced() {
    let mut list = TensorList::new(DType::Float32, vec![2], -1);
    list.push_back(Tensor::from_f32(vec![2], vec![1.0, 2.0]).unwrap()).unwrap();
    let err = list.push_back(Tensor::from_f32(vec![3], vec![0.0; 3]).unwrap()).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::ShapeMismatch { expected, .. }) => assert_eq!(expected, &vec![2]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(list.push_back(Tensor::scalar_i32(1)).is_err());
}

#[test]
fn stack_checks_the_expected_element_count() {
    let kernels = CpuKernels::seeded(0);
    let mut list = float_list(-1);
    list.push_back(Tensor::from_f32(vec![2], vec![1.0, 2.0]).unwrap()).unwrap();
    list.push_back(Tensor::from_f32(vec![2], vec![3.0, 4.0]).unwrap()).unwrap();
    let err = list.stack(3, None, &kernels).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::WrongSize { expected: 3, actual: 2 }) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    let stacked = list.stack(2, None, &kernels).unwrap();
    assert_eq!(stacked.shape().dims(), &[2, 2]);
    assert_eq!(stacked.f32_data().unwrap().as_ref(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn stack_of_an_empty_list_is_an_empty_batch() {
    let kernels = CpuKernels::seeded(0);
    let list = TensorList::new(DType::Float32, vec![2, 3], -1);
    let stacked = list.stack(-1, None, &kernels).unwrap();
    assert_eq!(stacked.shape().dims(), &[0, 2, 3]);
}

#[test]
fn gather_drops_indices_beyond_the_size() {
    let kernels = CpuKernels::seeded(0);
    let mut list = float_list(-1);
    list.push_back(Tensor::from_f32(vec![1], vec![1.0]).unwrap()).unwrap();
    list.push_back(Tensor::from_f32(vec![1], vec![2.0]).unwrap()).unwrap();
    let gathered = list.gather(&[1, 0, 1], None, &kernels).unwrap();
    assert_eq!(gathered.shape().dims(), &[2, 1]);
    assert_eq!(gathered.f32_data().unwrap().as_ref(), &[2.0, 1.0]);
}

#[test]
fn from_tensor_and_concat_round_trip() {
    let kernels = CpuKernels::seeded(0);
    let source =
        Tensor::from_f32(vec![3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let list = TensorList::from_tensor(&source, vec![2], &kernels).unwrap();
    assert_eq!(list.size(), 3);
    assert_eq!(
        list.get_item(1, None).unwrap().f32_data().unwrap().as_ref(),
        &[3.0, 4.0]
    );
    let joined = list.concat(None, &kernels).unwrap();
    assert_eq!(joined.shape().dims(), &[6]);
    assert!(TensorList::from_tensor(&Tensor::scalar_f32(1.0), Vec::new(), &kernels).is_err());
}

#[test]
fn scatter_rejects_out_of_range_indices() {
    let kernels = CpuKernels::seeded(0);
    let tensor = Tensor::from_f32(vec![2, 1], vec![1.0, 2.0]).unwrap();
    let err = TensorList::scatter(&tensor, &[0, 5], vec![1], 3, &kernels).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::ScatterOutOfBounds { index: 5, max: 3 }) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    let list = TensorList::scatter(&tensor, &[2, 0], vec![1], 3, &kernels).unwrap();
    assert_eq!(
        list.get_item(2, None).unwrap().f32_data().unwrap().as_ref(),
        &[1.0]
    );
}

#[test]
fn split_rejects_lengths_that_do_not_cover_the_tensor() {
    let kernels = CpuKernels::seeded(0);
    let tensor = Tensor::from_f32(vec![4], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let err = TensorList::split(&tensor, vec![-1], &[1, 2], &kernels).unwrap_err();
    match err.downcast_ref::<TensorListError>() {
        Some(TensorListError::BadSplit { lengths: 3, actual: 4 }) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    let list = TensorList::split(&tensor, vec![-1], &[1, 3], &kernels).unwrap();
    assert_eq!(list.size(), 2);
    assert_eq!(
        list.get_item(1, None).unwrap().f32_data().unwrap().as_ref(),
        &[2.0, 3.0, 4.0]
    );
}

#[test]
fn clear_disposes_unkept_elements() {
    let mut list = float_list(-1);
    let kept = Tensor::scalar_f32(1.0);
    let dropped = Tensor::scalar_f32(2.0);
    list.set_item(0, kept.clone()).unwrap();
    list.set_item(1, dropped.clone()).unwrap();
    let mut keep = HashSet::new();
    keep.insert(kept.id());
    list.clear(&keep);
    assert_eq!(list.size(), 0);
    assert!(!kept.is_disposed());
    assert!(dropped.is_disposed());
    kept.dispose();
}
