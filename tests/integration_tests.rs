//! Integration tests for trueno-gamg
//!
//! Tests solver-side usage scenarios (field views, per-sweep interface updates,
//! persistence of interface coefficients)

use trueno_gamg::{
    interface_operation, update_interface_matrix, DeviceArray, DeviceError, EqOp,
    InterfaceAddressing, InterfaceCsr, Label, MinusEqOp, PlusEqOp, Scalar,
};

#[test]
fn test_interface_update_scenario() {
    // coeff = [2, 3], neighbour values = [5, 4], one cell owning faces [0, 1]
    let inter = InterfaceCsr::from_parts(&[0], &[0, 2], &[0, 1]).unwrap();
    let coeffs = DeviceArray::from_slice(&[2.0, 3.0]).unwrap();
    let pnf = DeviceArray::from_slice(&[5.0, 4.0]).unwrap();

    let mut forward = DeviceArray::<Scalar>::with_value(1, 0.0).unwrap();
    update_interface_matrix(&mut forward, &coeffs, &pnf, &inter, false).unwrap();
    assert_eq!(forward.get(0).unwrap(), 22.0);

    let mut reverse = DeviceArray::<Scalar>::with_value(1, 0.0).unwrap();
    update_interface_matrix(&mut reverse, &coeffs, &pnf, &inter, true).unwrap();
    assert_eq!(reverse.get(0).unwrap(), -22.0);
}

#[test]
fn test_forward_then_reverse_restores_field() {
    // Two interfaces of a 6-cell partition: faces border cells 0, 5, 5, 2
    let inter = InterfaceCsr::from_face_cells(&[0, 5, 5, 2]).unwrap();
    let coeffs = DeviceArray::from_slice(&[1.0, 2.0, 4.0, 8.0]).unwrap();
    let pnf = DeviceArray::from_slice(&[0.5, 0.25, 1.0, 2.0]).unwrap();

    let initial = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mut field = DeviceArray::from_slice(&initial).unwrap();

    update_interface_matrix(&mut field, &coeffs, &pnf, &inter, false).unwrap();
    assert_eq!(field.to_vec(), vec![1.5, 2.0, 19.0, 4.0, 5.0, 10.5]);

    update_interface_matrix(&mut field, &coeffs, &pnf, &inter, true).unwrap();
    assert_eq!(field.to_vec(), initial);
}

#[test]
fn test_update_through_field_view() {
    // The solver updates only the interior block of a larger field
    let field = DeviceArray::from_slice(&[0.0; 8]).unwrap();
    let mut block = DeviceArray::delegate_range(&field, 4, 2).unwrap();

    let inter = InterfaceCsr::from_face_cells(&[3, 1]).unwrap();
    let coeffs = DeviceArray::from_slice(&[1.0, 1.0]).unwrap();
    let pnf = DeviceArray::from_slice(&[3.0, 7.0]).unwrap();

    update_interface_matrix(&mut block, &coeffs, &pnf, &inter, false).unwrap();

    assert!(block.is_view());
    assert_eq!(field.to_vec(), vec![0.0, 0.0, 0.0, 7.0, 0.0, 3.0, 0.0, 0.0]);
}

#[test]
fn test_generic_operation_with_trait_object_addressing() {
    let inter = InterfaceCsr::from_face_cells(&[1, 1, 0]).unwrap();
    let addressing: &dyn InterfaceAddressing = &inter;
    assert_eq!(addressing.num_cells(), 2);
    assert_eq!(addressing.num_faces(), 3);

    // Count interface faces per cell
    let mut counts = DeviceArray::<Label>::with_size(2).unwrap();
    interface_operation(&mut counts, addressing, |_, _| 1, PlusEqOp).unwrap();
    assert_eq!(counts.to_vec(), vec![1, 2]);

    interface_operation(&mut counts, addressing, |_, _| 1, MinusEqOp).unwrap();
    assert_eq!(counts.to_vec(), vec![0, 0]);
}

#[test]
fn test_custom_reduce_operator() {
    struct MulEqOp;

    impl EqOp<f64> for MulEqOp {
        fn apply(&self, acc: &mut f64, value: f64) {
            *acc *= value;
        }
    }

    let inter = InterfaceCsr::from_face_cells(&[0, 0, 0]).unwrap();
    let mut out = DeviceArray::from_slice(&[1.0]).unwrap();
    interface_operation(&mut out, &inter, |_, face| f64::from(face + 2), MulEqOp).unwrap();
    assert_eq!(out.to_vec(), vec![24.0]);
}

#[test]
fn test_size_mismatch_leaves_field_untouched() {
    let inter = InterfaceCsr::from_face_cells(&[0, 9]).unwrap();
    let coeffs = DeviceArray::from_slice(&[1.0, 1.0]).unwrap();
    let mut field = DeviceArray::from_slice(&[1.0, 2.0, 3.0]).unwrap();

    let err = update_interface_matrix(&mut field, &coeffs, &coeffs, &inter, false).unwrap_err();
    assert!(matches!(err, DeviceError::SizeMismatch(_)));
    assert_eq!(field.to_vec(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_field_ownership_lifecycle() {
    let mut residual = DeviceArray::<Scalar>::with_size(4).unwrap();
    residual.fill(1.0);

    // Hand the buffer to the next level without copying
    let addr = residual.data();
    let mut coarse = DeviceArray::reuse_or_copy(&mut residual, true).unwrap();
    assert!(residual.is_empty());
    assert_eq!(coarse.data(), addr);

    // Shrink keeps the allocation, clear releases it
    coarse.set_size(2).unwrap();
    assert_eq!(coarse.to_vec(), vec![1.0, 1.0]);
    assert_eq!(coarse.capacity(), 4);
    coarse.clear();
    assert!(coarse.data().is_null());
}

#[test]
fn test_null_array_is_shared_and_empty() {
    let a = DeviceArray::<Scalar>::null();
    let b = DeviceArray::<Scalar>::null();
    assert!(std::ptr::eq(a, b));
    assert!(a.is_empty());
    assert!(a.data().is_null());
    assert!(matches!(a.first(), Err(DeviceError::EmptyContainer)));
}

#[test]
fn test_entries_round_trip_through_stream() {
    let inter = InterfaceCsr::from_face_cells(&[2, 0, 2]).unwrap();
    let coeffs = DeviceArray::from_slice(&[0.5, -1.0, 2.0]).unwrap();

    let mut text = Vec::new();
    inter
        .sort_cells()
        .write_entry(Some("sortCells"), &mut text)
        .unwrap();
    coeffs.write_entry(Some("coeffs"), &mut text).unwrap();

    let cells = DeviceArray::<Label>::read_entry("sortCells", &mut text.as_slice()).unwrap();
    let back = DeviceArray::<Scalar>::read_entry("coeffs", &mut text.as_slice()).unwrap();

    assert_eq!(cells.to_vec(), vec![0, 2]);
    assert_eq!(back, coeffs);
}

#[tokio::test]
async fn test_file_persistence() {
    use tempfile::tempdir;

    let dir = tempdir().unwrap();
    let short = dir.path().join("coeffs");
    let long = dir.path().join("field");
    let uniform = dir.path().join("uniform");

    let coeffs = DeviceArray::from_slice(&[2.0, 3.0]).unwrap();
    coeffs.write_file(&short).await.unwrap();
    assert_eq!(DeviceArray::<Scalar>::read_file(&short).await.unwrap(), coeffs);

    let values: Vec<Scalar> = (0..100_u32).map(|i| f64::from(i) / 3.0).collect();
    let field = DeviceArray::from_slice(&values).unwrap();
    field.write_file(&long).await.unwrap();
    assert_eq!(
        DeviceArray::<Scalar>::read_file(&long).await.unwrap().to_vec(),
        values
    );

    let ones = DeviceArray::with_value(50, 1_u32).unwrap();
    ones.write_file(&uniform).await.unwrap();
    let text = tokio::fs::read_to_string(&uniform).await.unwrap();
    assert_eq!(text.trim(), "50{1}");
    assert_eq!(DeviceArray::<Label>::read_file(&uniform).await.unwrap(), ones);
}

#[tokio::test]
async fn test_read_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = DeviceArray::<Scalar>::read_file(dir.path().join("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, DeviceError::Io(_)));
}
