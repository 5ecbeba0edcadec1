use ckks_tensor::{
    Ckks, CkksContext, CkksParameters, Error, LeveledScheme, PlaintextTensor,
    PolynomialApproximation, PolynomialEvaluator, SecretKey, TensorCodec, ToleranceReport,
};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;
use std::sync::Arc;

fn scheme(depth: usize) -> (Ckks, SecretKey) {
    let ctx = CkksContext::new(CkksParameters::insecure(depth, 32)).unwrap();
    Ckks::generate_keypair(Arc::new(ctx))
}

/// x^(2^(d-1)) plus a coefficient multiply: exactly `d` levels.
fn chain(d: usize) -> PolynomialApproximation {
    PolynomialApproximation::new("chain", &[(1 << (d - 1), 0.5)]).unwrap()
}

#[test]
fn test_depth_budget() {
    for d in 2..=5 {
        let poly = chain(d);
        assert_eq!(poly.required_depth(), d);

        let (short, _) = scheme(d - 1);
        let x = short.encrypt(1.1).unwrap();
        assert!(
            matches!(
                PolynomialEvaluator::new(&short).evaluate(&x, &poly),
                Err(Error::DepthExhausted { .. })
            ),
            "depth {} accepted a chain of {d}",
            d - 1
        );

        for depth in [d, d + 1] {
            let (ckks, sk) = scheme(depth);
            let x = ckks.encrypt(1.1).unwrap();
            let y = PolynomialEvaluator::new(&ckks).evaluate(&x, &poly).unwrap();
            assert_eq!(ckks.level(&y), d);
            let want = poly.evaluate_plain(1.1);
            let got = ckks.decrypt(&y, &sk).unwrap();
            assert!((got - want).abs() < 1e-6, "depth {depth}: {got} vs {want}");
        }
    }
}

#[test]
fn test_depth_budget_with_large_outputs() {
    // 0.5·x^(2^(d-1)) lands between 2^9 and 2^12: past what q0 alone carries
    for (d, x) in [(2, 60.0), (3, 8.0), (4, 3.0), (5, 1.6)] {
        let poly = chain(d);
        let want = poly.evaluate_plain(x);
        assert!(want > 512.0);

        let (short, _) = scheme(d);
        let planned = poly
            .level_peaks(x)
            .into_iter()
            .map(|(level, peak)| short.context().depth_for(level, peak).unwrap())
            .max()
            .unwrap();
        assert_eq!(planned, d + 1, "chain of {d} at {x}");

        let (ckks, sk) = scheme(planned);
        let y = PolynomialEvaluator::new(&ckks)
            .evaluate(&ckks.encrypt(x).unwrap(), &poly)
            .unwrap();
        assert_eq!(ckks.level(&y), d);
        let got = ckks.decrypt(&y, &sk).unwrap();
        assert!((got - want).abs() < 1e-6 * want, "depth {planned}: {got} vs {want}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_round_trip(values in prop_vec(-1000.0f64..1000.0, 1..6)) {
        let (ckks, sk) = scheme(1);
        let codec = TensorCodec::new(&ckks);
        let x = PlaintextTensor::from_rows(&[values.clone()]).unwrap();
        let back = codec.decode(&codec.encode(&x).unwrap(), &sk).unwrap();
        for (got, want) in back.as_matrix().iter().zip(&values) {
            prop_assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_report_is_and_of_entries(
        pairs in prop_vec((-10.0f64..10.0, -10.0f64..10.0), 1..12),
        tolerance in 0.0f64..5.0,
    ) {
        let decrypted: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let expected: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let report = ToleranceReport::compare(
            "p",
            tolerance,
            &PlaintextTensor::from_rows(&[decrypted]).unwrap(),
            &PlaintextTensor::from_rows(&[expected]).unwrap(),
        )
        .unwrap();

        prop_assert_eq!(report.entries.len(), pairs.len());
        let all = pairs.iter().all(|(d, e)| (d - e).abs() <= tolerance);
        prop_assert_eq!(report.success(), all);
        prop_assert_eq!(report.failures().count() == 0, all);
    }
}
