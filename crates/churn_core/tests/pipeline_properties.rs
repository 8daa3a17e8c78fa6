use churn_core::fixtures::{high_risk_record, low_risk_record, reference_artifact};
use churn_core::{CustomerRecord, FeatureValue};
use proptest::prelude::*;

// Property tests for the shared preprocessing + classifier path

fn arbitrary_record() -> impl Strategy<Value = CustomerRecord> {
    (
        300.0f64..900.0,
        18.0f64..95.0,
        0.0f64..10.0,
        0.0f64..260_000.0,
        1.0f64..4.0,
        0.0f64..200_000.0,
        any::<bool>(),
        any::<bool>(),
        prop::sample::select(vec!["Male", "Female"]),
        prop::sample::select(vec!["France", "Germany", "Spain"]),
    )
        .prop_map(
            |(credit, age, tenure, balance, products, salary, card, active, gender, geo)| {
                CustomerRecord::new()
                    .with("creditScore", credit)
                    .with("age", age)
                    .with("tenure", tenure.round())
                    .with("balance", balance)
                    .with("numofProducts", products.round())
                    .with("estimatedSalary", salary)
                    .with("hasCrCard", if card { 1.0 } else { 0.0 })
                    .with("isActiveMember", if active { 1.0 } else { 0.0 })
                    .with("isZeroBalance", if balance == 0.0 { 1.0 } else { 0.0 })
                    .with("gender", gender)
                    .with("geography", geo)
            },
        )
}

proptest! {
    #[test]
    fn predictions_are_deterministic(records in prop::collection::vec(arbitrary_record(), 1..32)) {
        let artifact = reference_artifact();
        let first = artifact.predict(&records).unwrap();
        let second = artifact.predict(&records).unwrap();

        prop_assert_eq!(first.len(), records.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a.label, b.label);
            prop_assert_eq!(
                a.probability.map(f64::to_bits),
                b.probability.map(f64::to_bits)
            );
        }
    }
}

proptest! {
    #[test]
    fn unknown_categories_never_fail(
        record in arbitrary_record(),
        geography in "[A-Za-z]{1,12}",
        gender in "[A-Za-z ]{0,8}",
    ) {
        let mut record = record;
        record.insert("geography", geography);
        record.insert("gender", gender);

        let preds = reference_artifact().predict(&[record]).unwrap();
        prop_assert_eq!(preds.len(), 1);
        prop_assert!(preds[0].label <= 1);
        let p = preds[0].probability.unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
    }
}

proptest! {
    #[test]
    fn batch_prediction_matches_single_prediction(
        records in prop::collection::vec(arbitrary_record(), 1..16),
    ) {
        let artifact = reference_artifact();
        let batch = artifact.predict(&records).unwrap();

        for (record, expected) in records.iter().zip(&batch) {
            let single = artifact.predict(std::slice::from_ref(record)).unwrap();
            prop_assert_eq!(single[0], *expected);
        }
    }
}

/// Write `fields` as a JSON object, keys in the given order
fn json_object(fields: &[(String, FeatureValue)]) -> String {
    let members: Vec<String> = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "{}:{}",
                serde_json::to_string(name).unwrap(),
                serde_json::to_string(value).unwrap()
            )
        })
        .collect();
    format!("{{{}}}", members.join(","))
}

proptest! {
    #[test]
    fn json_key_order_and_extra_fields_do_not_matter(
        record in arbitrary_record(),
        order in Just((0..13).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let mut fields: Vec<(String, FeatureValue)> =
            record.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields.push(("surname".to_string(), FeatureValue::from("Hargrave")));
        fields.push(("rowNumber".to_string(), FeatureValue::Number(42.0)));
        prop_assert_eq!(fields.len(), order.len());

        let sorted_body = json_object(&fields);
        let permuted: Vec<(String, FeatureValue)> =
            order.iter().map(|&i| fields[i].clone()).collect();
        let permuted_body = json_object(&permuted);

        let from_sorted: CustomerRecord = serde_json::from_str(&sorted_body).unwrap();
        let from_permuted: CustomerRecord = serde_json::from_str(&permuted_body).unwrap();

        let artifact = reference_artifact();
        let expected = artifact.predict(&[record]).unwrap();
        let a = artifact.predict(&[from_sorted]).unwrap();
        let b = artifact.predict(&[from_permuted]).unwrap();
        prop_assert_eq!(a[0].label, b[0].label);
        prop_assert_eq!(
            a[0].probability.map(f64::to_bits),
            b[0].probability.map(f64::to_bits)
        );
        prop_assert_eq!(a[0].label, expected[0].label);
    }
}

#[test]
fn numeric_text_is_coerced() {
    let artifact = reference_artifact();
    let mut as_text = low_risk_record();
    as_text.insert("age", "45");
    as_text.insert("hasCrCard", "1");

    assert_eq!(
        artifact.predict(&[low_risk_record()]).unwrap(),
        artifact.predict(&[as_text]).unwrap()
    );
}

#[test]
fn output_order_follows_input_order() {
    let artifact = reference_artifact();
    let records = vec![
        low_risk_record(),
        high_risk_record(),
        low_risk_record(),
        high_risk_record(),
    ];
    let labels: Vec<u8> = artifact
        .predict(&records)
        .unwrap()
        .iter()
        .map(|p| p.label)
        .collect();
    assert_eq!(labels, vec![0, 1, 0, 1]);
}
