use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use weft_api::errors::CodecError;
use weft_api::Call;

// No attributes: task name from the type, unit output
#[derive(Call, Debug, PartialEq, Serialize, Deserialize)]
struct RefreshCache {
    region: String,
}

// Custom task name and result type
#[derive(Call, Debug, PartialEq, Serialize, Deserialize)]
#[call(task = "sum", result = "i64")]
struct SumValues {
    values: Vec<i64>,
}

// Validation
#[derive(Call, Debug, PartialEq, Serialize, Deserialize)]
#[call(validate = "self.amount > 0.0")]
struct Charge {
    amount: f64,
}

// All options
#[derive(Call, Debug, PartialEq, Serialize, Deserialize)]
#[call(
    task = "index_documents",
    result = "Vec<String>",
    validate = "!self.paths.is_empty()",
    timeout = 5
)]
struct IndexBatch {
    paths: Vec<String>,
}

// Enums are requests too
#[derive(Call, Debug, PartialEq, Serialize, Deserialize)]
#[call(result = "bool")]
enum Toggle {
    On,
    Off,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_task_name_and_output() {
        assert_eq!(RefreshCache::task_name(), "refresh_cache");
        assert_eq!(RefreshCache::timeout(), None);

        assert!(RefreshCache::decode_output(None).is_ok());
    }

    #[test]
    fn test_custom_task_and_result() {
        assert_eq!(SumValues::task_name(), "sum");

        let request = SumValues { values: vec![1, 2, 3] };
        let params = request.to_params().unwrap();
        assert_eq!(params, vec![json!({ "values": [1, 2, 3] })]);

        let total = SumValues::decode_output(Some(json!(6))).unwrap();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_request_survives_the_trip_to_the_worker() {
        let request = SumValues { values: vec![4, 5] };
        let decoded = SumValues::from_params(request.to_params().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_validation() {
        assert!(Charge { amount: 9.5 }.validate().is_ok());

        let err = Charge { amount: 0.0 }.to_params().unwrap_err();
        match err {
            CodecError::Validation { task, rule } => {
                assert_eq!(task, "charge");
                assert_eq!(rule, "self.amount > 0.0");
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_all_options() {
        assert_eq!(IndexBatch::task_name(), "index_documents");
        assert_eq!(IndexBatch::timeout(), Some(Duration::from_secs(5)));
        assert!(IndexBatch { paths: vec![] }.to_params().is_err());

        let names = IndexBatch::decode_output(Some(json!(["a.md", "b.md"]))).unwrap();
        assert_eq!(names, vec!["a.md".to_string(), "b.md".to_string()]);
    }

    #[test]
    fn test_enum_request() {
        assert_eq!(Toggle::task_name(), "toggle");
        assert_eq!(Toggle::On.to_params().unwrap(), vec![json!("On")]);
        assert_eq!(Toggle::from_params(vec![json!("Off")]).unwrap(), Toggle::Off);
        assert!(Toggle::decode_output(Some(json!(true))).unwrap());
    }

    #[test]
    fn test_wrong_output_type_is_a_decode_error() {
        let err = SumValues::decode_output(Some(json!("six"))).unwrap_err();
        assert!(matches!(err, CodecError::Decode { task: "sum", .. }));
    }
}
