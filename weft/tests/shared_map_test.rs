// Integration tests for SharedMap

use std::thread;

use serde_json::{json, Value};
use weft::error::SharedMapError;
use weft::shared_map::{SharedMap, EMPTY_KEYS_CAPACITY, EMPTY_VALUES_CAPACITY};
use weft::{Runtime, RuntimeConfig};

#[test]
fn test_round_trip_and_missing_key() {
    let map = SharedMap::new([("a", 1)]).unwrap();
    assert_eq!(map.get("a").unwrap().as_deref(), Some("1"));

    map.set("a", 2).unwrap();
    assert_eq!(map.get("a").unwrap().as_deref(), Some("2"));

    assert_eq!(map.get("missing").unwrap(), None);
}

#[test]
fn test_set_unknown_key_fails() {
    let map = SharedMap::new([("a", "x")]).unwrap();
    assert_eq!(
        map.set("b", "y"),
        Err(SharedMapError::KeyMissing("b".to_string()))
    );
    assert_eq!(
        map.delete("b"),
        Err(SharedMapError::KeyMissing("b".to_string()))
    );
}

#[test]
fn test_strings_pass_through_and_other_values_are_json() {
    let map = SharedMap::new([
        ("text", json!("plain")),
        ("object", json!({"k": [1, 2]})),
        ("flag", json!(true)),
    ])
    .unwrap();
    assert_eq!(map.get("text").unwrap().as_deref(), Some("plain"));
    assert_eq!(map.get("object").unwrap().as_deref(), Some(r#"{"k":[1,2]}"#));
    assert_eq!(map.get("flag").unwrap().as_deref(), Some("true"));
}

#[test]
fn test_growing_a_value_shifts_the_ones_after_it() {
    let map = SharedMap::new([("a", "1"), ("b", "22"), ("c", "333")]).unwrap();
    map.set("a", "xxxx").unwrap();

    assert_eq!(map.get("a").unwrap().as_deref(), Some("xxxx"));
    assert_eq!(map.get("b").unwrap().as_deref(), Some("22"));
    assert_eq!(map.get("c").unwrap().as_deref(), Some("333"));
    assert_eq!(map.values_used().unwrap(), 9);
}

#[test]
fn test_shrinking_a_middle_value_keeps_neighbours_intact() {
    let map = SharedMap::new([("a", "aaaa"), ("b", "bbbbbbbb"), ("c", "cc")]).unwrap();
    map.set("b", "b").unwrap();

    assert_eq!(map.get("a").unwrap().as_deref(), Some("aaaa"));
    assert_eq!(map.get("b").unwrap().as_deref(), Some("b"));
    assert_eq!(map.get("c").unwrap().as_deref(), Some("cc"));
    assert_eq!(map.values_used().unwrap(), 7);

    // grow the last value back into the freed space
    map.set("c", "cccccccccc").unwrap();
    assert_eq!(map.get("c").unwrap().as_deref(), Some("cccccccccc"));
    assert_eq!(map.get("b").unwrap().as_deref(), Some("b"));
}

#[test]
fn test_delete_stores_null_and_keeps_the_key() {
    let map = SharedMap::new([("a", "value"), ("b", "next")]).unwrap();
    map.delete("a").unwrap();

    assert_eq!(map.get("a").unwrap().as_deref(), Some("null"));
    assert!(map.contains_key("a").unwrap());
    assert_eq!(map.get("b").unwrap().as_deref(), Some("next"));

    map.set("a", "back").unwrap();
    assert_eq!(map.get("a").unwrap().as_deref(), Some("back"));
}

#[test]
fn test_null_values_of_declared_keys_are_present() {
    let map = SharedMap::new([
        ("text", json!("null")),
        ("json", Value::Null),
        ("empty", json!("")),
    ])
    .unwrap();
    assert_eq!(map.get("text").unwrap().as_deref(), Some("null"));
    assert_eq!(map.get("json").unwrap().as_deref(), Some("null"));
    assert_eq!(map.get("empty").unwrap().as_deref(), Some("null"));

    map.set("text", "other").unwrap();
    map.set("text", "null").unwrap();
    assert_eq!(map.get("text").unwrap().as_deref(), Some("null"));

    map.update("json", |current| {
        assert_eq!(current.as_deref(), Some("null"));
        "seen"
    })
    .unwrap();
    assert_eq!(map.get("json").unwrap().as_deref(), Some("seen"));

    assert_eq!(map.get("undeclared").unwrap(), None);
}

#[test]
fn test_keys_in_value_order() {
    let map = SharedMap::new([("first", 1), ("second", 2), ("third", 3)]).unwrap();
    assert_eq!(map.keys().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn test_invalid_and_duplicate_names_are_rejected() {
    assert_eq!(
        SharedMap::new([("bad;name", 1)]).unwrap_err(),
        SharedMapError::InvalidKey("bad;name".to_string())
    );
    assert_eq!(
        SharedMap::new([("", 1)]).unwrap_err(),
        SharedMapError::InvalidKey(String::new())
    );
    assert_eq!(
        SharedMap::new([("a", 1), ("a", 2)]).unwrap_err(),
        SharedMapError::DuplicateKey("a".to_string())
    );
}

#[test]
fn test_capacity_sizing() {
    let empty = SharedMap::new(Vec::<(String, i32)>::new()).unwrap();
    assert_eq!(empty.keys_capacity(), EMPTY_KEYS_CAPACITY);
    assert_eq!(empty.values_capacity(), EMPTY_VALUES_CAPACITY);

    // "a(0,2);" is 7 bytes, "10" is 2 bytes
    let map = SharedMap::new([("a", 10)]).unwrap();
    assert_eq!(map.keys_capacity(), 70);
    assert_eq!(map.values_capacity(), 20);

    let fixed = SharedMap::builder().fixed_size(64).build([("a", 10)]).unwrap();
    assert_eq!(fixed.values_capacity(), 64);

    let scaled = SharedMap::builder().multiplier(2).build([("a", 10)]).unwrap();
    assert_eq!(scaled.values_capacity(), 4);
}

#[test]
fn test_fixed_size_smaller_than_initial_data_fails() {
    let err = SharedMap::builder()
        .fixed_size(3)
        .build([("a", "12345")])
        .unwrap_err();
    assert_eq!(
        err,
        SharedMapError::InsufficientCapacity {
            fixed: 3,
            required: 5
        }
    );
}

#[test]
fn test_overflowing_set_fails_without_touching_the_map() {
    let map = SharedMap::builder()
        .fixed_size(6)
        .build([("a", "12"), ("b", "34")])
        .unwrap();

    let err = map.set("a", "too long for the buffer").unwrap_err();
    assert!(matches!(err, SharedMapError::CapacityExceeded { .. }));
    assert_eq!(map.get("a").unwrap().as_deref(), Some("12"));
    assert_eq!(map.get("b").unwrap().as_deref(), Some("34"));
    assert!(!map.mutex().is_locked());
}

#[test]
fn test_concurrent_updates_lose_nothing() {
    let map = SharedMap::new([("count", 0)]).unwrap();
    let threads = 8;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let map = map.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    map.update("count", |current| {
                        current.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        map.get("count").unwrap(),
        Some((threads * 1000).to_string())
    );
}

#[test]
fn test_clones_share_buffers() {
    let map = SharedMap::new([("a", "x")]).unwrap();
    let other = map.clone();
    assert!(map.same_map(&other));

    other.set("a", "changed").unwrap();
    assert_eq!(map.get("a").unwrap().as_deref(), Some("changed"));
}

#[test]
fn test_runtime_uses_configured_multiplier() {
    let runtime = Runtime::new(RuntimeConfig {
        shared_map_multiplier: 3,
        ..Default::default()
    });
    let map = runtime.shared_map([("a", "1234")]).unwrap();
    assert_eq!(map.values_capacity(), 12);
}
