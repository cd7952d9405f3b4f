//! Integration tests for `weft-api-derive` live in `tests/`.
