//! Fuzz target for the SOAP value normalizer.
//!
//! Builds arbitrary value trees and checks that normalization either
//! succeeds or reports a conflict, and that denormalized mappings normalize
//! back to mappings with the same keys.

#![no_main]

use arbitrary::Arbitrary;
use indexmap::IndexMap;
use libfuzzer_sys::fuzz_target;
use ovd_modules::soap::{denormalize, normalize, NormalizedValue, Scalar, SoapValue};

/// Arbitrary SOAP value tree for fuzzing
#[derive(Debug, Clone, Arbitrary)]
enum FuzzValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<FuzzValue>),
    AssocArray(Vec<(String, FuzzValue)>),
    Struct(Vec<(String, FuzzValue)>),
}

impl FuzzValue {
    fn into_soap(self, depth: usize) -> SoapValue {
        if depth > 8 {
            return SoapValue::Scalar(Scalar::Null);
        }
        let fields = |entries: Vec<(String, FuzzValue)>| -> IndexMap<String, SoapValue> {
            entries
                .into_iter()
                .map(|(k, v)| (k, v.into_soap(depth + 1)))
                .collect()
        };
        match self {
            FuzzValue::Null => SoapValue::Scalar(Scalar::Null),
            FuzzValue::Bool(b) => SoapValue::Scalar(Scalar::Bool(b)),
            FuzzValue::Int(n) => SoapValue::Scalar(Scalar::Int(n)),
            FuzzValue::Float(f) => SoapValue::Scalar(Scalar::Float(f)),
            FuzzValue::String(s) => SoapValue::Scalar(Scalar::String(s)),
            FuzzValue::List(items) => {
                SoapValue::List(items.into_iter().map(|v| v.into_soap(depth + 1)).collect())
            }
            FuzzValue::AssocArray(entries) => SoapValue::AssocArray(fields(entries)),
            FuzzValue::Struct(entries) => SoapValue::Struct(fields(entries)),
        }
    }
}

fuzz_target!(|value: FuzzValue| {
    let Ok(normalized) = normalize(&value.into_soap(0)) else {
        return;
    };

    if let NormalizedValue::Mapping(map) = &normalized {
        if let Ok(NormalizedValue::Mapping(again)) = normalize(&denormalize(&normalized)) {
            assert!(map.keys().eq(again.keys()));
        }
    }
});
