//! Fuzz target for SOAP response decoding followed by normalization.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ovd_modules::soap::envelope::{decode_fault, decode_response};
use ovd_modules::soap::normalize;

fuzz_target!(|xml: &str| {
    if let Ok(value) = decode_response("fuzz", xml) {
        let _ = normalize(&value);
    }
    let _ = decode_fault(xml);
});
