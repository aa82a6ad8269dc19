//! Fuzz target for Ansible arguments file parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ovd_modules::protocol::ModuleArgs;

fuzz_target!(|text: &str| {
    if let Ok(args) = ModuleArgs::parse(text) {
        assert!(args.params.keys().all(|k| !k.starts_with("_ansible_")));
    }
});
