//! Fuzz target for the directory listing scanner.
//!
//! Arbitrary markup must never panic, and no absolute path, URL or mail
//! link may come out as an entry.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ovd_modules::listing::DirectoryListing;

fuzz_target!(|html: &str| {
    let listing = DirectoryListing::parse(html);

    for entry in listing.entries() {
        assert!(!entry.target.starts_with('/'));
        assert!(!entry.target.contains("://"));
        assert!(!entry.target.starts_with("mailto:"));
    }

    if let Some(first) = listing.files().next() {
        assert_eq!(listing.find_file(""), Some(first));
    }
});
