#![no_main]

use libfuzzer_sys::fuzz_target;
use type_pollution::filter::UnitFilter;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Neither parsing nor matching may panic
        if let Ok(filter) = UnitFilter::from_args(Some(input)) {
            for prefix in filter.prefixes() {
                let _ = filter.accepts(prefix);
            }
        }
    }
});
