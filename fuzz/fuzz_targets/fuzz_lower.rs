#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(model) = corvid_dsl::parse(s, "fuzz.vp") {
            if let Ok(compiled) = corvid_ir::lower_with_source(&model, s, "fuzz.vp") {
                // Every principal view must stay internally consistent.
                for state in &compiled.principal_states {
                    assert!(state.lengths_agree());
                    let _ = corvid_ir::resolve::resolve_all_principal_state_values(state, 64);
                }
            }
        }
    }
});
