//! Test-only logger bring-up, so `cargo test -- --nocapture` shows `log`
//! output from the non-`defmt` build used for host-side unit tests.

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}
