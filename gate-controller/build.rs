//! Build script for compile-time configuration injection.
//!
//! Set environment variables before building to configure the firmware:
//!
//!   GATE_SERVER_HOST=192.168.1.68 \
//!   GATE_SERVER_PORT=8080 \
//!   GATE_CLIENT_KEY=key \
//!   GATE_CLIENT_SECRET=secret \
//!   cargo build --release
//!
//! The values are read by `gate_core::Config::from_build_env()`; gate-core's
//! own build script tracks them too, this one makes the firmware relink.

fn main() {
    println!("cargo::rerun-if-env-changed=GATE_SERVER_HOST");
    println!("cargo::rerun-if-env-changed=GATE_SERVER_PORT");
    println!("cargo::rerun-if-env-changed=GATE_CLIENT_KEY");
    println!("cargo::rerun-if-env-changed=GATE_CLIENT_SECRET");
    println!("cargo::rerun-if-env-changed=GATE_CREDENTIALS_PATH");
    println!("cargo::rerun-if-env-changed=GATE_PORTAL_NAME");
    println!("cargo::rerun-if-env-changed=GATE_UTC_OFFSET_SECS");
    println!("cargo::rerun-if-env-changed=GATE_NTP_SERVER");
    println!("cargo::rustc-link-arg=-Tlinkall.x");
}
