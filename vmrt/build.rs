//! Captures the compile target triple into an environment variable
//! `env!` can read, since `TARGET` itself is only visible to build
//! scripts, never to the crate being built.

fn main() {
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown-unknown-unknown".to_string());
    println!("cargo:rustc-env=VMRT_TARGET_TRIPLE={}", target);
}
