//! `gdbt version`

pub fn execute() {
    println!("GDBT version {}", env!("CARGO_PKG_VERSION"));
}
