//! Build information captured at compile time.

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit hash (7 chars), or `unknown` outside a checkout.
pub const BUILD_HASH: &str = env!("BUILD_HASH");

/// `0.1.0 (abc1234)`, with a trailing `*` on the hash for dirty trees.
pub const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_LABEL"), ")");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_version_starts_with_package_version() {
        assert!(LONG_VERSION.starts_with(VERSION));
        assert!(LONG_VERSION.contains(BUILD_HASH));
    }
}
