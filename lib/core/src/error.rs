//! Error handling foundation for chatflow.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own domain-specific error enums in its own
//! error module; operations on the host boundary wrap them in a `Report`.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_alias_carries_values() {
        let ok: Result<u32> = Ok(7);
        assert_eq!(ok.expect("should be ok"), 7);
    }
}
