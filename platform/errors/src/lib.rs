//! Shared error vocabulary of the workspace.
//!
//! - `thiserror` defines the strongly-typed errors a library exposes (codec
//!   failures, hashing refusals).
//! - `eyre` carries loosely-typed errors, with context, up the callstack of the
//!   tracker and node runtimes.
//!
//! Everything is re-exported so member crates only depend on `errors`.

pub use eyre::{bail, ensure, Context};

pub type AnyError = eyre::Error;
pub type AnyResult<T> = eyre::Result<T>;

pub mod prelude {
    pub use super::{anyerror, AnyError, AnyResult};
    pub use eyre::{bail, ensure, Context as _, ContextCompat as _};
}

// -----------------------------------------------------------------------------

pub mod reexports {
    pub use eyre;
    pub use thiserror;
}

#[macro_export]
macro_rules! anyerror {
    ($msg:literal $(,)?) => {
        $crate::reexports::eyre::eyre!($msg)
    };
    ($err:expr $(,)?) => {{
        $crate::reexports::eyre::eyre!($err)
    }};
    ($fmt:expr, $($arg:tt)*) => {
        $crate::reexports::eyre::eyre!(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    fn fails(value: u32) -> AnyResult<u32> {
        ensure!(value < 10, "value {} is too big", value);
        Ok(value)
    }

    #[test]
    fn test_ensure_and_context() {
        assert_eq!(3, fails(3).unwrap());

        let err = fails(12).context("while checking").unwrap_err();
        assert_eq!("while checking", err.to_string());
        assert_eq!("value 12 is too big", err.root_cause().to_string());
    }

    #[test]
    fn test_anyerror_macro() {
        let err: AnyError = anyerror!("chunk {} is missing", 4);
        assert_eq!("chunk 4 is missing", err.to_string());
    }
}
