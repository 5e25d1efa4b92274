//! Error taxonomy shared by every codec and CLI tool in this crate.
//!
//! Every fallible operation bottoms out in [`LibError`], matching the error
//! kinds a caller actually needs to branch on (corrupt input vs. a missing
//! file vs. a range violation). The public [`Error`] wraps it the way
//! `snafu` recommends for library crates: callers get a `Display` message
//! and a `source()` chain, not the enum itself.

use snafu::Snafu;
use std::path::PathBuf;

/// The public Error type for this library.
#[derive(Debug, Snafu)]
pub struct Error(LibError);

impl Error {
    /// `true` for the subset of errors that should make a CLI tool exit
    /// with the conventional "out of memory" message rather than a parse
    /// diagnostic.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self.0, LibError::OutOfMemory { .. })
    }
}

/// The public Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

/// The internal Result type for this library.
///
/// Public (rather than `pub(crate)`) because the `src/bin` tools link this
/// crate the way any external caller would and need to name the error kind
/// to map it onto the right exit status.
pub type LibResult<T> = std::result::Result<T, LibError>;

/// The internal Error type for this library.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LibError {
    #[snafu(display("unable to open '{}': {}", path.display(), source))]
    IoOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("error while reading bytes: {}", source))]
    IoRead {
        site: String,
        source: crate::byte_iter::ByteError,
    },

    #[snafu(display("{}: error while writing bytes: {}", site, source))]
    IoWrite {
        site: String,
        source: std::io::Error,
    },

    #[snafu(display(
        "input is {} bytes, exceeding the {} byte limit",
        size,
        limit
    ))]
    FileTooLarge { size: u64, limit: u64 },

    #[snafu(display("{}: malformed input: {}", site, description))]
    MalformedInput { site: String, description: String },

    #[snafu(display(
        "{}: {} is out of range (expected {}, found {})",
        site,
        field,
        expected,
        found
    ))]
    RangeViolation {
        site: String,
        field: String,
        expected: String,
        found: String,
    },

    #[snafu(display("{}: unsupported: {}", site, description))]
    Unsupported { site: String, description: String },

    #[snafu(display("out of memory: {}", description))]
    OutOfMemory { description: String },

    #[snafu(display("usage error: {}", description))]
    UserError { description: String },
}

macro_rules! site {
    () => {
        format!("{}:{}", file!(), line!())
    };
}

macro_rules! io {
    () => {
        crate::error::IoRead { site: site!() }
    };
}

macro_rules! wr {
    () => {
        crate::error::IoWrite { site: site!() }
    };
}

macro_rules! malformed_s {
    () => {
        crate::error::MalformedInput {
            site: site!(),
            description: "[no description]",
        }
    };
    ($msg:expr) => {
        crate::error::MalformedInput {
            site: site!(),
            description: $msg,
        }
    };
    ($fmt:expr, $($arg:expr),+) => {
        crate::error::MalformedInput {
            site: site!(),
            description: format!($fmt, $($arg),+),
        }
    };
}

macro_rules! malformed_e {
    () => {
        malformed_s!().build()
    };
    ($msg:expr) => {
        malformed_s!($msg).build()
    };
    ($fmt:expr, $($arg:expr),+) => {
        malformed_s!($fmt, $($arg),+).build()
    };
}

macro_rules! malformed {
    () => {
        return Err(malformed_e!());
    };
    ($msg:expr) => {
        return Err(malformed_e!($msg))
    };
    ($fmt:expr, $($arg:expr),+) => {
        return Err(malformed_e!($fmt, $($arg),+))
    };
}

macro_rules! range_violation {
    ($field:expr, $expected:expr, $found:expr) => {
        return crate::error::RangeViolation {
            site: site!(),
            field: $field,
            expected: format!("{}", $expected),
            found: format!("{}", $found),
        }
        .fail()
    };
}

#[test]
fn site_test() {
    let line = line!() + 1;
    let site = site!();
    assert!(site.contains("error.rs"));
    assert!(site.contains(format!("{}", line).as_str()));
}

#[test]
fn malformed_macros_test_message() {
    fn foo() -> LibResult<u64> {
        let flerbin = String::from("flerbin");
        malformed!(flerbin);
    }
    let result = foo();
    assert!(result.is_err());
    let message = format!("{}", result.err().unwrap());
    assert!(message.as_str().contains("flerbin"));
}

#[test]
fn malformed_macros_test_fmt() {
    fn foo() -> LibResult<u64> {
        malformed!("hello {}, {}", "world", String::from("foo"));
    }
    let result = foo();
    assert!(result.is_err());
    let message = format!("{}", result.err().unwrap());
    assert!(message.as_str().contains("hello world, foo"));
}

#[test]
fn range_violation_test() {
    fn foo() -> LibResult<u64> {
        range_violation!("volume", "0..=127", 200);
    }
    let result = foo();
    assert!(result.is_err());
    let message = format!("{}", result.err().unwrap());
    assert!(message.contains("volume"));
    assert!(message.contains("200"));
}
