//! Validation of untrusted contract-call scripts.
//!
//! A candidate script is decoded, its fixed call suffix is checked against
//! a [`CallSpec`] and its packed arguments are decoded in declaration order.
//! Only a script that passes every stage may be co-signed.

pub mod args;
pub mod error;
pub mod shape;
pub mod spec;
mod validator;

pub use args::extract_arguments;
pub use error::{ArgumentError, SpecTableError, ValidationError};
pub use shape::{validate_shape, CallShape, CallSuffix};
pub use spec::{builtin, CallSpec, CallSpecTable};
pub use validator::{check_call, CallDescriptor, ScriptValidator};
