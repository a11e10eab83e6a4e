use std::sync::Arc;

use auction_config::ValidatorConfig;
use auction_primitives::{ArgValue, Hash160};
use auction_script::{decode_with, CallFlags, Instruction, ReturnPolicy};
use serde::Serialize;
use tracing::debug;

use crate::{
    args::extract_arguments,
    error::{SpecTableError, ValidationError},
    shape::{validate_shape, CallSuffix},
    spec::{CallSpec, CallSpecTable},
};

/// A call that passed every check, with its arguments in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallDescriptor {
    /// Name of the matched call spec.
    pub operation: String,
    pub target: Hash160,
    pub method: String,
    pub call_flags: CallFlags,
    pub arguments: Vec<ArgValue>,
}

impl CallDescriptor {
    pub fn argument(&self, position: usize) -> Option<&ArgValue> {
        self.arguments.get(position)
    }
}

/// Runs decoding, shape validation and argument extraction against the
/// configured call table.
///
/// Cheap to clone; clones share the table.
#[derive(Clone, Debug)]
pub struct ScriptValidator {
    table: Arc<CallSpecTable>,
    return_policy: ReturnPolicy,
}

impl ScriptValidator {
    pub fn new(table: CallSpecTable, return_policy: ReturnPolicy) -> Self {
        Self {
            table: Arc::new(table),
            return_policy,
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Result<Self, SpecTableError> {
        let table = CallSpecTable::from_config(config)?;
        let policy = if config.require_explicit_ret {
            ReturnPolicy::Explicit
        } else {
            ReturnPolicy::ImplicitAtEnd
        };
        Ok(Self::new(table, policy))
    }

    pub fn table(&self) -> &CallSpecTable {
        &self.table
    }

    pub fn return_policy(&self) -> ReturnPolicy {
        self.return_policy
    }

    /// Validates `script` against whichever spec its target and method
    /// select.
    pub fn validate(&self, script: &[u8]) -> Result<CallDescriptor, ValidationError> {
        let instrs = decode_with(script, self.return_policy)?;
        let suffix = CallSuffix::locate(&instrs)?;
        let spec = self
            .table
            .resolve(suffix.target(), &suffix.method_name())?;
        check_call(&instrs, spec, self.table.max_call_flags())
    }

    /// Validates `script` against the table entry called `name`.
    pub fn validate_as(
        &self,
        script: &[u8],
        name: &str,
    ) -> Result<CallDescriptor, ValidationError> {
        let spec = self
            .table
            .get(name)
            .ok_or_else(|| ValidationError::UnknownOperation(name.to_owned()))?;
        let instrs = decode_with(script, self.return_policy)?;
        check_call(&instrs, spec, self.table.max_call_flags())
    }
}

/// Checks decoded `instrs` against one spec.
pub fn check_call(
    instrs: &[Instruction<'_>],
    spec: &CallSpec,
    max_flags: CallFlags,
) -> Result<CallDescriptor, ValidationError> {
    let shape = validate_shape(instrs, spec.target(), max_flags)?;
    if shape.method != spec.method() {
        return Err(ValidationError::UnexpectedMethod {
            target: shape.target,
            found: shape.method,
        });
    }

    let arguments = extract_arguments(shape.arguments, spec.args())?;
    debug!(
        operation = %spec.name(),
        target = %shape.target,
        flags = %shape.call_flags,
        "call validated"
    );

    Ok(CallDescriptor {
        operation: spec.name().to_owned(),
        target: shape.target,
        method: shape.method,
        call_flags: shape.call_flags,
        arguments,
    })
}
