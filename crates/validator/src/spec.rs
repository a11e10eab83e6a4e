//! Table of the contract calls the backend accepts.

use auction_config::ValidatorConfig;
use auction_primitives::{ArgType, Hash160};
use auction_script::CallFlags;

use crate::error::{SpecTableError, ValidationError};

/// Names and ABIs of the calls the auction backend knows out of the box.
pub mod builtin {
    use auction_primitives::ArgType;

    pub const START: &str = "start";
    pub const MINT: &str = "mint";
    pub const MAKE_BET: &str = "makeBet";
    pub const FINISH: &str = "finish";
    pub const POTENTIAL_WINNER: &str = "getPotentialWinner";

    /// `(method, argument types)` for a built-in call name.
    pub fn abi(name: &str) -> Option<(&'static str, &'static [ArgType])> {
        use ArgType::*;

        let abi: (&'static str, &'static [ArgType]) = match name {
            START => (START, &[Hash160, Bytes, Integer]),
            MINT => (MINT, &[Hash160, String]),
            MAKE_BET => (MAKE_BET, &[Hash160, Integer]),
            FINISH => (FINISH, &[Hash160]),
            POTENTIAL_WINNER => (POTENTIAL_WINNER, &[]),
            _ => return None,
        };
        Some(abi)
    }
}

/// Expected shape of one accepted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSpec {
    name: String,
    target: Hash160,
    method: String,
    args: Vec<ArgType>,
}

impl CallSpec {
    pub fn new(
        name: impl Into<String>,
        target: Hash160,
        method: impl Into<String>,
        args: Vec<ArgType>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            method: method.into(),
            args,
        }
    }

    /// Spec for a built-in call name bound to `target`.
    pub fn builtin(name: &str, target: Hash160) -> Option<Self> {
        builtin::abi(name).map(|(method, args)| Self::new(name, target, method, args.to_vec()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &Hash160 {
        &self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[ArgType] {
        &self.args
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Read-only set of [`CallSpec`]s plus the call flag ceiling.
///
/// Built once at startup; lookups never mutate it.
#[derive(Clone, Debug)]
pub struct CallSpecTable {
    specs: Vec<CallSpec>,
    max_call_flags: CallFlags,
}

impl CallSpecTable {
    pub fn new(max_call_flags: CallFlags) -> Self {
        Self {
            specs: Vec::new(),
            max_call_flags,
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Result<Self, SpecTableError> {
        let max = CallFlags::from_bits(config.max_call_flags)
            .ok_or(SpecTableError::InvalidMaxFlags(config.max_call_flags))?;
        let mut table = Self::new(max);

        for call in &config.calls {
            let spec = match (&call.method, &call.args) {
                (Some(method), Some(args)) => {
                    CallSpec::new(&call.name, call.contract, method, args.clone())
                }
                _ => CallSpec::builtin(&call.name, call.contract)
                    .ok_or_else(|| SpecTableError::UnknownBuiltin(call.name.clone()))?,
            };
            table.insert(spec)?;
        }

        Ok(table)
    }

    /// Adds `spec`, refusing duplicate names and duplicate (target, method)
    /// bindings.
    pub fn insert(&mut self, spec: CallSpec) -> Result<(), SpecTableError> {
        for existing in &self.specs {
            if existing.name == spec.name {
                return Err(SpecTableError::DuplicateName(spec.name));
            }
            if existing.target == spec.target && existing.method == spec.method {
                return Err(SpecTableError::AmbiguousCall {
                    first: existing.name.clone(),
                    second: spec.name,
                    target: spec.target,
                    method: spec.method,
                });
            }
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn max_call_flags(&self) -> CallFlags {
        self.max_call_flags
    }

    pub fn get(&self, name: &str) -> Option<&CallSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn specs(&self) -> impl Iterator<Item = &CallSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Finds the table entry a call of `method` on `target` must satisfy.
    pub fn resolve(
        &self,
        target: Option<Hash160>,
        method: &str,
    ) -> Result<&CallSpec, ValidationError> {
        let Some(target) = target else {
            return Err(ValidationError::UnexpectedTarget {
                expected: None,
                found: None,
            });
        };

        let mut target_known = false;
        for spec in self.specs.iter().filter(|s| s.target == target) {
            target_known = true;
            if spec.method == method {
                return Ok(spec);
            }
        }

        if target_known {
            Err(ValidationError::UnexpectedMethod {
                target,
                found: method.to_owned(),
            })
        } else {
            Err(ValidationError::UnexpectedTarget {
                expected: None,
                found: Some(target),
            })
        }
    }
}
