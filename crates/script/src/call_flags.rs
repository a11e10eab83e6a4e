use std::fmt;

use serde::{Deserialize, Serialize};

/// Capabilities granted to the callee of a contract call.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallFlags(u8);

impl CallFlags {
    pub const NONE: Self = Self(0);
    pub const READ_STATES: Self = Self(0b0001);
    pub const WRITE_STATES: Self = Self(0b0010);
    pub const ALLOW_CALL: Self = Self(0b0100);
    pub const ALLOW_NOTIFY: Self = Self(0b1000);
    pub const STATES: Self = Self(Self::READ_STATES.0 | Self::WRITE_STATES.0);
    pub const READ_ONLY: Self = Self(Self::READ_STATES.0 | Self::ALLOW_CALL.0);
    pub const ALL: Self = Self(Self::STATES.0 | Self::ALLOW_CALL.0 | Self::ALLOW_NOTIFY.0);

    /// Wraps `bits` if no undefined flag is set.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Debug for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallFlags({self})")
    }
}

impl fmt::Display for CallFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMED: [(CallFlags, &str); 4] = [
            (CallFlags::READ_STATES, "ReadStates"),
            (CallFlags::WRITE_STATES, "WriteStates"),
            (CallFlags::ALLOW_CALL, "AllowCall"),
            (CallFlags::ALLOW_NOTIFY, "AllowNotify"),
        ];

        match *self {
            Self::NONE => return f.write_str("None"),
            Self::ALL => return f.write_str("All"),
            _ => {}
        }

        let mut first = true;
        for (flag, name) in NAMED {
            if self.contains(flag) {
                if !first {
                    f.write_str(", ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
