// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the consistency level enum.

use anyhow::anyhow;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::fmt::Display;

/// The consistency level of a request, carried on the wire as a `[short]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum Consistency {
    Any = 0x0,
    One = 0x1,
    Two = 0x2,
    Three = 0x3,
    Quorum = 0x4,
    All = 0x5,
    LocalQuorum = 0x6,
    EachQuorum = 0x7,
    Serial = 0x8,
    LocalSerial = 0x9,
    LocalOne = 0xA,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::LocalOne
    }
}

impl Consistency {
    /// Whether this level is only valid as a serial consistency.
    pub fn is_serial(&self) -> bool {
        matches!(self, Consistency::Serial | Consistency::LocalSerial)
    }
}

impl TryFrom<u16> for Consistency {
    type Error = anyhow::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Consistency::from_u16(value).ok_or_else(|| anyhow!("Unknown consistency level: {:#06x}", value))
    }
}

impl Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Consistency::Any => "ANY",
                Consistency::One => "ONE",
                Consistency::Two => "TWO",
                Consistency::Three => "THREE",
                Consistency::Quorum => "QUORUM",
                Consistency::All => "ALL",
                Consistency::LocalQuorum => "LOCAL_QUORUM",
                Consistency::EachQuorum => "EACH_QUORUM",
                Consistency::Serial => "SERIAL",
                Consistency::LocalSerial => "LOCAL_SERIAL",
                Consistency::LocalOne => "LOCAL_ONE",
            }
        )
    }
}
