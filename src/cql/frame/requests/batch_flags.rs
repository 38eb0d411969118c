// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the batch parameter flags byte.

use super::query_flags::{
    DEFAULT_TIMESTAMP,
    NAMED_VALUES,
    SERIAL_CONSISTENCY,
};

/// The flags byte of a BATCH frame. Only the serial consistency, default
/// timestamp and named values bits are meaningful here.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchFlags(pub u8);

impl BatchFlags {
    pub fn serial_consistency(&self) -> bool {
        self.0 & SERIAL_CONSISTENCY != 0
    }

    pub fn set_serial_consistency(&mut self, value: bool) {
        if value {
            self.0 |= SERIAL_CONSISTENCY;
        } else {
            self.0 &= !SERIAL_CONSISTENCY;
        }
    }

    pub fn default_timestamp(&self) -> bool {
        self.0 & DEFAULT_TIMESTAMP != 0
    }

    pub fn set_default_timestamp(&mut self, value: bool) {
        if value {
            self.0 |= DEFAULT_TIMESTAMP;
        } else {
            self.0 &= !DEFAULT_TIMESTAMP;
        }
    }

    pub fn named_values(&self) -> bool {
        self.0 & NAMED_VALUES != 0
    }
}
