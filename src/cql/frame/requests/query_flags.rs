// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module defines the query parameter flags byte.

/// Values are provided.
pub const VALUES: u8 = 0x01;
/// The result metadata can be skipped.
pub const SKIP_METADATA: u8 = 0x02;
/// A page size is provided.
pub const PAGE_SIZE: u8 = 0x04;
/// A paging state is provided.
pub const PAGING_STATE: u8 = 0x08;
/// A serial consistency is provided.
pub const SERIAL_CONSISTENCY: u8 = 0x10;
/// A default timestamp is provided.
pub const DEFAULT_TIMESTAMP: u8 = 0x20;
/// Values are named.
pub const NAMED_VALUES: u8 = 0x40;
/// A keyspace override is provided.
pub const KEYSPACE: u8 = 0x80;

/// The flags byte of the `<query_parameters>` shared by QUERY and EXECUTE.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryFlags(pub u8);

macro_rules! flag_accessors {
    ($($get:ident, $set:ident, $flag:ident);* $(;)?) => {
        $(
            pub fn $get(&self) -> bool {
                self.0 & $flag != 0
            }

            pub fn $set(&mut self, value: bool) {
                if value {
                    self.0 |= $flag;
                } else {
                    self.0 &= !$flag;
                }
            }
        )*
    };
}

impl QueryFlags {
    flag_accessors!(
        values, set_values, VALUES;
        skip_metadata, set_skip_metadata, SKIP_METADATA;
        page_size, set_page_size, PAGE_SIZE;
        paging_state, set_paging_state, PAGING_STATE;
        serial_consistency, set_serial_consistency, SERIAL_CONSISTENCY;
        default_timestamp, set_default_timestamp, DEFAULT_TIMESTAMP;
        named_values, set_named_values, NAMED_VALUES;
        keyspace, set_keyspace, KEYSPACE;
    );
}
