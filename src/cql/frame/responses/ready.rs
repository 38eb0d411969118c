// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the READY frame.

/// Indicates the server is ready to process queries. The body is empty.
#[derive(Copy, Clone, Debug)]
pub struct ReadyFrame;
