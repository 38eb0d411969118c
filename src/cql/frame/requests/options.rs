// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the OPTIONS frame.

/// Asks the server for supported STARTUP options. The body is empty; the
/// server answers with SUPPORTED. Also used as the keepalive probe.
#[derive(Copy, Clone, Debug)]
pub struct OptionsFrame;
