// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in chat providers

pub mod echo;

pub use echo::{EchoProvider, EchoSlashCommands, ECHO_PROVIDER_ID};
