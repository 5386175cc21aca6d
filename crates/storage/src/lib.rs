// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Component B: atomic-rename JSON persistence of per-conversation state.

pub mod paths;
pub mod state;
pub mod store;

pub use paths::Layout;
pub use state::State;
pub use store::{load, save, FsStateWriter, StateWriter, StoreError};
